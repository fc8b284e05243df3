//! Curated fallback strategy.
//!
//! A hand-maintained seed dataset per platform, used when live extraction is
//! unreliable but real-looking data is still preferable to synthetic. At
//! fetch time the platform's entries are shuffled, a bounded sample is
//! taken, and titles get a cosmetic variation so repeated cycles do not
//! look identical.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Deserialize;
use tokio::sync::Mutex;

use promokita_core::ConfigError;

use crate::error::FetchFailure;
use crate::strategy::{FetchStrategy, FetchTarget};
use crate::types::RawItem;

const STRATEGY_NAME: &str = "curated";

/// Built-in seed data, identical in shape to `config/curated.yaml`.
const DEFAULT_SEED: &str = include_str!("../../../../config/curated.yaml");

const TITLE_VARIATIONS: &[&str] = &[
    "",
    " - Terbatas!",
    " - Spesial Hari Ini",
    " - Jangan Sampai Kehabisan",
];

#[derive(Debug, Clone, Deserialize)]
pub struct CuratedEntry {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub discount: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

pub struct CuratedFetcher {
    entries: HashMap<String, Vec<CuratedEntry>>,
    sample_size: usize,
    rng: Mutex<StdRng>,
}

impl CuratedFetcher {
    /// Load seed data from `path`, falling back to the embedded default
    /// when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: &Path, sample_size: usize, rng: StdRng) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogIo {
                path: path.display().to_string(),
                source: e,
            })?
        } else {
            DEFAULT_SEED.to_string()
        };

        let entries: HashMap<String, Vec<CuratedEntry>> = serde_yaml::from_str(&content)?;
        Ok(Self {
            entries,
            sample_size,
            rng: Mutex::new(rng),
        })
    }

    #[must_use]
    pub fn platform_count(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl FetchStrategy for CuratedFetcher {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn fetch(&self, target: &FetchTarget<'_>) -> Result<Vec<RawItem>, FetchFailure> {
        let slug = target.platform.slug.as_str();
        let Some(pool) = self.entries.get(slug) else {
            return Err(FetchFailure::new(
                STRATEGY_NAME,
                format!("no curated entries for platform '{slug}'"),
            ));
        };

        let mut rng = self.rng.lock().await;
        let mut sample: Vec<CuratedEntry> = pool.clone();
        sample.shuffle(&mut *rng);
        sample.truncate(self.sample_size.min(pool.len()));

        let endpoint_url = target.url();
        let items = sample
            .into_iter()
            .map(|entry| {
                let variation = TITLE_VARIATIONS.choose(&mut *rng).copied().unwrap_or("");
                RawItem {
                    title: format!("{}{variation}", entry.title),
                    description: entry.description,
                    discount_text: entry.discount,
                    code: entry.code,
                    link: entry.link.or_else(|| Some(endpoint_url.clone())),
                    ..RawItem::default()
                }
            })
            .collect();

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promokita_core::platforms::builtin_catalog;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn fetcher(sample_size: usize, seed: u64) -> CuratedFetcher {
        // Nonexistent path exercises the embedded fallback.
        CuratedFetcher::load(
            &PathBuf::from("/nonexistent/curated.yaml"),
            sample_size,
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    fn target<'a>(catalog: &'a promokita_core::PlatformCatalog, slug: &str) -> FetchTarget<'a> {
        let platform = catalog.get(slug).unwrap();
        FetchTarget {
            platform,
            endpoint: &platform.endpoints[0],
        }
    }

    #[test]
    fn embedded_seed_covers_every_builtin_platform() {
        let fetcher = fetcher(5, 1);
        let catalog = builtin_catalog();
        for platform in &catalog.platforms {
            assert!(
                fetcher.entries.contains_key(&platform.slug),
                "no curated entries for {}",
                platform.slug
            );
        }
    }

    #[tokio::test]
    async fn sample_is_bounded_and_titled() {
        let fetcher = fetcher(3, 1);
        let catalog = builtin_catalog();
        let items = fetcher.fetch(&target(&catalog, "shopee")).await.unwrap();
        assert_eq!(items.len(), 3);
        for item in &items {
            assert!(!item.title.is_empty());
            assert!(item.link.is_some());
        }
    }

    #[tokio::test]
    async fn titles_carry_known_variations_only() {
        let fetcher = fetcher(5, 7);
        let catalog = builtin_catalog();
        let items = fetcher.fetch(&target(&catalog, "tokopedia")).await.unwrap();
        for item in &items {
            assert!(
                TITLE_VARIATIONS
                    .iter()
                    .any(|v| v.is_empty() || item.title.ends_with(v) || !item.title.contains(" - ")),
                "unexpected variation in '{}'",
                item.title
            );
        }
    }

    #[tokio::test]
    async fn unknown_platform_is_a_fetch_failure() {
        let fetcher = fetcher(5, 1);
        let mut catalog = builtin_catalog();
        catalog.platforms[0].slug = "ghost".to_string();
        let err = fetcher.fetch(&target(&catalog, "ghost")).await.unwrap_err();
        assert!(err.message.contains("ghost"));
    }

    #[tokio::test]
    async fn pinned_seed_gives_a_reproducible_sample() {
        let catalog = builtin_catalog();
        let first = fetcher(4, 42)
            .fetch(&target(&catalog, "lazada"))
            .await
            .unwrap();
        let second = fetcher(4, 42)
            .fetch(&target(&catalog, "lazada"))
            .await
            .unwrap();
        let titles = |items: &[RawItem]| {
            items.iter().map(|i| i.title.clone()).collect::<Vec<_>>()
        };
        assert_eq!(titles(&first), titles(&second));
    }
}
