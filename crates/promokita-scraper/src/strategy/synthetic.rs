//! Synthetic generator, the last-resort strategy.
//!
//! Emits realistic-shaped fake records so the pipeline always produces
//! output and a cycle never blocks on total scrape failure. Cannot fail.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::sync::Mutex;

use crate::error::FetchFailure;
use crate::strategy::{FetchStrategy, FetchTarget};
use crate::types::RawItem;

const STRATEGY_NAME: &str = "synthetic";

const TITLE_PREFIXES: &[&str] = &[
    "Diskon Spesial",
    "Flash Sale",
    "Promo Gajian",
    "Mega Sale",
    "Voucher Hemat",
    "Serbu Promo",
    "Harga Spesial",
];

const CATEGORIES: &[&str] = &[
    "Elektronik",
    "Fashion",
    "Gadget",
    "Kebutuhan Rumah",
    "Makanan & Minuman",
    "Kecantikan",
    "Olahraga",
    "Perjalanan",
];

const DISCOUNTS: &[&str] = &[
    "50%",
    "40%",
    "25%",
    "10%",
    "Rp 100.000",
    "Rp 50.000",
    "Gratis Ongkir",
    "Cashback 20%",
];

pub struct SyntheticFetcher {
    count: usize,
    rng: Mutex<StdRng>,
}

impl SyntheticFetcher {
    #[must_use]
    pub fn new(count: usize, rng: StdRng) -> Self {
        Self {
            count,
            rng: Mutex::new(rng),
        }
    }
}

fn code_prefix(slug: &str) -> String {
    slug.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(6)
        .collect::<String>()
        .to_uppercase()
}

#[async_trait]
impl FetchStrategy for SyntheticFetcher {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn fetch(&self, target: &FetchTarget<'_>) -> Result<Vec<RawItem>, FetchFailure> {
        let mut rng = self.rng.lock().await;
        let base_url = target.platform.base_url.trim_end_matches('/');
        let prefix = code_prefix(&target.platform.slug);

        let items = (0..self.count)
            .map(|n| {
                let title_prefix = TITLE_PREFIXES.choose(&mut *rng).copied().unwrap_or("Promo");
                let category = CATEGORIES.choose(&mut *rng).copied().unwrap_or("Pilihan");
                let discount = DISCOUNTS.choose(&mut *rng).copied().unwrap_or("10%");
                let code: u32 = rng.random_range(1000..10_000);

                RawItem {
                    title: format!("{title_prefix} {category}"),
                    discount_text: Some(discount.to_string()),
                    code: Some(format!("{prefix}{code}")),
                    link: Some(format!("{base_url}/promo/{n}")),
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

    fn target(catalog: &promokita_core::PlatformCatalog) -> FetchTarget<'_> {
        let platform = catalog.get("blibli").unwrap();
        FetchTarget {
            platform,
            endpoint: &platform.endpoints[0],
        }
    }

    #[tokio::test]
    async fn produces_exactly_the_configured_count() {
        let catalog = builtin_catalog();
        let fetcher = SyntheticFetcher::new(5, StdRng::seed_from_u64(1));
        let items = fetcher.fetch(&target(&catalog)).await.unwrap();
        assert_eq!(items.len(), 5);
        for item in &items {
            assert!(!item.title.is_empty());
            assert!(item.discount_text.is_some());
            assert!(item.link.as_deref().unwrap().starts_with("https://www.blibli.com/"));
        }
    }

    #[tokio::test]
    async fn codes_carry_the_platform_prefix() {
        let catalog = builtin_catalog();
        let fetcher = SyntheticFetcher::new(3, StdRng::seed_from_u64(2));
        let items = fetcher.fetch(&target(&catalog)).await.unwrap();
        for item in &items {
            assert!(item.code.as_deref().unwrap().starts_with("BLIBLI"));
        }
    }

    #[tokio::test]
    async fn pinned_seed_is_reproducible() {
        let catalog = builtin_catalog();
        let a = SyntheticFetcher::new(4, StdRng::seed_from_u64(9));
        let b = SyntheticFetcher::new(4, StdRng::seed_from_u64(9));
        let first = a.fetch(&target(&catalog)).await.unwrap();
        let second = b.fetch(&target(&catalog)).await.unwrap();
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.title, y.title);
            assert_eq!(x.code, y.code);
        }
    }
}
