//! Platform catalog: which sites are scraped, where, and how.
//!
//! The catalog is static configuration loaded once at startup and immutable
//! during a run. Each platform carries its endpoint list, ordered selector
//! candidates per logical field, per-platform limits, and the business rules
//! the normalizer applies (promo phrase, validity window, featured rate,
//! default discount). A built-in catalog covering the six supported
//! Indonesian platforms is embedded for when no file is present on disk.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Built-in catalog, identical in shape to `config/platforms.yaml`.
const DEFAULT_CATALOG: &str = include_str!("../../../config/platforms.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

/// Ordered selector candidates per logical field.
///
/// Extraction tries candidates in listed order and takes the first producing
/// non-empty text; empty lists mean the field is not extracted for this
/// endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorSet {
    #[serde(default)]
    pub container: Vec<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub description: Vec<String>,
    #[serde(default)]
    pub price: Vec<String>,
    #[serde(default)]
    pub original_price: Vec<String>,
    #[serde(default)]
    pub discount: Vec<String>,
    #[serde(default)]
    pub code: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    #[serde(default)]
    pub link: Vec<String>,
}

impl SelectorSet {
    /// A selector set without container/title candidates cannot extract
    /// anything useful.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.container.is_empty() && !self.title.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Logical endpoint name, e.g. `flash-sale` or `vouchers`.
    pub name: String,
    /// Path appended to the platform base URL.
    pub path: String,
    #[serde(default)]
    pub selectors: SelectorSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub slug: String,
    pub base_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower numbers are scraped first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Appended to synthesized descriptions, e.g. "Penawaran menarik dari Shopee".
    pub promo_phrase: String,
    /// Default promo lifetime when a listing carries no validity. Varies
    /// 3-30 days by platform, reflecting each platform's typical promo cycle.
    #[serde(default = "default_validity_days")]
    pub validity_days: i64,
    /// Probability that a normalized coupon is flagged featured.
    #[serde(default = "default_featured_rate")]
    pub featured_rate: f64,
    /// Percentage assumed when no discount pattern matches at all.
    #[serde(default = "default_discount_percent")]
    pub default_discount_percent: i64,
    pub endpoints: Vec<EndpointConfig>,
}

impl PlatformConfig {
    /// Absolute URL for one of this platform's endpoints.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &EndpointConfig) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path)
    }
}

/// A (platform, endpoint) pair known to be slow or anti-bot protected.
///
/// Denied pairs skip live fetching and go straight to the curated tier.
/// Membership is operational knowledge maintained in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
    pub platform: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCatalog {
    pub platforms: Vec<PlatformConfig>,
    #[serde(default)]
    pub denylist: Vec<DenyRule>,
}

impl PlatformCatalog {
    #[must_use]
    pub fn get(&self, slug: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.slug == slug)
    }

    /// Enabled platforms sorted by ascending priority (stable for ties).
    #[must_use]
    pub fn enabled_by_priority(&self) -> Vec<&PlatformConfig> {
        let mut enabled: Vec<&PlatformConfig> =
            self.platforms.iter().filter(|p| p.enabled).collect();
        enabled.sort_by_key(|p| p.priority);
        enabled
    }

    #[must_use]
    pub fn is_denied(&self, platform_slug: &str, endpoint_name: &str) -> bool {
        self.denylist
            .iter()
            .any(|rule| rule.platform == platform_slug && rule.endpoint == endpoint_name)
    }

    /// Apply `PROMOKITA_PLATFORM_<SLUG>_ENABLED` overrides from the provided
    /// lookup. Unset or unparsable values leave the catalog value in place.
    pub fn apply_enable_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        for platform in &mut self.platforms {
            let var = format!(
                "PROMOKITA_PLATFORM_{}_ENABLED",
                platform.slug.to_uppercase().replace('-', "_")
            );
            if let Ok(raw) = lookup(&var) {
                match raw.as_str() {
                    "true" | "1" | "yes" => platform.enabled = true,
                    "false" | "0" | "no" => platform.enabled = false,
                    _ => {}
                }
            }
        }
    }
}

/// Load and validate the platform catalog.
///
/// Reads `path` when it exists; otherwise falls back to the embedded default
/// catalog so a fresh checkout works without any config files.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails
/// validation.
pub fn load_platform_catalog(path: &Path) -> Result<PlatformCatalog, ConfigError> {
    let content = if path.exists() {
        std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogIo {
            path: path.display().to_string(),
            source: e,
        })?
    } else {
        DEFAULT_CATALOG.to_string()
    };

    let catalog: PlatformCatalog = serde_yaml::from_str(&content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

/// The embedded default catalog.
///
/// # Panics
///
/// Panics if the embedded YAML is invalid; that is a build artifact defect,
/// exercised by tests.
#[must_use]
pub fn builtin_catalog() -> PlatformCatalog {
    serde_yaml::from_str(DEFAULT_CATALOG).expect("embedded platform catalog must parse")
}

fn validate_catalog(catalog: &PlatformCatalog) -> Result<(), ConfigError> {
    if catalog.platforms.is_empty() {
        return Err(ConfigError::Validation(
            "catalog must define at least one platform".to_string(),
        ));
    }

    let mut seen_slugs = HashSet::new();
    for platform in &catalog.platforms {
        if platform.name.trim().is_empty() || platform.slug.trim().is_empty() {
            return Err(ConfigError::Validation(
                "platform name and slug must be non-empty".to_string(),
            ));
        }
        if !seen_slugs.insert(platform.slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate platform slug: '{}'",
                platform.slug
            )));
        }
        if !platform.base_url.starts_with("http") {
            return Err(ConfigError::Validation(format!(
                "platform '{}' base_url must be absolute",
                platform.slug
            )));
        }
        if platform.endpoints.is_empty() {
            return Err(ConfigError::Validation(format!(
                "platform '{}' must define at least one endpoint",
                platform.slug
            )));
        }
        if !(0.0..=1.0).contains(&platform.featured_rate) {
            return Err(ConfigError::Validation(format!(
                "platform '{}' featured_rate must be within [0, 1]",
                platform.slug
            )));
        }
        if !(1..=60).contains(&platform.validity_days) {
            return Err(ConfigError::Validation(format!(
                "platform '{}' validity_days must be within [1, 60]",
                platform.slug
            )));
        }
        if platform.rate_limit.max_requests == 0 || platform.rate_limit.window_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "platform '{}' rate limit must be positive",
                platform.slug
            )));
        }
    }

    for rule in &catalog.denylist {
        if catalog.get(&rule.platform).is_none() {
            return Err(ConfigError::Validation(format!(
                "denylist references unknown platform '{}'",
                rule.platform
            )));
        }
    }

    Ok(())
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_max_items() -> usize {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_validity_days() -> i64 {
    7
}

fn default_featured_rate() -> f64 {
    0.1
}

fn default_discount_percent() -> i64 {
    10
}
