//! Intermediate and result types flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Loosely typed extraction result produced by a fetch strategy.
///
/// Only `title` is required at extraction time; everything else is
/// best-effort text the normalizer turns into typed fields. Never persisted
/// directly.
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub title: String,
    pub description: Option<String>,
    pub price: Option<String>,
    pub original_price: Option<String>,
    pub discount_text: Option<String>,
    pub code: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl RawItem {
    #[must_use]
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Per-platform counters for one scrape run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ScrapeStats {
    pub found: u32,
    pub saved: u32,
    pub updated: u32,
    pub failed: u32,
}

/// How one platform fared within a cycle. A failure is captured here and the
/// cycle moves on; it never aborts sibling platforms.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PlatformOutcome {
    Completed(ScrapeStats),
    Failed { error: String },
}
