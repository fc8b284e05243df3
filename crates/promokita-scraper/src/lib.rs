//! Scrape orchestration and extraction pipeline.
//!
//! The orchestrator drives one scrape cycle over all enabled platforms:
//! bounded-concurrency batches of platform scrapers, each of which walks its
//! endpoints through a fetch-strategy fallback chain (raw HTTP, headless
//! browser, curated seed data, synthetic records), normalizes the loosely
//! typed extraction results into canonical coupons, and upserts them through
//! the persistence gateway while recording per-platform session metrics.

pub mod anti_detection;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod orchestrator;
pub mod platform;
pub mod rate_limit;
pub mod strategy;
pub mod types;

pub use error::{FetchFailure, ScrapeError};
pub use orchestrator::{
    CycleOutcome, CycleReport, Orchestrator, OrchestratorSettings, OrchestratorStatus,
};
pub use platform::{PlatformRunner, PlatformScraper, ScrapeSettings};
pub use rate_limit::RateLimiter;
pub use types::{PlatformOutcome, RawItem, ScrapeStats};

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Random source for everything probabilistic in the pipeline: user-agent
/// choice, curated shuffling and variation, `is_featured`. A fixed seed makes
/// a whole run reproducible.
#[must_use]
pub fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
