//! Error taxonomy for the scrape pipeline.
//!
//! Errors are recovered at the narrowest scope that can make a fallback
//! decision: a [`FetchFailure`] is caught inside the strategy chain and the
//! next strategy is tried; [`ScrapeError::ChainExhausted`] is caught by the
//! endpoint loop; platform-level errors are caught by the orchestrator and
//! never abort the cycle.

use promokita_core::GatewayError;
use thiserror::Error;

/// One fetch strategy failing for one endpoint. Strategy-local; the chain
/// logs it and moves on.
#[derive(Debug, Error)]
#[error("{strategy} fetch failed: {message}")]
pub struct FetchFailure {
    pub strategy: &'static str,
    pub message: String,
}

impl FetchFailure {
    #[must_use]
    pub fn new(strategy: &'static str, message: impl Into<String>) -> Self {
        Self {
            strategy,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Every strategy in the chain failed for one endpoint. The endpoint
    /// contributes zero items; sibling endpoints are unaffected.
    #[error("all fetch strategies exhausted for {platform}/{endpoint}")]
    ChainExhausted { platform: String, endpoint: String },

    /// The platform-level hard bound was exceeded. The platform is marked
    /// failed for this cycle and is not retried until the next one.
    #[error("platform '{platform}' exceeded the {timeout_secs}s scrape timeout")]
    ScrapeTimeout {
        platform: String,
        timeout_secs: u64,
    },

    /// Missing platform reference or unusable extraction config. Fatal to
    /// this platform's current run, not retried mid-cycle.
    #[error("platform configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Persistence(#[from] GatewayError),
}
