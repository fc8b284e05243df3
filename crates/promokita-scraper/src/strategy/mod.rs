//! Fetch strategies and the fallback chain that runs them.
//!
//! A strategy produces raw items for one endpoint and is allowed to fail;
//! the chain tries strategies in order and the first success wins. An empty
//! successful result is a success, not a failure. Only full exhaustion of
//! the chain surfaces as an error to the endpoint loop.

pub mod browser;
pub mod curated;
pub mod http;
pub mod synthetic;

use std::sync::Arc;

use async_trait::async_trait;
use promokita_core::{EndpointConfig, PlatformConfig};

use crate::error::{FetchFailure, ScrapeError};
use crate::types::RawItem;

pub use browser::BrowserFetcher;
pub use curated::CuratedFetcher;
pub use http::HttpFetcher;
pub use synthetic::SyntheticFetcher;

/// One endpoint of one platform, resolved for a fetch attempt.
#[derive(Debug, Clone, Copy)]
pub struct FetchTarget<'a> {
    pub platform: &'a PlatformConfig,
    pub endpoint: &'a EndpointConfig,
}

impl FetchTarget<'_> {
    #[must_use]
    pub fn url(&self) -> String {
        self.platform.endpoint_url(self.endpoint)
    }
}

/// A pluggable raw-item producer for one endpoint.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce raw items for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure`] on any strategy-local failure; the chain
    /// catches it and falls through to the next strategy.
    async fn fetch(&self, target: &FetchTarget<'_>) -> Result<Vec<RawItem>, FetchFailure>;
}

/// Items plus the strategy that produced them.
#[derive(Debug)]
pub struct ChainResult {
    pub strategy: &'static str,
    pub items: Vec<RawItem>,
}

/// Run the strategy chain for one endpoint, first success wins.
///
/// # Errors
///
/// Returns [`ScrapeError::ChainExhausted`] only when every strategy failed.
pub async fn run_chain(
    strategies: &[Arc<dyn FetchStrategy>],
    target: &FetchTarget<'_>,
) -> Result<ChainResult, ScrapeError> {
    for strategy in strategies {
        match strategy.fetch(target).await {
            Ok(items) => {
                tracing::debug!(
                    platform = target.platform.slug.as_str(),
                    endpoint = target.endpoint.name.as_str(),
                    strategy = strategy.name(),
                    items = items.len(),
                    "fetch strategy succeeded"
                );
                return Ok(ChainResult {
                    strategy: strategy.name(),
                    items,
                });
            }
            Err(failure) => {
                tracing::warn!(
                    platform = target.platform.slug.as_str(),
                    endpoint = target.endpoint.name.as_str(),
                    error = %failure,
                    "fetch strategy failed, falling through"
                );
            }
        }
    }

    Err(ScrapeError::ChainExhausted {
        platform: target.platform.slug.clone(),
        endpoint: target.endpoint.name.clone(),
    })
}
