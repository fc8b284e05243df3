//! Per-platform scrape runs.
//!
//! One [`PlatformScraper`] owns a platform's endpoint list and fallback
//! policy. A run walks endpoints sequentially (rate-limited, with an
//! inter-endpoint delay), resolves items through the strategy chain,
//! normalizes the accumulated batch, upserts it, and records a scrape
//! session that transitions `running -> completed | failed` exactly once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use uuid::Uuid;

use promokita_core::{
    FetchMode, GatewayError, NewCoupon, NewSession, PersistenceGateway, PlatformConfig,
    SessionPatch, SessionStatus,
};

use crate::error::{FetchFailure, ScrapeError};
use crate::normalize::{normalize, NormalizeContext};
use crate::rate_limit::RateLimiter;
use crate::strategy::{run_chain, FetchStrategy, FetchTarget, HttpFetcher};
use crate::types::{RawItem, ScrapeStats};

/// Orchestration-level knobs shared by all platform scrapers.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeSettings {
    pub fetch_mode: FetchMode,
    pub inter_request_delay: Duration,
}

/// The strategy instances a scraper composes its chains from. Shared across
/// platforms so the browser process and HTTP pool are reused.
#[derive(Clone)]
pub struct StrategySet {
    pub http: Arc<dyn FetchStrategy>,
    pub browser: Option<Arc<dyn FetchStrategy>>,
    pub curated: Arc<dyn FetchStrategy>,
    pub synthetic: Arc<dyn FetchStrategy>,
}

impl StrategySet {
    /// The ordered chain for one endpoint. A pinned fetch mode or a denied
    /// endpoint short-circuits past the live tiers.
    #[must_use]
    pub fn chain(&self, mode: FetchMode, denied: bool) -> Vec<Arc<dyn FetchStrategy>> {
        match mode {
            FetchMode::Synthetic => vec![Arc::clone(&self.synthetic)],
            FetchMode::Curated => {
                vec![Arc::clone(&self.curated), Arc::clone(&self.synthetic)]
            }
            FetchMode::Auto if denied => {
                vec![Arc::clone(&self.curated), Arc::clone(&self.synthetic)]
            }
            FetchMode::Auto => {
                let mut chain = vec![Arc::clone(&self.http)];
                if let Some(browser) = &self.browser {
                    chain.push(Arc::clone(browser));
                }
                chain.push(Arc::clone(&self.curated));
                chain.push(Arc::clone(&self.synthetic));
                chain
            }
        }
    }
}

/// The orchestrator's view of one platform scraper; tests inject stubs.
#[async_trait]
pub trait PlatformRunner: Send + Sync {
    fn slug(&self) -> &str;

    /// Run one scrape for this platform.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] when the run failed as a whole; partial
    /// endpoint failures are absorbed into the returned counters instead.
    async fn scrape(&self) -> Result<ScrapeStats, ScrapeError>;
}

pub struct PlatformScraper {
    platform: PlatformConfig,
    /// Endpoint names denylisted for this platform; they skip the live tiers.
    denied_endpoints: HashSet<String>,
    strategies: StrategySet,
    prober: Arc<HttpFetcher>,
    gateway: Arc<dyn PersistenceGateway>,
    limiter: Arc<RateLimiter>,
    settings: ScrapeSettings,
    rng: Mutex<StdRng>,
    // Read-through caches; platform and merchant rows are seed data and
    // never change ids.
    platform_id: OnceCell<i64>,
    merchant_id: OnceCell<Option<i64>>,
}

impl PlatformScraper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: PlatformConfig,
        denied_endpoints: HashSet<String>,
        strategies: StrategySet,
        prober: Arc<HttpFetcher>,
        gateway: Arc<dyn PersistenceGateway>,
        limiter: Arc<RateLimiter>,
        settings: ScrapeSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            platform,
            denied_endpoints,
            strategies,
            prober,
            gateway,
            limiter,
            settings,
            rng: Mutex::new(rng),
            platform_id: OnceCell::new(),
            merchant_id: OnceCell::new(),
        }
    }

    async fn resolve_platform_id(&self) -> Result<i64, ScrapeError> {
        let slug = &self.platform.slug;
        self.platform_id
            .get_or_try_init(|| async {
                self.gateway
                    .platform_id_by_slug(slug)
                    .await
                    .map_err(|err| match err {
                        GatewayError::NotFound { .. } => ScrapeError::Configuration(format!(
                            "platform '{slug}' is not seeded in storage"
                        )),
                        other => ScrapeError::Persistence(other),
                    })
            })
            .await
            .map(|id| *id)
    }

    /// Platform-wide coupons attach to the platform's own merchant row when
    /// one is seeded; otherwise they stay merchant-less.
    async fn resolve_merchant_id(&self) -> Result<Option<i64>, ScrapeError> {
        self.merchant_id
            .get_or_try_init(|| async {
                self.gateway
                    .merchant_id_by_slug(&self.platform.slug)
                    .await
                    .map_err(ScrapeError::Persistence)
            })
            .await
            .map(|id| *id)
    }

    #[must_use]
    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Cheap liveness probe: fetch the platform's base page and verify it
    /// carries a non-error title. Never mutates persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure`] when the page is unreachable or looks like
    /// an error page.
    pub async fn probe(&self) -> Result<String, FetchFailure> {
        self.prober.probe(&self.platform.base_url).await
    }

    /// Walk all endpoints and return the accumulated raw items tagged with
    /// their endpoint URL, plus the chain-exhaustion count.
    async fn collect_raw_items(&self) -> (Vec<(RawItem, String)>, u32) {
        let mut tagged = Vec::new();
        let mut chain_errors = 0u32;

        for endpoint in &self.platform.endpoints {
            self.limiter
                .acquire(&self.platform.slug, self.platform.rate_limit)
                .await;

            let denied = self.denied_endpoints.contains(&endpoint.name);
            let chain = self.strategies.chain(self.settings.fetch_mode, denied);
            let target = FetchTarget {
                platform: &self.platform,
                endpoint,
            };
            let url = target.url();

            match run_chain(&chain, &target).await {
                Ok(result) => {
                    tracing::info!(
                        platform = self.platform.slug.as_str(),
                        endpoint = endpoint.name.as_str(),
                        strategy = result.strategy,
                        items = result.items.len(),
                        "endpoint resolved"
                    );
                    tagged.extend(result.items.into_iter().map(|item| (item, url.clone())));
                }
                Err(err) => {
                    tracing::error!(
                        platform = self.platform.slug.as_str(),
                        endpoint = endpoint.name.as_str(),
                        error = %err,
                        "endpoint contributed no items"
                    );
                    chain_errors += 1;
                }
            }

            tokio::time::sleep(self.settings.inter_request_delay).await;
        }

        (tagged, chain_errors)
    }

    async fn run(
        &self,
        platform_id: i64,
        merchant_id: Option<i64>,
    ) -> Result<ScrapeStats, ScrapeError> {
        let (tagged, chain_errors) = self.collect_raw_items().await;
        let found = u32::try_from(tagged.len()).unwrap_or(u32::MAX);

        let now = Utc::now();
        let mut coupons: Vec<NewCoupon> = Vec::with_capacity(tagged.len());
        let mut rejects = 0u32;
        {
            let mut rng = self.rng.lock().await;
            for (item, endpoint_url) in &tagged {
                let ctx = NormalizeContext {
                    platform: &self.platform,
                    platform_id,
                    merchant_id,
                    endpoint_url,
                    now,
                };
                match normalize(item, &ctx, &mut *rng) {
                    Some(coupon) => coupons.push(coupon),
                    None => rejects += 1,
                }
            }
        }

        let outcome = self.gateway.upsert_batch(&coupons).await?;

        Ok(ScrapeStats {
            found,
            saved: outcome.saved,
            updated: outcome.updated,
            failed: chain_errors + rejects + outcome.errors,
        })
    }
}

#[async_trait]
impl PlatformRunner for PlatformScraper {
    fn slug(&self) -> &str {
        &self.platform.slug
    }

    async fn scrape(&self) -> Result<ScrapeStats, ScrapeError> {
        let slug = self.platform.slug.clone();
        let platform_id = self.resolve_platform_id().await?;
        let merchant_id = self.resolve_merchant_id().await?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let session_id = self
            .gateway
            .create_session(NewSession {
                public_id: Uuid::new_v4(),
                platform_id,
                started_at,
            })
            .await?;

        let result = self.run(platform_id, merchant_id).await;
        let duration_ms = i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX);

        let patch = match &result {
            Ok(stats) => SessionPatch {
                status: SessionStatus::Completed,
                completed_at: Utc::now(),
                duration_ms,
                items_found: i32::try_from(stats.found).unwrap_or(i32::MAX),
                items_saved: i32::try_from(stats.saved).unwrap_or(i32::MAX),
                items_updated: i32::try_from(stats.updated).unwrap_or(i32::MAX),
                items_failed: i32::try_from(stats.failed).unwrap_or(i32::MAX),
                error_details: None,
            },
            Err(err) => SessionPatch {
                status: SessionStatus::Failed,
                completed_at: Utc::now(),
                duration_ms,
                items_found: 0,
                items_saved: 0,
                items_updated: 0,
                items_failed: 0,
                error_details: Some(serde_json::json!({ "error": err.to_string() })),
            },
        };

        // A session-finalization failure must not eclipse the scrape result.
        if let Err(err) = self.gateway.update_session(session_id, patch).await {
            tracing::error!(
                platform = slug.as_str(),
                session_id,
                error = %err,
                "failed to finalize scrape session"
            );
        }

        result
    }
}
