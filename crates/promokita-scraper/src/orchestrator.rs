//! Cycle orchestration over all enabled platforms.
//!
//! Platforms run in priority order, partitioned into concurrency-bounded
//! batches; each platform invocation is wrapped in a hard timeout, and a
//! single platform failing or timing out never aborts the cycle. After all
//! platforms resolve, stale coupons are expired and an aggregate summary is
//! emitted. At most one cycle is in flight system-wide: a trigger during an
//! active cycle is a logged no-op, not a queued run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use promokita_core::{AppConfig, PersistenceGateway, PlatformCatalog};

use crate::error::ScrapeError;
use crate::new_rng;
use crate::platform::{PlatformRunner, PlatformScraper, ScrapeSettings, StrategySet};
use crate::rate_limit::RateLimiter;
use crate::strategy::browser::BrowserSettings;
use crate::strategy::{BrowserFetcher, CuratedFetcher, HttpFetcher, SyntheticFetcher};
use crate::types::{PlatformOutcome, ScrapeStats};

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub max_concurrent: usize,
    pub platform_timeout: Duration,
    pub inter_batch_delay: Duration,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_scrapers.max(1),
            platform_timeout: Duration::from_secs(config.platform_timeout_secs),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }
}

/// Aggregate result of one full cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub platforms: BTreeMap<String, PlatformOutcome>,
    pub total_found: u32,
    pub total_saved: u32,
    pub total_updated: u32,
    pub total_errors: u32,
    /// Rows flipped from `active` to `expired` by post-cycle cleanup.
    pub expired: u64,
}

/// What a cycle trigger produced.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was already in flight; this trigger did nothing.
    Skipped,
    Completed(CycleReport),
}

/// Point-in-time view of the orchestrator, for the API and CLI.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub platforms: Vec<String>,
    /// Requests currently inside each platform's rate-limit window.
    pub rate_limits: BTreeMap<String, usize>,
}

pub struct Orchestrator {
    runners: Vec<Arc<dyn PlatformRunner>>,
    gateway: Arc<dyn PersistenceGateway>,
    settings: OrchestratorSettings,
    limiter: Arc<RateLimiter>,
    in_flight: AtomicBool,
    browser: Option<Arc<BrowserFetcher>>,
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        runners: Vec<Arc<dyn PlatformRunner>>,
        gateway: Arc<dyn PersistenceGateway>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            runners,
            gateway,
            settings,
            limiter: Arc::new(RateLimiter::new()),
            in_flight: AtomicBool::new(false),
            browser: None,
        }
    }

    /// Assemble the full pipeline from configuration: shared strategies and
    /// rate limiter, one scraper per enabled platform in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Configuration`] when a strategy cannot be
    /// constructed (HTTP client, curated seed data).
    pub fn from_config(
        config: &AppConfig,
        catalog: &PlatformCatalog,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, ScrapeError> {
        let seed = config.rng_seed;
        let limiter = Arc::new(RateLimiter::new());

        let http = Arc::new(
            HttpFetcher::new(Duration::from_secs(config.request_timeout_secs), new_rng(seed))
                .map_err(|e| ScrapeError::Configuration(format!("http client: {e}")))?,
        );

        let browser = config.browser_enabled.then(|| {
            Arc::new(BrowserFetcher::new(
                BrowserSettings {
                    nav_timeout: Duration::from_secs(config.browser_nav_timeout_secs),
                    hard_timeout: Duration::from_secs(config.browser_hard_timeout_secs),
                    selector_wait: Duration::from_secs(config.selector_wait_secs),
                    scroll_passes: config.scroll_passes,
                    max_nav_retries: config.max_nav_retries,
                    nav_retry_base_delay: Duration::from_millis(config.nav_retry_base_delay_ms),
                },
                new_rng(seed),
            ))
        });

        let curated = Arc::new(
            CuratedFetcher::load(&config.curated_path, config.curated_sample_size, new_rng(seed))
                .map_err(|e| ScrapeError::Configuration(format!("curated seed data: {e}")))?,
        );
        let synthetic = Arc::new(SyntheticFetcher::new(config.synthetic_count, new_rng(seed)));

        let strategies = StrategySet {
            http: Arc::clone(&http) as Arc<dyn crate::strategy::FetchStrategy>,
            browser: browser
                .as_ref()
                .map(|b| Arc::clone(b) as Arc<dyn crate::strategy::FetchStrategy>),
            curated,
            synthetic,
        };

        let scrape_settings = ScrapeSettings {
            fetch_mode: config.fetch_mode,
            inter_request_delay: Duration::from_millis(config.inter_request_delay_ms),
        };

        let runners: Vec<Arc<dyn PlatformRunner>> = catalog
            .enabled_by_priority()
            .into_iter()
            .map(|platform| {
                let denied = platform
                    .endpoints
                    .iter()
                    .filter(|endpoint| catalog.is_denied(&platform.slug, &endpoint.name))
                    .map(|endpoint| endpoint.name.clone())
                    .collect();
                Arc::new(PlatformScraper::new(
                    platform.clone(),
                    denied,
                    strategies.clone(),
                    Arc::clone(&http),
                    Arc::clone(&gateway),
                    Arc::clone(&limiter),
                    scrape_settings,
                    new_rng(seed),
                )) as Arc<dyn PlatformRunner>
            })
            .collect();

        Ok(Self {
            runners,
            gateway,
            settings: OrchestratorSettings::from_app_config(config),
            limiter,
            in_flight: AtomicBool::new(false),
            browser,
        })
    }

    /// Whether a cycle is currently in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn platform_slugs(&self) -> Vec<String> {
        self.runners.iter().map(|r| r.slug().to_string()).collect()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            platforms: self.platform_slugs(),
            rate_limits: self.limiter.snapshot().await,
        }
    }

    /// Run one cycle over all platforms. Reentrant-safe: a concurrent
    /// trigger is rejected with [`CycleOutcome::Skipped`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("scrape cycle already in flight, skipping trigger");
            return CycleOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(platforms = self.runners.len(), "starting scrape cycle");

        let mut outcomes: BTreeMap<String, PlatformOutcome> = BTreeMap::new();
        let batches: Vec<&[Arc<dyn PlatformRunner>]> =
            self.runners.chunks(self.settings.max_concurrent).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let futures = batch.iter().map(|runner| {
                let runner = Arc::clone(runner);
                let timeout = self.settings.platform_timeout;
                async move {
                    let slug = runner.slug().to_string();
                    let result = tokio::time::timeout(timeout, runner.scrape()).await;
                    (slug, result)
                }
            });

            for (slug, result) in join_all(futures).await {
                let outcome = match result {
                    Ok(Ok(stats)) => PlatformOutcome::Completed(stats),
                    Ok(Err(err)) => {
                        tracing::error!(platform = slug.as_str(), error = %err, "platform scrape failed");
                        PlatformOutcome::Failed {
                            error: err.to_string(),
                        }
                    }
                    Err(_) => {
                        let err = ScrapeError::ScrapeTimeout {
                            platform: slug.clone(),
                            timeout_secs: self.settings.platform_timeout.as_secs(),
                        };
                        tracing::error!(platform = slug.as_str(), error = %err, "platform scrape timed out");
                        PlatformOutcome::Failed {
                            error: err.to_string(),
                        }
                    }
                };
                outcomes.insert(slug, outcome);
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
            }
        }

        let expired = match self.gateway.expire_stale(Utc::now()).await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = %err, "expiry cleanup failed");
                0
            }
        };

        let report = summarize(started_at, clock, outcomes, expired);
        tracing::info!(
            found = report.total_found,
            saved = report.total_saved,
            updated = report.total_updated,
            errors = report.total_errors,
            expired = report.expired,
            duration_ms = report.duration_ms,
            "scrape cycle finished"
        );
        CycleOutcome::Completed(report)
    }

    /// Run a single platform by slug, outside the batch machinery but under
    /// the same in-flight guard and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Configuration`] for unknown slugs or when a
    /// cycle is already in flight, and the platform's own error otherwise.
    pub async fn run_platform(&self, slug: &str) -> Result<ScrapeStats, ScrapeError> {
        let runner = self
            .runners
            .iter()
            .find(|r| r.slug() == slug)
            .ok_or_else(|| {
                ScrapeError::Configuration(format!("unknown or disabled platform '{slug}'"))
            })?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScrapeError::Configuration(
                "a scrape cycle is already in flight".to_string(),
            ));
        }
        let _guard = InFlightGuard(&self.in_flight);

        match tokio::time::timeout(self.settings.platform_timeout, runner.scrape()).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::ScrapeTimeout {
                platform: slug.to_string(),
                timeout_secs: self.settings.platform_timeout.as_secs(),
            }),
        }
    }

    /// Release shared resources; currently the browser process.
    pub async fn shutdown(&self) {
        if let Some(browser) = &self.browser {
            browser.close().await;
        }
    }
}

fn summarize(
    started_at: DateTime<Utc>,
    clock: Instant,
    platforms: BTreeMap<String, PlatformOutcome>,
    expired: u64,
) -> CycleReport {
    let mut total_found = 0u32;
    let mut total_saved = 0u32;
    let mut total_updated = 0u32;
    let mut total_errors = 0u32;

    for outcome in platforms.values() {
        match outcome {
            PlatformOutcome::Completed(stats) => {
                total_found += stats.found;
                total_saved += stats.saved;
                total_updated += stats.updated;
                total_errors += stats.failed;
            }
            PlatformOutcome::Failed { .. } => total_errors += 1,
        }
    }

    CycleReport {
        started_at,
        duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        platforms,
        total_found,
        total_saved,
        total_updated,
        total_errors,
        expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use promokita_core::MemoryGateway;
    use std::sync::atomic::AtomicUsize;

    struct StubRunner {
        slug: String,
        delay: Duration,
        fail: bool,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl StubRunner {
        fn new(slug: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                slug: slug.to_string(),
                delay,
                fail: false,
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn tracking(
            slug: &str,
            delay: Duration,
            active: Arc<AtomicUsize>,
            max_active: Arc<AtomicUsize>,
        ) -> Arc<Self> {
            Arc::new(Self {
                slug: slug.to_string(),
                delay,
                fail: false,
                active,
                max_active,
            })
        }

        fn failing(slug: &str) -> Arc<Self> {
            Arc::new(Self {
                slug: slug.to_string(),
                delay: Duration::ZERO,
                fail: true,
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl PlatformRunner for StubRunner {
        fn slug(&self) -> &str {
            &self.slug
        }

        async fn scrape(&self) -> Result<ScrapeStats, ScrapeError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(ScrapeError::Configuration("broken".to_string()));
            }
            Ok(ScrapeStats {
                found: 3,
                saved: 2,
                updated: 1,
                failed: 0,
            })
        }
    }

    fn settings(max_concurrent: usize, platform_timeout_secs: u64) -> OrchestratorSettings {
        OrchestratorSettings {
            max_concurrent,
            platform_timeout: Duration::from_secs(platform_timeout_secs),
            inter_batch_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_batch_size() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runners: Vec<Arc<dyn PlatformRunner>> = ["a", "b", "c"]
            .iter()
            .map(|slug| {
                StubRunner::tracking(
                    slug,
                    Duration::from_secs(5),
                    Arc::clone(&active),
                    Arc::clone(&max_active),
                ) as Arc<dyn PlatformRunner>
            })
            .collect();

        let orchestrator =
            Orchestrator::new(runners, Arc::new(MemoryGateway::new()), settings(2, 300));
        let outcome = orchestrator.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Completed(_)));
        assert_eq!(max_active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_platform_times_out_without_aborting_the_cycle() {
        let runners: Vec<Arc<dyn PlatformRunner>> = vec![
            StubRunner::new("fast", Duration::from_secs(1)),
            StubRunner::new("slow", Duration::from_secs(600)),
        ];

        let orchestrator =
            Orchestrator::new(runners, Arc::new(MemoryGateway::new()), settings(2, 300));
        let CycleOutcome::Completed(report) = orchestrator.run_cycle().await else {
            panic!("cycle should complete");
        };

        assert!(matches!(
            report.platforms.get("fast"),
            Some(PlatformOutcome::Completed(_))
        ));
        match report.platforms.get("slow") {
            Some(PlatformOutcome::Failed { error }) => assert!(error.contains("timeout")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_platform_is_captured_not_propagated() {
        let runners: Vec<Arc<dyn PlatformRunner>> = vec![
            StubRunner::failing("broken"),
            StubRunner::new("healthy", Duration::from_secs(1)),
        ];

        let orchestrator =
            Orchestrator::new(runners, Arc::new(MemoryGateway::new()), settings(2, 300));
        let CycleOutcome::Completed(report) = orchestrator.run_cycle().await else {
            panic!("cycle should complete");
        };

        assert!(matches!(
            report.platforms.get("broken"),
            Some(PlatformOutcome::Failed { .. })
        ));
        assert_eq!(report.total_saved, 2);
        assert_eq!(report.total_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_during_a_cycle_is_skipped() {
        let runners: Vec<Arc<dyn PlatformRunner>> =
            vec![StubRunner::new("a", Duration::from_secs(30))];
        let orchestrator = Arc::new(Orchestrator::new(
            runners,
            Arc::new(MemoryGateway::new()),
            settings(1, 300),
        ));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run_cycle().await })
        };
        tokio::task::yield_now().await;

        assert!(orchestrator.is_running());
        assert!(matches!(orchestrator.run_cycle().await, CycleOutcome::Skipped));

        assert!(matches!(
            first.await.unwrap(),
            CycleOutcome::Completed(_)
        ));
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn cleanup_expires_stale_rows_after_the_cycle() {
        use promokita_core::{CouponStatus, DiscountType, NewCoupon};

        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .seed_coupon(NewCoupon {
                title: "Old Deal".to_string(),
                description: "stale".to_string(),
                discount_type: DiscountType::Percentage,
                discount_value: 10,
                coupon_code: None,
                platform_id: 1,
                merchant_id: None,
                source_url: "https://example.test".to_string(),
                image_url: None,
                status: CouponStatus::Active,
                is_featured: false,
                valid_until: Utc::now() - chrono::Duration::days(1),
                scraped_at: Utc::now(),
            })
            .await;

        let orchestrator = Orchestrator::new(Vec::new(), gateway, settings(2, 300));
        let CycleOutcome::Completed(report) = orchestrator.run_cycle().await else {
            panic!("cycle should complete");
        };
        assert_eq!(report.expired, 1);
    }

    #[tokio::test]
    async fn run_platform_rejects_unknown_slugs() {
        let orchestrator = Orchestrator::new(
            Vec::new(),
            Arc::new(MemoryGateway::new()),
            settings(2, 300),
        );
        let err = orchestrator.run_platform("ghost").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(_)));
    }
}
