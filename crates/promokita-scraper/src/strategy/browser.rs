//! Headless-browser fetch strategy.
//!
//! One Chromium process is launched lazily and shared across pages for the
//! lifetime of the orchestrator; pages are opened per endpoint attempt and
//! closed on every exit path. Navigation retries with linear backoff
//! (`base * attempt`), waits briefly for the primary container selector,
//! scrolls to trigger lazy-loaded content, then hands the rendered markup to
//! the selector-candidate extractor. The whole attempt is bounded by a hard
//! timeout distinct from the per-navigation timeout; when exceeded the
//! strategy is abandoned and the chain falls through.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::anti_detection::{
    jittered_viewport, looks_like_challenge, pick_user_agent, STEALTH_SCRIPT,
};
use crate::error::FetchFailure;
use crate::extract::extract_items;
use crate::strategy::{FetchStrategy, FetchTarget};
use crate::types::RawItem;

const STRATEGY_NAME: &str = "browser";

/// Extra settle time after a bot-challenge page is detected, before the
/// content is re-checked.
const CHALLENGE_SETTLE: Duration = Duration::from_secs(5);

const SELECTOR_POLL: Duration = Duration::from_millis(500);
const SCROLL_SETTLE_MS: u64 = 400;

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[derive(Debug, Clone, Copy)]
pub struct BrowserSettings {
    pub nav_timeout: Duration,
    /// Hard bound on a whole strategy attempt; distinct from `nav_timeout`.
    pub hard_timeout: Duration,
    pub selector_wait: Duration,
    pub scroll_passes: u32,
    pub max_nav_retries: u32,
    pub nav_retry_base_delay: Duration,
}

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

pub struct BrowserFetcher {
    settings: BrowserSettings,
    rng: Mutex<StdRng>,
    session: Mutex<Option<BrowserSession>>,
}

impl BrowserFetcher {
    #[must_use]
    pub fn new(settings: BrowserSettings, rng: StdRng) -> Self {
        Self {
            settings,
            rng: Mutex::new(rng),
            session: Mutex::new(None),
        }
    }

    fn find_chrome() -> Option<PathBuf> {
        for path in CHROME_PATHS {
            let candidate = PathBuf::from(path);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        for cmd in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Some(PathBuf::from(path));
                    }
                }
            }
        }
        None
    }

    /// Launch the shared browser process if it is not already running, and
    /// open a fresh page on it.
    async fn new_page(&self) -> Result<Page, FetchFailure> {
        let mut session = self.session.lock().await;

        if session.is_none() {
            let chrome_path = Self::find_chrome().ok_or_else(|| {
                FetchFailure::new(STRATEGY_NAME, "no Chrome/Chromium executable found")
            })?;

            let (width, height) = jittered_viewport(&mut *self.rng.lock().await);
            tracing::info!(path = %chrome_path.display(), width, height, "launching headless browser");

            let config = BrowserConfig::builder()
                .chrome_executable(chrome_path)
                .window_size(width, height)
                .arg("--headless=new")
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-infobars")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-gpu")
                .arg("--disable-extensions")
                .arg("--disable-background-networking")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--no-sandbox")
                .build()
                .map_err(|e| {
                    FetchFailure::new(STRATEGY_NAME, format!("browser config: {e}"))
                })?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| FetchFailure::new(STRATEGY_NAME, format!("launch failed: {e}")))?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            *session = Some(BrowserSession { browser, handler });
        }

        let browser = &session
            .as_ref()
            .ok_or_else(|| FetchFailure::new(STRATEGY_NAME, "browser session missing"))?
            .browser;

        browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchFailure::new(STRATEGY_NAME, format!("new page: {e}")))
    }

    async fn navigate_with_retry(&self, page: &Page, url: &str) -> Result<(), FetchFailure> {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.settings.max_nav_retries {
            match tokio::time::timeout(self.settings.nav_timeout, page.goto(url)).await {
                Ok(Ok(_)) => {
                    let _ = page.wait_for_navigation().await;

                    if looks_like_challenge(&page_html(page).await.unwrap_or_default()) {
                        tracing::warn!(url, attempt, "bot challenge detected, settling");
                        tokio::time::sleep(CHALLENGE_SETTLE).await;
                        if looks_like_challenge(&page_html(page).await.unwrap_or_default()) {
                            last_error = format!("bot challenge persisted at {url}");
                            Self::backoff(self.settings.nav_retry_base_delay, attempt).await;
                            continue;
                        }
                    }
                    return Ok(());
                }
                Ok(Err(e)) => last_error = format!("navigation failed: {e}"),
                Err(_) => {
                    last_error = format!(
                        "navigation timed out after {}s",
                        self.settings.nav_timeout.as_secs()
                    );
                }
            }
            Self::backoff(self.settings.nav_retry_base_delay, attempt).await;
        }

        Err(FetchFailure::new(STRATEGY_NAME, last_error))
    }

    // Linear backoff: base * attempt (2s, 4s, 6s with the default base).
    async fn backoff(base: Duration, attempt: u32) {
        tokio::time::sleep(base.saturating_mul(attempt)).await;
    }

    /// Poll for the primary container selector; on expiry proceed anyway,
    /// extraction may still find late-rendered content.
    async fn wait_for_container(&self, page: &Page, target: &FetchTarget<'_>) {
        let Some(container) = target.endpoint.selectors.container.first() else {
            return;
        };
        let deadline = tokio::time::Instant::now() + self.settings.selector_wait;
        while tokio::time::Instant::now() < deadline {
            if page.find_element(container.as_str()).await.is_ok() {
                return;
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
        tracing::debug!(
            selector = container.as_str(),
            "container selector never appeared, extracting anyway"
        );
    }

    async fn scroll_passes(&self, page: &Page) {
        for _ in 0..self.settings.scroll_passes {
            if page
                .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .is_err()
            {
                return;
            }
            let jitter = self.rng.lock().await.random_range(0..200);
            tokio::time::sleep(Duration::from_millis(SCROLL_SETTLE_MS + jitter)).await;
        }
    }

    async fn drive_page(
        &self,
        page: &Page,
        target: &FetchTarget<'_>,
    ) -> Result<Vec<RawItem>, FetchFailure> {
        let user_agent = pick_user_agent(&mut *self.rng.lock().await);
        page.set_user_agent(user_agent)
            .await
            .map_err(|e| FetchFailure::new(STRATEGY_NAME, format!("set user agent: {e}")))?;
        page.evaluate_on_new_document(STEALTH_SCRIPT)
            .await
            .map_err(|e| FetchFailure::new(STRATEGY_NAME, format!("stealth script: {e}")))?;

        self.navigate_with_retry(page, &target.url()).await?;
        self.wait_for_container(page, target).await;
        self.scroll_passes(page).await;

        let html = page_html(page)
            .await
            .map_err(|e| FetchFailure::new(STRATEGY_NAME, format!("read page html: {e}")))?;

        Ok(extract_items(
            &html,
            &target.endpoint.selectors,
            target.platform.max_items,
        ))
    }

    /// Shut down the shared browser process. Idempotent.
    pub async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            if let Err(err) = session.browser.close().await {
                tracing::debug!(error = %err, "browser close reported an error");
            }
            session.handler.abort();
        }
    }
}

async fn page_html(page: &Page) -> Result<String, chromiumoxide::error::CdpError> {
    let result = page.evaluate("document.documentElement.outerHTML").await?;
    let html: String = result.into_value().unwrap_or_default();
    Ok(html)
}

#[async_trait]
impl FetchStrategy for BrowserFetcher {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn fetch(&self, target: &FetchTarget<'_>) -> Result<Vec<RawItem>, FetchFailure> {
        if !target.endpoint.selectors.is_usable() {
            return Err(FetchFailure::new(
                STRATEGY_NAME,
                format!(
                    "endpoint '{}' has no usable selector set",
                    target.endpoint.name
                ),
            ));
        }

        let page = self.new_page().await?;

        // The page must be closed on every exit path, including the hard
        // timeout, so the timeout wraps only the driving future.
        let outcome = tokio::time::timeout(
            self.settings.hard_timeout,
            self.drive_page(&page, target),
        )
        .await;

        if let Err(err) = page.close().await {
            tracing::debug!(error = %err, "page close reported an error");
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::new(
                STRATEGY_NAME,
                format!(
                    "hard timeout of {}s exceeded for {}",
                    self.settings.hard_timeout.as_secs(),
                    target.url()
                ),
            )),
        }
    }
}
