//! Raw HTTP fetch with heuristic markup parsing.
//!
//! Cheapest and fastest strategy, also the most brittle: a plain GET with
//! browser-shaped headers, then regex heuristics over the returned markup
//! (promo-class fragments, headings, discount/price/image/link patterns).
//! No DOM is built; this tier exists to harvest the easy cases before the
//! expensive browser tier is attempted.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use regex::Regex;
use tokio::sync::Mutex;

use crate::anti_detection::{browser_headers, looks_like_challenge, pick_user_agent};
use crate::error::FetchFailure;
use crate::strategy::{FetchStrategy, FetchTarget};
use crate::types::RawItem;

const STRATEGY_NAME: &str = "http";

static PROMO_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<[a-z][^>]*class="[^"]*(?:promo|voucher|deal|coupon|diskon)[^"]*"[^>]*>\s*([^<]{5,150}?)\s*<"#,
    )
    .expect("valid regex")
});
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-4][^>]*>\s*([^<]{5,150}?)\s*</h[1-4]>").expect("valid regex")
});
static DISCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}\s*%|rp\.?\s*\d[\d.,]*|gratis\s+ongkir|cashback\s+\d[\d.,%]*)")
        .expect("valid regex")
});
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src="(https?://[^"]+)""#).expect("valid regex")
});
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"(?i)<a[^>]+href="([^"#]+)""##).expect("valid regex"));
static TITLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>\s*(.*?)\s*</title>").expect("valid regex"));

pub struct HttpFetcher {
    client: reqwest::Client,
    rng: Mutex<StdRng>,
}

impl HttpFetcher {
    /// Build the fetcher with its own pooled client.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the client cannot be constructed.
    pub fn new(request_timeout: Duration, rng: StdRng) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            rng: Mutex::new(rng),
        })
    }

    async fn get_html(&self, url: &str) -> Result<String, FetchFailure> {
        let user_agent = pick_user_agent(&mut *self.rng.lock().await);
        let response = self
            .client
            .get(url)
            .headers(browser_headers(user_agent))
            .send()
            .await
            .map_err(|e| FetchFailure::new(STRATEGY_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::new(
                STRATEGY_NAME,
                format!("unexpected status {status} for {url}"),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchFailure::new(STRATEGY_NAME, e.to_string()))?;

        if looks_like_challenge(&html) {
            return Err(FetchFailure::new(
                STRATEGY_NAME,
                format!("bot challenge page at {url}"),
            ));
        }

        Ok(html)
    }

    /// Liveness probe: fetch `url` and return the page title.
    ///
    /// Read-only by construction; used by health checks, never by the
    /// scrape path.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure`] on transport errors, non-2xx status, or an
    /// empty/error-looking page title.
    pub async fn probe(&self, url: &str) -> Result<String, FetchFailure> {
        let html = self.get_html(url).await?;
        let title = TITLE_TAG_RE
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let lower = title.to_lowercase();
        if title.is_empty() || lower.contains("error") || lower.contains("not found") {
            return Err(FetchFailure::new(
                STRATEGY_NAME,
                format!("probe of {url} returned page title '{title}'"),
            ));
        }
        Ok(title)
    }
}

/// Assemble up to `max_items` items from `html` by pairing the n-th title
/// candidate with the n-th discount/image/link match.
#[must_use]
pub fn parse_heuristic(html: &str, base_url: &str, max_items: usize) -> Vec<RawItem> {
    let mut titles: Vec<String> = PROMO_CLASS_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| collapse(m.as_str()))
        .collect();
    if titles.is_empty() {
        titles = HEADING_RE
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .map(|m| collapse(m.as_str()))
            .collect();
    }

    let discounts: Vec<String> = DISCOUNT_RE
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .collect();
    let images: Vec<String> = IMAGE_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    let links: Vec<String> = LINK_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| absolutize(m.as_str(), base_url))
        .collect();

    titles
        .into_iter()
        .filter(|t| !t.is_empty())
        .take(max_items)
        .enumerate()
        .map(|(i, title)| RawItem {
            title,
            discount_text: discounts.get(i).cloned(),
            image_url: images.get(i).cloned(),
            link: links.get(i).cloned(),
            ..RawItem::default()
        })
        .collect()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn absolutize(href: &str, base_url: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn fetch(&self, target: &FetchTarget<'_>) -> Result<Vec<RawItem>, FetchFailure> {
        let url = target.url();
        let html = self.get_html(&url).await?;
        Ok(parse_heuristic(
            &html,
            &target.platform.base_url,
            target.platform.max_items,
        ))
    }
}
