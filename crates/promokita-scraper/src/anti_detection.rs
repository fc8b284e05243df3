//! Fingerprint-reduction policy for outbound fetches.
//!
//! Covers both strategies that touch live sites: the raw HTTP fetcher gets a
//! rotated user-agent and browser-shaped headers, the headless browser
//! additionally gets an automation-flag suppression script and a jittered
//! viewport. Detection of bot-challenge pages lives here too, so both
//! strategies classify them the same way.

use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};

/// Desktop user-agents rotated per request. Kept to recent mainstream
/// browser builds so the pool itself is not a fingerprint.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

/// Injected before any page script runs; removes the most commonly probed
/// automation signals.
pub const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['id-ID', 'id', 'en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
";

/// Markup fingerprints of bot-challenge interstitials. A page matching any
/// of these is treated as a failed fetch, not as content.
const CHALLENGE_FINGERPRINTS: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "checking your browser",
    "px-captcha",
    "distil_r_captcha",
    "g-recaptcha",
    "h-captcha",
    "mohon verifikasi",
];

#[must_use]
pub fn pick_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS
        .choose(rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Headers a real Indonesian desktop browser would send on a top-level
/// navigation.
#[must_use]
pub fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    headers
}

/// A common laptop viewport with per-session jitter, so every session does
/// not report the same exact dimensions.
#[must_use]
pub fn jittered_viewport<R: Rng + ?Sized>(rng: &mut R) -> (u32, u32) {
    let width = 1366 + rng.random_range(0..=120);
    let height = 768 + rng.random_range(0..=80);
    (width, height)
}

/// Whether `html` looks like a bot-challenge interstitial rather than
/// content.
#[must_use]
pub fn looks_like_challenge(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_FINGERPRINTS
        .iter()
        .any(|fingerprint| lower.contains(fingerprint))
}
