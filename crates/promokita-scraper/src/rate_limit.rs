//! Per-platform sliding-window admission control.
//!
//! Each platform key owns an ordered log of recent request instants. An
//! acquisition prunes entries older than the window, and when the remaining
//! count has reached the cap it sleeps exactly until the oldest entry falls
//! out of the window before recording itself.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use promokita_core::RateLimitConfig;

#[derive(Debug, Default)]
pub struct RateLimiter {
    // Outer lock is held only to find or create the per-key queue; the inner
    // lock is held across the whole admission (prune, wait, record) so
    // concurrent callers for one key form a single queue.
    keys: Mutex<HashMap<String, Arc<Mutex<VecDeque<Instant>>>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a request for `key` is admissible under `limit`, then
    /// record it.
    pub async fn acquire(&self, key: &str, limit: RateLimitConfig) {
        let log = {
            let mut keys = self.keys.lock().await;
            Arc::clone(keys.entry(key.to_string()).or_default())
        };

        let window = Duration::from_secs(limit.window_secs);
        let mut log = log.lock().await;

        loop {
            let now = Instant::now();
            while log
                .front()
                .is_some_and(|oldest| now.duration_since(*oldest) >= window)
            {
                log.pop_front();
            }

            if log.len() < limit.max_requests {
                break;
            }

            // wait = window - (now - oldest); after the sleep the oldest
            // entry has aged out, but re-check in case of timer coarseness.
            if let Some(oldest) = log.front() {
                let wait = window.saturating_sub(now.duration_since(*oldest));
                tracing::debug!(key, wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
                tokio::time::sleep(wait).await;
            }
        }

        log.push_back(Instant::now());
    }

    /// Number of keys currently tracked. Diagnostic only.
    pub async fn tracked_keys(&self) -> usize {
        self.keys.lock().await.len()
    }

    /// Per-key count of retained request instants, for status reporting.
    /// Entries are pruned on acquisition, so a quiet key may briefly
    /// over-report until its next request.
    pub async fn snapshot(&self) -> BTreeMap<String, usize> {
        let keys = self.keys.lock().await;
        let mut counts = BTreeMap::new();
        for (key, log) in keys.iter() {
            counts.insert(key.clone(), log.lock().await.len());
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(max_requests: usize, window_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window_secs,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn under_cap_admits_immediately() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire("shopee", limit(3, 60)).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn over_cap_blocks_for_the_remaining_window() {
        let limiter = RateLimiter::new();
        for _ in 0..2 {
            limiter.acquire("shopee", limit(2, 60)).await;
        }

        let start = Instant::now();
        limiter.acquire("shopee", limit(2, 60)).await;
        assert!(start.elapsed() >= Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_up_after_oldest_ages_out() {
        let limiter = RateLimiter::new();
        limiter.acquire("grab", limit(1, 10)).await;

        tokio::time::advance(Duration::from_secs(11)).await;

        let start = Instant::now();
        limiter.acquire("grab", limit(1, 10)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new();
        limiter.acquire("shopee", limit(1, 60)).await;

        // A different platform is not throttled by shopee's window.
        let start = Instant::now();
        limiter.acquire("tokopedia", limit(1, 60)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.tracked_keys().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_for_one_key_are_serialized() {
        let limiter = Arc::new(RateLimiter::new());
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire("lazada", limit(2, 30)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Two admitted immediately, the third only after the window opened:
        // the cap was never exceeded inside any 30s window.
        assert!(start.elapsed() >= Duration::from_secs(29));
    }
}
