//! Deduplication cache — suppresses repeat sends of the same number.
//!
//! The field-change and snapshot watchers can both observe the same write.
//! Before dispatching, each asks the cache whether `(game, date, number)` was
//! already sent within the window; only the first caller passes.
//!
//! The check-then-set runs under one lock, so it stays atomic when watchers
//! run on different worker threads. Entries older than the window are
//! evicted on every call, bounding memory to the keys seen in one window.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Default suppression window (5 seconds).
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(5000);

#[derive(Default)]
struct DedupState {
    last_sent: HashMap<String, Instant>,
    /// Send attempts in time order, for eviction.
    order: VecDeque<(Instant, String)>,
}

impl DedupState {
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.order.front() {
            if now.saturating_duration_since(*at) < window {
                break;
            }
            if let Some((at, key)) = self.order.pop_front() {
                // A newer attempt for the same key has its own queue entry.
                if self.last_sent.get(&key) == Some(&at) {
                    self.last_sent.remove(&key);
                }
            }
        }
    }
}

pub struct DedupCache {
    window: Duration,
    state: Mutex<DedupState>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(DedupState::default()),
        }
    }

    /// Check whether a notification should go out, and if so record it.
    ///
    /// Returns `true` if no send for the same key happened within the window
    /// (the attempt is recorded). Returns `false` if one did (nothing recorded).
    pub async fn should_send(&self, game: &str, date: &str, number: &str) -> bool {
        self.should_send_at(game, date, number, Instant::now()).await
    }

    /// [`should_send`](Self::should_send) at an explicit instant.
    pub async fn should_send_at(&self, game: &str, date: &str, number: &str, now: Instant) -> bool {
        let key = dedup_key(game, date, number);
        let mut state = self.state.lock().await;
        state.evict(now, self.window);

        if let Some(prior) = state.last_sent.get(&key) {
            let elapsed = now.saturating_duration_since(*prior);
            if elapsed < self.window {
                tracing::debug!(
                    game,
                    date,
                    number,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Skipping duplicate notification"
                );
                return false;
            }
        }

        state.last_sent.insert(key.clone(), now);
        state.order.push_back((now, key));
        true
    }

    /// Number of keys currently remembered (for monitoring).
    pub async fn tracked_len(&self) -> usize {
        self.state.lock().await.last_sent.len()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

fn dedup_key(game: &str, date: &str, number: &str) -> String {
    format!("{}|{}|{}", game, date, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: &str = "2026-10-14";

    #[tokio::test]
    async fn test_second_send_within_window_is_suppressed() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.should_send_at("kalyan", DATE, "45", t0).await);
        assert!(
            !cache
                .should_send_at("kalyan", DATE, "45", t0 + Duration::from_millis(4999))
                .await
        );
    }

    #[tokio::test]
    async fn test_sends_outside_window_both_pass() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.should_send_at("kalyan", DATE, "45", t0).await);
        assert!(
            cache
                .should_send_at("kalyan", DATE, "45", t0 + Duration::from_millis(5001))
                .await
        );
    }

    #[tokio::test]
    async fn test_suppressed_call_does_not_extend_window() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.should_send_at("kalyan", DATE, "45", t0).await);
        assert!(
            !cache
                .should_send_at("kalyan", DATE, "45", t0 + Duration::from_millis(3000))
                .await
        );
        // Measured from the first send, not the suppressed one.
        assert!(
            cache
                .should_send_at("kalyan", DATE, "45", t0 + Duration::from_millis(5000))
                .await
        );
    }

    #[tokio::test]
    async fn test_distinct_keys_are_independent() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.should_send_at("kalyan", DATE, "45", t0).await);
        assert!(cache.should_send_at("kalyan", DATE, "46", t0).await);
        assert!(cache.should_send_at("milan", DATE, "45", t0).await);
        assert!(cache.should_send_at("kalyan", "2026-10-15", "45", t0).await);
        assert_eq!(cache.tracked_len().await, 4);
    }

    #[tokio::test]
    async fn test_old_entries_are_evicted() {
        let cache = DedupCache::new(Duration::from_millis(100));
        let t0 = Instant::now();
        for n in 0..10 {
            assert!(cache.should_send_at("kalyan", DATE, &n.to_string(), t0).await);
        }
        assert_eq!(cache.tracked_len().await, 10);

        assert!(
            cache
                .should_send_at("milan", DATE, "1", t0 + Duration::from_millis(150))
                .await
        );
        assert_eq!(cache.tracked_len().await, 1);
    }

    #[tokio::test]
    async fn test_resend_keeps_latest_entry_through_eviction() {
        let cache = DedupCache::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(cache.should_send_at("kalyan", DATE, "45", t0).await);
        let t1 = t0 + Duration::from_millis(120);
        assert!(cache.should_send_at("kalyan", DATE, "45", t1).await);
        // The stale queue entry from t0 must not drop the t1 record.
        assert!(
            !cache
                .should_send_at("kalyan", DATE, "45", t1 + Duration::from_millis(50))
                .await
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_let_exactly_one_through() {
        let cache = std::sync::Arc::new(DedupCache::default());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..64 {
            let cache = cache.clone();
            tasks.spawn(async move { cache.should_send("kalyan", DATE, "45").await });
        }

        let mut passed = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                passed += 1;
            }
        }
        assert_eq!(passed, 1);
        assert_eq!(cache.tracked_len().await, 1);
    }
}
