//! Core rate limit evaluation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::key::QuotaKey;
use super::record::{CounterRecord, Decision};
use super::rules::RouteQuota;
use crate::error::Result;
use crate::store::KeyValueStore;

/// Evaluates requests against their route quotas.
///
/// All cross-request state lives in the key-value store; the evaluator
/// itself holds nothing but the store handle and the TTL floor policy. Each
/// call performs one read and at most one write against a single key. The
/// read-then-write pair is deliberately non-transactional: concurrent
/// requests for the same key can race and under- or over-count, which is
/// accepted for abuse mitigation and would not be for billing-grade
/// accounting. A store with an atomic increment-with-expiry primitive could
/// close the race without changing this interface.
pub struct RateLimitEvaluator {
    /// Where counter records live
    store: Arc<dyn KeyValueStore>,
    /// Floor applied to store TTLs, in seconds (0 = no floor). Affects
    /// storage lifetime only, never the reset arithmetic in decisions.
    minimum_ttl_seconds: u64,
}

impl RateLimitEvaluator {
    /// Create an evaluator with no TTL floor.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            minimum_ttl_seconds: 0,
        }
    }

    /// Create an evaluator that clamps store TTLs to a minimum.
    pub fn with_minimum_ttl(store: Arc<dyn KeyValueStore>, minimum_ttl_seconds: u64) -> Self {
        Self {
            store,
            minimum_ttl_seconds,
        }
    }

    /// Evaluate one request for `client_id` against `quota`.
    ///
    /// The caller has already resolved that a rule applies; requests without
    /// a matching rule never reach the evaluator. Store failures propagate
    /// unchanged.
    pub async fn evaluate(&self, client_id: &str, quota: &RouteQuota) -> Result<Decision> {
        self.evaluate_at(Utc::now().timestamp_millis(), client_id, quota)
            .await
    }

    /// Evaluation against an explicit `now`, so window arithmetic is exact
    /// and testable.
    async fn evaluate_at(&self, now_ms: i64, client_id: &str, quota: &RouteQuota) -> Result<Decision> {
        let key = QuotaKey::new(client_id, &quota.route).to_string();
        let interval_ms = quota.interval_seconds as i64 * 1000;

        trace!(key = %key, limit = quota.max_requests, "Evaluating rate limit");

        let record = match self.store.get(&key).await? {
            Some(bytes) => {
                let decoded = CounterRecord::from_bytes(&bytes);
                if decoded.is_none() {
                    warn!(key = %key, "Discarding unreadable counter record");
                }
                decoded
            }
            None => None,
        };

        match record {
            // Active window: count this request or reject it.
            Some(record) if now_ms - record.window_start_ms < interval_ms => {
                let elapsed_ms = now_ms - record.window_start_ms;
                let seconds_until_reset = ((interval_ms - elapsed_ms) as u64).div_ceil(1000);

                if record.request_count >= quota.max_requests {
                    debug!(
                        key = %key,
                        count = record.request_count,
                        limit = quota.max_requests,
                        "Rate limit exceeded"
                    );
                    // The stored count stays untouched while over limit.
                    return Ok(Decision {
                        limited: true,
                        limit: quota.max_requests,
                        current: record.request_count,
                        seconds_until_reset,
                    });
                }

                let updated = record.incremented();
                self.store
                    .set(&key, updated.to_bytes()?, self.clamp_ttl(seconds_until_reset))
                    .await?;

                Ok(Decision {
                    limited: false,
                    limit: quota.max_requests,
                    current: updated.request_count,
                    seconds_until_reset,
                })
            }

            // No record, or the window has fully elapsed: start fresh.
            // TTL expiry in the store and rollover here are equivalent.
            _ => {
                debug!(key = %key, interval = quota.interval_seconds, "Starting new window");
                let fresh = CounterRecord::new(now_ms);
                self.store
                    .set(&key, fresh.to_bytes()?, self.clamp_ttl(quota.interval_seconds))
                    .await?;

                Ok(Decision {
                    limited: false,
                    limit: quota.max_requests,
                    current: 1,
                    seconds_until_reset: quota.interval_seconds,
                })
            }
        }
    }

    fn clamp_ttl(&self, ttl_seconds: u64) -> u64 {
        ttl_seconds.max(self.minimum_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn quota(max_requests: u32, interval_seconds: u64) -> RouteQuota {
        RouteQuota {
            max_requests,
            interval_seconds,
            route: "/api/**".to_string(),
        }
    }

    fn evaluator() -> RateLimitEvaluator {
        RateLimitEvaluator::new(Arc::new(MemoryStore::new()))
    }

    /// Store wrapper that records the TTL of every write.
    struct TtlRecordingStore {
        inner: MemoryStore,
        ttls: Mutex<Vec<u64>>,
    }

    impl TtlRecordingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                ttls: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<u64> {
            self.ttls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyValueStore for TtlRecordingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
            self.ttls.lock().unwrap().push(ttl_seconds);
            self.inner.set(key, value, ttl_seconds).await
        }
    }

    #[tokio::test]
    async fn test_first_request_starts_window() {
        let evaluator = evaluator();
        let decision = evaluator.evaluate_at(0, "203.0.113.7", &quota(2, 60)).await.unwrap();

        assert!(!decision.limited);
        assert_eq!(decision.limit, 2);
        assert_eq!(decision.current, 1);
        assert_eq!(decision.seconds_until_reset, 60);
    }

    #[tokio::test]
    async fn test_two_per_minute_scenario() {
        // maxRequests=2, intervalSeconds=60, requests at t=0, 10, 20.
        let evaluator = evaluator();
        let quota = quota(2, 60);

        let first = evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        assert!(!first.limited);
        assert_eq!(first.current, 1);
        assert_eq!(first.seconds_until_reset, 60);

        let second = evaluator.evaluate_at(10_000, "c", &quota).await.unwrap();
        assert!(!second.limited);
        assert_eq!(second.current, 2);
        assert_eq!(second.seconds_until_reset, 50);

        let third = evaluator.evaluate_at(20_000, "c", &quota).await.unwrap();
        assert!(third.limited);
        assert_eq!(third.current, 2);
        assert_eq!(third.seconds_until_reset, 40);
    }

    #[tokio::test]
    async fn test_window_rollover_resets_count() {
        // A request at t=61s after a t=0 request is a brand new window.
        let evaluator = evaluator();
        let quota = quota(2, 60);

        evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        let decision = evaluator.evaluate_at(61_000, "c", &quota).await.unwrap();

        assert!(!decision.limited);
        assert_eq!(decision.current, 1);
        assert_eq!(decision.seconds_until_reset, 60);
    }

    #[tokio::test]
    async fn test_rollover_at_exact_boundary() {
        let evaluator = evaluator();
        let quota = quota(1, 60);

        evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        // One millisecond short of the boundary is still the old window.
        let before = evaluator.evaluate_at(59_999, "c", &quota).await.unwrap();
        assert!(before.limited);

        let at = evaluator.evaluate_at(60_000, "c", &quota).await.unwrap();
        assert!(!at.limited);
        assert_eq!(at.current, 1);
    }

    #[tokio::test]
    async fn test_rejection_is_idempotent() {
        let evaluator = evaluator();
        let quota = quota(1, 60);

        evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        for t in [1_000, 2_000, 30_000] {
            let decision = evaluator.evaluate_at(t, "c", &quota).await.unwrap();
            assert!(decision.limited);
            assert_eq!(decision.current, 1);
        }
    }

    #[tokio::test]
    async fn test_rejection_does_not_write() {
        let store = Arc::new(TtlRecordingStore::new());
        let evaluator = RateLimitEvaluator::new(store.clone());
        let quota = quota(1, 60);

        evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        assert_eq!(store.recorded().len(), 1);

        evaluator.evaluate_at(5_000, "c", &quota).await.unwrap();
        assert_eq!(store.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_seconds_until_reset_shrinks_and_rounds_up() {
        let evaluator = evaluator();
        let quota = quota(100, 60);

        let at_start = evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        assert_eq!(at_start.seconds_until_reset, 60);

        // 100ms into the window still rounds up to the full interval.
        let just_after = evaluator.evaluate_at(100, "c", &quota).await.unwrap();
        assert_eq!(just_after.seconds_until_reset, 60);

        let midway = evaluator.evaluate_at(30_500, "c", &quota).await.unwrap();
        assert_eq!(midway.seconds_until_reset, 30);

        let near_end = evaluator.evaluate_at(59_001, "c", &quota).await.unwrap();
        assert_eq!(near_end.seconds_until_reset, 1);
    }

    #[tokio::test]
    async fn test_distinct_clients_do_not_share_state() {
        let evaluator = evaluator();
        let quota = quota(1, 60);

        let a = evaluator.evaluate_at(0, "203.0.113.7", &quota).await.unwrap();
        let b = evaluator.evaluate_at(0, "203.0.113.8", &quota).await.unwrap();
        assert!(!a.limited);
        assert!(!b.limited);

        let a_again = evaluator.evaluate_at(1_000, "203.0.113.7", &quota).await.unwrap();
        assert!(a_again.limited);
        let b_again = evaluator.evaluate_at(1_000, "203.0.113.8", &quota).await.unwrap();
        assert!(b_again.limited);
    }

    #[tokio::test]
    async fn test_distinct_routes_do_not_share_state() {
        let evaluator = evaluator();
        let api = quota(1, 60);
        let other = RouteQuota {
            max_requests: 1,
            interval_seconds: 60,
            route: "/other/**".to_string(),
        };

        evaluator.evaluate_at(0, "c", &api).await.unwrap();
        assert!(evaluator.evaluate_at(1_000, "c", &api).await.unwrap().limited);

        let decision = evaluator.evaluate_at(1_000, "c", &other).await.unwrap();
        assert!(!decision.limited);
    }

    #[tokio::test]
    async fn test_first_m_admitted_then_limited() {
        let evaluator = evaluator();
        let quota = quota(5, 60);

        for ordinal in 1..=5u32 {
            let decision = evaluator
                .evaluate_at(ordinal as i64 * 100, "c", &quota)
                .await
                .unwrap();
            assert!(!decision.limited);
            assert_eq!(decision.current, ordinal);
        }

        let sixth = evaluator.evaluate_at(600, "c", &quota).await.unwrap();
        assert!(sixth.limited);
        assert_eq!(sixth.current, 5);
    }

    #[tokio::test]
    async fn test_ttl_follows_remaining_window() {
        let store = Arc::new(TtlRecordingStore::new());
        let evaluator = RateLimitEvaluator::new(store.clone());
        let quota = quota(10, 60);

        evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        evaluator.evaluate_at(10_000, "c", &quota).await.unwrap();

        // New window stores the full interval; the write-back stores the
        // remaining window only.
        assert_eq!(store.recorded(), vec![60, 50]);
    }

    #[tokio::test]
    async fn test_minimum_ttl_floor_clamps_storage_only() {
        let store = Arc::new(TtlRecordingStore::new());
        let evaluator = RateLimitEvaluator::with_minimum_ttl(store.clone(), 60);
        let quota = quota(10, 5);

        let first = evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        let second = evaluator.evaluate_at(2_000, "c", &quota).await.unwrap();

        // Storage lifetime is clamped to the floor...
        assert_eq!(store.recorded(), vec![60, 60]);
        // ...but the decision arithmetic still reflects the real window.
        assert_eq!(first.seconds_until_reset, 5);
        assert_eq!(second.seconds_until_reset, 3);
    }

    #[tokio::test]
    async fn test_unreadable_record_starts_fresh_window() {
        let store = Arc::new(MemoryStore::new());
        let evaluator = RateLimitEvaluator::new(store.clone());
        let quota = quota(2, 60);

        let key = QuotaKey::new("c", &quota.route).to_string();
        store.set(&key, b"garbage".to_vec(), 60).await.unwrap();

        let decision = evaluator.evaluate_at(0, "c", &quota).await.unwrap();
        assert!(!decision.limited);
        assert_eq!(decision.current, 1);
    }

    #[tokio::test]
    async fn test_empty_client_identifier_is_a_valid_bucket() {
        let evaluator = evaluator();
        let quota = quota(1, 60);

        let first = evaluator.evaluate_at(0, "", &quota).await.unwrap();
        assert!(!first.limited);
        let second = evaluator.evaluate_at(1_000, "", &quota).await.unwrap();
        assert!(second.limited);
    }
}
