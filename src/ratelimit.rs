//! In-process sliding-window rate limiting.
//!
//! Each (principal, rule) pair keeps a log of recent request instants; a
//! request is admitted when fewer than `rule.max` instants remain inside the
//! window. Principals are user ids for authenticated traffic and client IPs
//! otherwise.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::config::RateRule;

/// Returned when a request is rejected. `retry_after` is how long until the
/// oldest counted request leaves the window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimited {
    pub rule_name: &'static str,
    pub retry_after: Duration,
}

impl RateLimited {
    pub fn message(&self) -> String {
        let secs = self.retry_after.as_secs().max(1);
        format!("Too many requests. Try again in {secs} seconds.")
    }
}

#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(String, &'static str), VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits or rejects a request for `key` under `rule`, counting it when
    /// admitted.
    pub fn check(&self, key: &str, rule: &RateRule) -> Result<(), RateLimited> {
        self.check_at(key, rule, Instant::now())
    }

    pub fn check_at(&self, key: &str, rule: &RateRule, now: Instant) -> Result<(), RateLimited> {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bucket = buckets
            .entry((key.to_string(), rule.name))
            .or_insert_with(VecDeque::new);

        while let Some(&oldest) = bucket.front() {
            if now.duration_since(oldest) >= rule.window {
                bucket.pop_front();
            } else {
                break;
            }
        }

        if bucket.len() >= rule.max {
            if let Some(&oldest) = bucket.front() {
                let retry_after = rule.window.saturating_sub(now.duration_since(oldest));
                return Err(RateLimited {
                    rule_name: rule.name,
                    retry_after,
                });
            }
        }

        bucket.push_back(now);
        Ok(())
    }

    /// Checks several rules atomically-enough for our purposes: rules are
    /// evaluated in order and the first rejection wins. A request admitted by
    /// an earlier rule but rejected by a later one still counts against the
    /// earlier rule, which errs on the side of strictness.
    pub fn check_all(&self, key: &str, rules: &[RateRule]) -> Result<(), RateLimited> {
        for rule in rules {
            self.check(key, rule)?;
        }
        Ok(())
    }

    /// Drops buckets whose entire log has aged out. Called periodically from
    /// the maintenance loop so idle principals do not accumulate forever.
    pub fn prune(&self, max_window: Duration) {
        self.prune_at(max_window, Instant::now());
    }

    pub fn prune_at(&self, max_window: Duration, now: Instant) {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buckets.retain(|_, bucket| {
            bucket
                .back()
                .is_some_and(|&latest| now.duration_since(latest) < max_window)
        });
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().expect("lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateRule = RateRule {
        name: "test",
        max: 3,
        window: Duration::from_secs(60),
    };

    #[test]
    fn admits_up_to_max_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("alice", &RULE, now).is_ok());
        }
        let rejected = limiter.check_at("alice", &RULE, now).unwrap_err();
        assert_eq!(rejected.rule_name, "test");
        assert_eq!(rejected.retry_after, Duration::from_secs(60));
    }

    #[test]
    fn window_slides_as_requests_age_out() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.check_at("alice", &RULE, start).is_ok());
        assert!(limiter
            .check_at("alice", &RULE, start + Duration::from_secs(30))
            .is_ok());
        assert!(limiter
            .check_at("alice", &RULE, start + Duration::from_secs(45))
            .is_ok());
        assert!(limiter
            .check_at("alice", &RULE, start + Duration::from_secs(50))
            .is_err());

        // One second past the window of the first request; only its slot has
        // freed, so a single admission refills the bucket.
        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at("alice", &RULE, later).is_ok());
        assert!(limiter.check_at("alice", &RULE, later).is_err());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("alice", &RULE, now).is_ok());
        }
        assert!(limiter.check_at("bob", &RULE, now).is_ok());
    }

    #[test]
    fn retry_after_shrinks_over_time() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("alice", &RULE, start).is_ok());
        }

        let at_30s = start + Duration::from_secs(30);
        let rejected = limiter.check_at("alice", &RULE, at_30s).unwrap_err();
        assert_eq!(rejected.retry_after, Duration::from_secs(30));
    }

    #[test]
    fn check_all_stops_at_first_rejection() {
        let tight = RateRule {
            name: "tight",
            max: 1,
            window: Duration::from_secs(60),
        };
        let limiter = RateLimiter::new();

        assert!(limiter.check_all("alice", &[RULE, tight]).is_ok());
        let rejected = limiter.check_all("alice", &[RULE, tight]).unwrap_err();
        assert_eq!(rejected.rule_name, "tight");
    }

    #[test]
    fn prune_drops_idle_buckets() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.check_at("alice", &RULE, start).expect("admit");
        assert_eq!(limiter.bucket_count(), 1);

        limiter.prune_at(Duration::from_secs(60), start + Duration::from_secs(120));
        assert_eq!(limiter.bucket_count(), 0);
    }
}
