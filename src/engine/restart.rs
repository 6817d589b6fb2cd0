// src/engine/restart.rs

//! Relaunch policy for services whose process died.
//!
//! The default policy relaunches immediately and without limit. Settings may
//! add a backoff delay and a cap on restarts within a sliding window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::NameKey;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before restart number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = if secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        if self.max.is_zero() {
            delay
        } else {
            delay.min(self.max)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// `0` means unlimited.
    pub max_restarts: u32,
    pub window: Duration,
    pub backoff: BackoffConfig,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 0,
            window: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Now,
    After(Duration),
    /// Too many restarts inside the window; leave the service stopped.
    GiveUp { restarts: u32 },
}

/// Per-job restart history.
#[derive(Debug, Default)]
pub struct RestartTracker {
    policy: RestartPolicy,
    history: HashMap<NameKey, VecDeque<DateTime<Utc>>>,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            history: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    /// Record that `job` died at `now` and decide whether to relaunch it.
    pub fn on_exit(&mut self, job: &NameKey, now: DateTime<Utc>) -> RestartDecision {
        let window = chrono::Duration::from_std(self.policy.window).unwrap_or(chrono::Duration::MAX);
        let history = self.history.entry(job.clone()).or_default();
        while history
            .front()
            .is_some_and(|when| now.signed_duration_since(*when) > window)
        {
            history.pop_front();
        }

        let recent = u32::try_from(history.len()).unwrap_or(u32::MAX);
        if self.policy.max_restarts > 0 && recent >= self.policy.max_restarts {
            return RestartDecision::GiveUp { restarts: recent };
        }

        history.push_back(now);
        let delay = self.policy.backoff.delay_for_attempt(recent + 1);
        if delay.is_zero() {
            RestartDecision::Now
        } else {
            RestartDecision::After(delay)
        }
    }

    /// Forget the history, e.g. after an explicit start request.
    pub fn forget(&mut self, job: &NameKey) {
        self.history.remove(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_relaunches_immediately() {
        let mut tracker = RestartTracker::default();
        let job = NameKey::from("svc");
        for _ in 0..50 {
            assert_eq!(tracker.on_exit(&job, Utc::now()), RestartDecision::Now);
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(300),
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn gives_up_after_limit_within_window() {
        let mut tracker = RestartTracker::new(RestartPolicy {
            max_restarts: 2,
            window: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
        });
        let job = NameKey::from("svc");
        let start = Utc::now();

        assert_eq!(tracker.on_exit(&job, start), RestartDecision::Now);
        assert_eq!(tracker.on_exit(&job, start), RestartDecision::Now);
        assert_eq!(
            tracker.on_exit(&job, start),
            RestartDecision::GiveUp { restarts: 2 }
        );

        let later = start + chrono::Duration::seconds(120);
        assert_eq!(tracker.on_exit(&job, later), RestartDecision::Now);
    }
}
