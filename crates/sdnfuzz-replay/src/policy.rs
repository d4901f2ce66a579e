//! Retry budget and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sdnfuzz_config::ReplaySettings;

/// How long the driver keeps retrying a pending event.
///
/// The default never gives up: a pending event is retried until it becomes
/// ready or the run is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between two attempts, handed to the simulation's I/O loop.
    pub retry_interval: Duration,
    /// Attempts allowed per event. `None` (or `Some(0)`) never gives up.
    pub max_attempts: Option<u32>,
    pub event_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(10),
            max_attempts: None,
            event_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Retry forever.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ReplaySettings) -> Self {
        Self {
            retry_interval: settings.retry_interval(),
            max_attempts: settings.max_attempts(),
            event_timeout: settings.event_timeout(),
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Caps attempts per event; `0` removes the cap, as in configuration.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = (attempts > 0).then_some(attempts);
        self
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = Some(timeout);
        self
    }

    /// True once an event that has been tried `attempts` times over
    /// `elapsed` may not be tried again.
    pub fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| max > 0 && attempts >= max)
            || self.event_timeout.is_some_and(|timeout| elapsed >= timeout)
    }
}

/// Cross-thread switch that stops a replay before its next attempt.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registering with a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_policy_never_exhausts() {
        let policy = RetryPolicy::default();
        assert!(!policy.exhausted(u32::MAX, Duration::from_secs(86_400)));
    }

    #[test_case(3, 0, false ; "before the first attempt")]
    #[test_case(3, 2, false ; "below the cap")]
    #[test_case(3, 3, true ; "at the cap")]
    #[test_case(0, 0, false ; "zero cap before the first attempt")]
    #[test_case(0, 1_000, false ; "zero cap never exhausts")]
    fn attempt_cap(max: u32, attempts: u32, expected: bool) {
        let policy = RetryPolicy::default().with_max_attempts(max);
        assert_eq!(policy.exhausted(attempts, Duration::ZERO), expected);
    }

    #[test]
    fn zero_cap_is_unbounded() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, None);

        let literal = RetryPolicy {
            max_attempts: Some(0),
            ..RetryPolicy::default()
        };
        assert!(!literal.exhausted(0, Duration::ZERO));
    }

    #[test]
    fn timeout_cap() {
        let policy = RetryPolicy::default().with_event_timeout(Duration::from_secs(2));
        assert!(!policy.exhausted(100, Duration::from_secs(1)));
        assert!(policy.exhausted(1, Duration::from_secs(2)));
    }

    #[test]
    fn settings_zero_means_unbounded() {
        let settings = ReplaySettings {
            retry_interval_ms: 25,
            max_attempts: 0,
            event_timeout_secs: 4,
            fail_on_invariant_violation: false,
        };
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.retry_interval, Duration::from_millis(25));
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.event_timeout, Some(Duration::from_secs(4)));
    }

    #[test]
    fn abort_is_shared_between_clones() {
        let handle = AbortHandle::new();
        let remote = handle.clone();
        assert!(!handle.is_aborted());

        std::thread::spawn(move || remote.abort())
            .join()
            .expect("abort thread panicked");
        assert!(handle.is_aborted());
    }

    #[test]
    fn raised_flag_aborts() {
        let handle = AbortHandle::new();
        handle.flag().store(true, Ordering::SeqCst);
        assert!(handle.is_aborted());
    }
}
