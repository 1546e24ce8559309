//! Renewal-rate tracking for self-preservation
//!
//! Renewals are counted in fixed windows. The count of the last completed
//! window is compared against the expected count for the current instance
//! population; nothing is compared until one full window has elapsed.

use crate::config::SelfPreservationConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct WindowState {
    started_at: DateTime<Utc>,
    last_completed: Option<u64>,
}

/// Counts renewals per measurement window
#[derive(Debug)]
pub struct RenewalMeter {
    config: SelfPreservationConfig,
    current: AtomicU64,
    window: Mutex<WindowState>,
}

impl RenewalMeter {
    pub fn new(config: SelfPreservationConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            current: AtomicU64::new(0),
            window: Mutex::new(WindowState {
                started_at: now,
                last_completed: None,
            }),
        }
    }

    pub fn record_renewal(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Close any windows that ended before `now`
    pub fn tick(&self, now: DateTime<Utc>) {
        let window_len = match chrono::Duration::from_std(self.config.window()) {
            Ok(len) => len,
            Err(_) => return,
        };

        let mut state = self.window.lock();
        let elapsed = now - state.started_at;
        if elapsed < window_len {
            return;
        }

        let windows = elapsed.num_milliseconds() / window_len.num_milliseconds().max(1);
        let count = self.current.swap(0, Ordering::Relaxed);
        // Skipped windows saw no renewals at all.
        state.last_completed = Some(if windows == 1 { count } else { 0 });
        state.started_at += window_len * windows as i32;
    }

    /// Renewals counted in the last completed window
    pub fn last_window(&self) -> Option<u64> {
        self.window.lock().last_completed
    }

    /// Renewals counted so far in the open window
    pub fn current_window(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Whether eviction should be suspended for `instances` registered instances
    pub fn should_preserve(&self, instances: usize) -> bool {
        if !self.config.enabled {
            return false;
        }

        let threshold = self.config.renewal_threshold(instances);
        match self.last_window() {
            Some(observed) => threshold > 0 && observed < threshold,
            None => false,
        }
    }

    pub fn config(&self) -> &SelfPreservationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_no_decision_before_first_window() {
        let meter = RenewalMeter::new(SelfPreservationConfig::default(), t(0));
        meter.tick(t(59));
        assert_eq!(meter.last_window(), None);
        assert!(!meter.should_preserve(100));
    }

    #[test]
    fn test_low_rate_triggers_preservation() {
        let meter = RenewalMeter::new(SelfPreservationConfig::default(), t(0));
        for _ in 0..5 {
            meter.record_renewal();
        }
        meter.tick(t(60));
        assert_eq!(meter.last_window(), Some(5));
        // threshold for 10 instances is 17
        assert!(meter.should_preserve(10));
        assert!(!meter.should_preserve(2));
    }

    #[test]
    fn test_skipped_windows_count_as_zero() {
        let meter = RenewalMeter::new(SelfPreservationConfig::default(), t(0));
        for _ in 0..50 {
            meter.record_renewal();
        }
        meter.tick(t(130));
        assert_eq!(meter.last_window(), Some(0));
        assert_eq!(meter.current_window(), 0);
    }

    #[test]
    fn test_disabled_never_preserves() {
        let meter = RenewalMeter::new(SelfPreservationConfig::disabled(), t(0));
        meter.tick(t(60));
        assert!(!meter.should_preserve(10));
    }
}
