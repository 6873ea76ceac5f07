//! Clock and timing utilities for the sample stream.
//!
//! Two clocks matter here: the host monotonic clock (anchored at ingest
//! start, used for `t_received`) and the device clock carried in every
//! sample. This module provides utilities for:
//! - Capturing the host epoch
//! - Unwrapping the 32-bit device clock and spotting device resets
//! - Measuring drift between the two
//! - Rate limiting and rolling rate measurement

use std::time::Instant;

/// A host clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment ingestion started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant ingestion started.
    epoch: Instant,
}

impl RecordingClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Get nanoseconds elapsed since the epoch.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert milliseconds to nanoseconds.
    pub fn ms_to_ns(ms: u64) -> u64 {
        ms.saturating_mul(1_000_000)
    }
}

/// How a device timestamp relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineStep {
    /// First timestamp seen since the last reset of the timeline.
    First,
    /// Same or later than the previous timestamp.
    Continuous,
    /// The 32-bit counter overflowed.
    Wrapped,
    /// The device clock jumped backwards: the device restarted.
    DeviceReset,
}

/// Unwraps the device's `u32` millisecond counter into a `u64` timeline.
///
/// A backwards jump larger than half the counter range is an overflow;
/// any smaller backwards jump is a device restart. After a restart the
/// timeline is rebased so it never goes backwards.
#[derive(Debug, Clone, Default)]
pub struct DeviceTimeline {
    last_raw: Option<u32>,
    last_ms: u64,
    base_ms: u64,
}

impl DeviceTimeline {
    const HALF_RANGE: u32 = u32::MAX / 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Map a raw device timestamp onto the unwrapped timeline.
    pub fn advance(&mut self, raw: u32) -> (u64, TimelineStep) {
        let step = match self.last_raw {
            None => {
                self.base_ms = self.last_ms.saturating_sub(raw as u64);
                TimelineStep::First
            }
            Some(last) if raw >= last => TimelineStep::Continuous,
            Some(last) if last - raw > Self::HALF_RANGE => {
                self.base_ms += 1u64 << 32;
                TimelineStep::Wrapped
            }
            Some(_) => {
                self.base_ms = self.last_ms.saturating_sub(raw as u64);
                TimelineStep::DeviceReset
            }
        };
        self.last_raw = Some(raw);
        self.last_ms = self.base_ms + raw as u64;
        (self.last_ms, step)
    }

    /// Forget the previous timestamp. The next one starts a new run but
    /// the timeline still never goes backwards.
    pub fn rearm(&mut self) {
        self.last_raw = None;
    }

    /// Forget everything, including the rebase offset.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Last unwrapped timestamp.
    pub fn last_ms(&self) -> u64 {
        self.last_ms
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }
}

/// Rate limiter for decimating a stream by its own timestamps.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            // Timestamps went backwards: restart the cadence.
            Some(last) if current_ns < last => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Forget the last tick so the next call fires.
    pub fn reset(&mut self) {
        self.last_tick_ns = None;
    }
}

/// Rolling events-per-second over a fixed window.
///
/// The window opens at the first event. Once it has lasted at least
/// `window_ns`, the rate becomes `count / elapsed` and a new window opens.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window_ns: u64,
    window_start_ns: Option<u64>,
    count: u64,
    rate: f64,
}

impl RateWindow {
    pub fn new(window_ns: u64) -> Self {
        Self {
            window_ns: window_ns.max(1),
            window_start_ns: None,
            count: 0,
            rate: 0.0,
        }
    }

    /// One-second window.
    pub fn per_second() -> Self {
        Self::new(1_000_000_000)
    }

    /// Count one event at `now_ns`.
    pub fn record(&mut self, now_ns: u64) {
        if self.window_start_ns.is_none() {
            self.window_start_ns = Some(now_ns);
        }
        self.count += 1;
        self.refresh(now_ns);
    }

    /// Close the window if it has run its length. Call periodically so the
    /// rate decays to zero when events stop.
    pub fn refresh(&mut self, now_ns: u64) {
        let Some(start) = self.window_start_ns else {
            return;
        };
        let elapsed = now_ns.saturating_sub(start);
        if elapsed >= self.window_ns {
            self.rate = self.count as f64 / RecordingClock::ns_to_secs(elapsed);
            self.count = 0;
            self.window_start_ns = Some(now_ns);
        }
    }

    /// Most recently computed rate (events/s).
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn reset(&mut self) {
        self.window_start_ns = None;
        self.count = 0;
        self.rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
    }

    #[test]
    fn test_unit_conversions() {
        assert!((RecordingClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(RecordingClock::ms_to_ns(2), 2_000_000);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(30);
        assert!(ctrl.should_tick(0));
        assert!(!ctrl.should_tick(10_000_000));
        assert!(ctrl.should_tick(34_000_000));
        assert!(ctrl.should_tick(1_000)); // went backwards
        ctrl.reset();
        assert!(ctrl.should_tick(1_000));
    }

    #[test]
    fn test_timeline_wraparound() {
        let mut tl = DeviceTimeline::new();
        assert_eq!(tl.advance(u32::MAX - 5), ((u32::MAX - 5) as u64, TimelineStep::First));
        let (t, step) = tl.advance(4);
        assert_eq!(step, TimelineStep::Wrapped);
        assert_eq!(t, (1u64 << 32) + 4);
    }

    #[test]
    fn test_timeline_device_reset_never_goes_backwards() {
        let mut tl = DeviceTimeline::new();
        tl.advance(50_000);
        tl.advance(50_010);
        let (t, step) = tl.advance(12);
        assert_eq!(step, TimelineStep::DeviceReset);
        assert_eq!(t, 50_010);
        let (t, step) = tl.advance(22);
        assert_eq!(step, TimelineStep::Continuous);
        assert_eq!(t, 50_020);
    }

    #[test]
    fn test_timeline_rearm_continues_from_last() {
        let mut tl = DeviceTimeline::new();
        tl.advance(9_000);
        tl.rearm();
        let (t, step) = tl.advance(100);
        assert_eq!(step, TimelineStep::First);
        assert_eq!(t, 9_000);
    }

    #[test]
    fn test_rate_window() {
        let mut w = RateWindow::per_second();
        for i in 0..100u64 {
            w.record(i * 10_000_000);
        }
        assert_eq!(w.rate(), 0.0); // window not closed yet
        w.record(1_000_000_000);
        assert!((w.rate() - 101.0).abs() < 1e-9);

        // No events for two seconds: rate decays once refreshed.
        w.refresh(3_000_000_000);
        assert_eq!(w.rate(), 0.0);
    }
}
