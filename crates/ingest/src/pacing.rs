//! Emission pacing by device timestamps.

use std::time::Duration;

use tokio::time::Instant;

/// Schedules samples so that consecutive emissions are separated by their
/// device-time delta divided by a speed multiplier.
///
/// Deadlines chain from the previous deadline rather than from "now", so
/// processing overhead does not accumulate as drift. Waiting is
/// cancel-safe: a dropped wait keeps its deadline for the same sample.
#[derive(Debug, Clone)]
pub struct Pacer {
    speed: f64,
    last: Option<(u64, Instant)>,
    pending: Option<(u64, Instant)>,
}

impl Pacer {
    pub fn new(speed: f64) -> Self {
        Self {
            speed,
            last: None,
            pending: None,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Change speed. The next sample is due immediately.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
        self.reanchor();
    }

    /// Forget the schedule (after pause or seek). The next sample is due immediately.
    pub fn reanchor(&mut self) {
        self.last = None;
        self.pending = None;
    }

    /// Wall delay between two device timestamps at `speed`.
    pub fn delay_between(t0_ms: u64, t1_ms: u64, speed: f64) -> Duration {
        let delta_ms = t1_ms.saturating_sub(t0_ms) as f64;
        Duration::from_secs_f64(delta_ms / 1000.0 / speed)
    }

    /// Deadline for the sample stamped `t_ms`.
    pub fn deadline(&mut self, t_ms: u64) -> Instant {
        if let Some((t, due)) = self.pending {
            if t == t_ms {
                return due;
            }
        }
        let due = match self.last {
            None => Instant::now(),
            Some((last_t, last_due)) => last_due + Self::delay_between(last_t, t_ms, self.speed),
        };
        self.pending = Some((t_ms, due));
        due
    }

    /// Sleep until the sample stamped `t_ms` is due.
    pub async fn wait_for(&mut self, t_ms: u64) {
        let due = self.deadline(t_ms);
        tokio::time::sleep_until(due).await;
        self.pending = None;
        self.last = Some((t_ms, due));
    }
}
