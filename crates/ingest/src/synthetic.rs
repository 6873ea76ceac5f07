//! Synthetic traces for demos and tests.
//!
//! Traces are deterministic: the same builder calls always produce the
//! same samples, which keeps replay comparisons exact.

use std::collections::VecDeque;

use shotscope_common::error::ShotscopeResult;
use shotscope_model::sample::{RawImu, RawSample};

use crate::pacing::Pacer;
use crate::LineSource;

/// 1 g on the z axis at ±2g full scale.
const GRAVITY_LSB: i16 = 16384;

/// Builds a raw sample trace segment by segment.
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    interval_ms: u32,
    gyro_lsb_per_dps: f64,
    t_ms: u32,
    seq: u16,
    button: u8,
    gyro_bias: [i16; 3],
    noise: u32,
    samples: Vec<RawSample>,
}

impl TraceBuilder {
    /// A trace at `rate_hz`, starting at device time 0 and seq 0.
    pub fn new(rate_hz: u32) -> Self {
        Self {
            interval_ms: 1000 / rate_hz.max(1),
            gyro_lsb_per_dps: 131.0,
            t_ms: 0,
            seq: 0,
            button: 0,
            gyro_bias: [0; 3],
            noise: 0x2545_f491,
            samples: Vec::new(),
        }
    }

    /// Start at a given device time and sequence number.
    pub fn starting_at(mut self, t_ms: u32, seq: u16) -> Self {
        self.t_ms = t_ms;
        self.seq = seq;
        self
    }

    /// Constant bias added to every gyro axis of both sensors (LSB).
    pub fn with_gyro_bias(mut self, bias: [i16; 3]) -> Self {
        self.gyro_bias = bias;
        self
    }

    /// Device time of the next sample.
    pub fn now_ms(&self) -> u32 {
        self.t_ms
    }

    /// Sensor held still.
    pub fn still(mut self, ms: u32) -> Self {
        for _ in 0..self.count(ms) {
            self.push(0.0);
        }
        self
    }

    /// Constant rotation rate on the primary sensor.
    pub fn hold(mut self, ms: u32, dps: f64) -> Self {
        for _ in 0..self.count(ms) {
            self.push(dps);
        }
        self
    }

    /// Half-sine rotation burst peaking at `peak_dps`.
    pub fn swing(mut self, ms: u32, peak_dps: f64) -> Self {
        let n = self.count(ms);
        for i in 0..n {
            let phase = std::f64::consts::PI * (i as f64 + 0.5) / n as f64;
            self.push(peak_dps * phase.sin());
        }
        self
    }

    /// Press the button for `ms` while still, then release.
    pub fn press(mut self, ms: u32) -> Self {
        self.button = 1;
        self = self.still(ms);
        self.button = 0;
        self
    }

    /// Lose `n` samples on the link.
    pub fn skip(mut self, n: u16) -> Self {
        self.seq = self.seq.wrapping_add(n);
        self.t_ms = self.t_ms.wrapping_add(self.interval_ms * n as u32);
        self
    }

    pub fn build(self) -> Vec<RawSample> {
        self.samples
    }

    /// Wire lines of the trace.
    pub fn lines(self) -> Vec<String> {
        self.samples.iter().map(RawSample::to_line).collect()
    }

    fn count(&self, ms: u32) -> u32 {
        (ms / self.interval_ms).max(1)
    }

    /// Deterministic ±1 LSB jitter.
    fn jitter(&mut self) -> i16 {
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        (self.noise % 3) as i16 - 1
    }

    fn gyro_lsb(&self, dps: f64, axis: usize) -> i16 {
        let v = dps * self.gyro_lsb_per_dps + self.gyro_bias[axis] as f64;
        v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    fn push(&mut self, dps: f64) {
        let j = self.jitter();
        let primary = RawImu {
            accel: [j, 0, GRAVITY_LSB],
            gyro: [
                self.gyro_lsb(dps, 0).saturating_add(j),
                self.gyro_lsb(0.0, 1),
                self.gyro_lsb(dps * 0.25, 2),
            ],
        };
        let secondary = RawImu {
            accel: [0, j, GRAVITY_LSB],
            gyro: [
                self.gyro_lsb(dps * 0.6, 0),
                self.gyro_lsb(0.0, 1).saturating_sub(j),
                self.gyro_lsb(0.0, 2),
            ],
        };
        self.samples.push(RawSample {
            seq: self.seq,
            t_device_ms: self.t_ms,
            button: self.button,
            imu: [primary, secondary],
        });
        self.seq = self.seq.wrapping_add(1);
        self.t_ms = self.t_ms.wrapping_add(self.interval_ms);
    }
}

/// A practice run: a quiet lead-in, then `shots` swings, each followed by a
/// confirming button press about a second later.
pub fn practice_session(shots: usize) -> Vec<RawSample> {
    let mut builder = TraceBuilder::new(100).still(2_000);
    for i in 0..shots {
        builder = builder.swing(600, 250.0 + 25.0 * i as f64).still(900);
        builder = builder.press(300).still(1_800);
    }
    builder.build()
}

/// Emits a synthetic trace, optionally paced in device time.
pub struct SyntheticSource {
    samples: VecDeque<RawSample>,
    pacer: Option<Pacer>,
    announce: Option<String>,
}

impl SyntheticSource {
    /// Emit as fast as the consumer reads.
    pub fn unpaced(samples: Vec<RawSample>) -> Self {
        Self {
            samples: samples.into(),
            pacer: None,
            announce: Some(format!("# proto={}", crate::ingestor::SUPPORTED_PROTOCOL)),
        }
    }

    /// Emit at `speed` × device time.
    pub fn paced(samples: Vec<RawSample>, speed: f64) -> Self {
        Self {
            pacer: Some(Pacer::new(speed)),
            ..Self::unpaced(samples)
        }
    }
}

#[async_trait::async_trait]
impl LineSource for SyntheticSource {
    async fn next_line(&mut self) -> ShotscopeResult<Option<String>> {
        if let Some(status) = self.announce.take() {
            return Ok(Some(status));
        }
        let Some(next) = self.samples.front() else {
            return Ok(None);
        };
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait_for(next.t_device_ms as u64).await;
        }
        Ok(self.samples.pop_front().map(|s| s.to_line()))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
