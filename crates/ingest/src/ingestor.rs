//! Wire parsing, gap detection and rate accounting.

use shotscope_common::clock::{DeviceTimeline, DriftMeasurement, RateWindow, TimelineStep};
use shotscope_model::sample::{RawImu, RawSample, STATUS_MARKER, WIRE_FIELD_COUNT};
use shotscope_model::stats::Stats;

/// Protocol version this ingestor understands.
pub const SUPPORTED_PROTOCOL: u32 = 1;

const FIELD_NAMES: [&str; WIRE_FIELD_COUNT] = [
    "seq",
    "t_device_ms",
    "button",
    "ax1",
    "ay1",
    "az1",
    "gx1",
    "gy1",
    "gz1",
    "ax2",
    "ay2",
    "az2",
    "gx2",
    "gy2",
    "gz2",
];

/// Why a data line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field {name} has invalid value '{value}'")]
    InvalidField { name: &'static str, value: String },
}

/// A sample accepted by the ingestor.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedSample {
    pub raw: RawSample,
    /// Unwrapped device time (ms).
    pub t_ms: u64,
    /// Host receive time (ns).
    pub t_received_ns: u64,
    /// Samples missing between the previous sample and this one.
    pub gap: u64,
    /// The device restarted just before this sample.
    pub device_reset: bool,
}

/// Result of feeding one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Sample(IngestedSample),
    /// A `#` line. Routed to logging, never counted as an error.
    Status(String),
    /// Blank line.
    Empty,
    /// Malformed data line; counted in `parse_err`.
    Rejected(ParseError),
    /// Data line from a producer with an unsupported protocol version.
    Discarded,
}

/// Parse one data line into a `RawSample`.
pub fn parse_line(line: &str) -> Result<RawSample, ParseError> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() != WIRE_FIELD_COUNT {
        return Err(ParseError::FieldCount {
            expected: WIRE_FIELD_COUNT,
            found: fields.len(),
        });
    }

    fn field<T: std::str::FromStr>(fields: &[&str], i: usize) -> Result<T, ParseError> {
        fields[i].parse().map_err(|_| ParseError::InvalidField {
            name: FIELD_NAMES[i],
            value: fields[i].to_string(),
        })
    }

    let button: u8 = field(&fields, 2)?;
    if button > 1 {
        return Err(ParseError::InvalidField {
            name: "button",
            value: fields[2].to_string(),
        });
    }

    let imu = |base: usize| -> Result<RawImu, ParseError> {
        Ok(RawImu {
            accel: [
                field(&fields, base)?,
                field(&fields, base + 1)?,
                field(&fields, base + 2)?,
            ],
            gyro: [
                field(&fields, base + 3)?,
                field(&fields, base + 4)?,
                field(&fields, base + 5)?,
            ],
        })
    };

    Ok(RawSample {
        seq: field(&fields, 0)?,
        t_device_ms: field(&fields, 1)?,
        button,
        imu: [imu(3)?, imu(9)?],
    })
}

/// Number of samples lost between `last` and `current` on a 16-bit counter.
pub fn seq_gap(last: u16, current: u16) -> u16 {
    let expected = last.wrapping_add(1);
    current.wrapping_sub(expected)
}

/// Extract a protocol version from a status line body, if it announces one.
///
/// Accepts `proto=N`, `protocol=N` and `protocol N`.
fn protocol_announcement(body: &str) -> Option<u32> {
    let body = body.trim().to_ascii_lowercase();
    let rest = body
        .strip_prefix("protocol")
        .or_else(|| body.strip_prefix("proto"))?;
    let rest = rest.trim_start_matches(|c: char| c == '=' || c == ':' || c.is_whitespace());
    rest.split_whitespace().next()?.parse().ok()
}

/// Stateful line ingestor.
#[derive(Debug)]
pub struct Ingestor {
    last_seq: Option<u16>,
    timeline: DeviceTimeline,
    rate: RateWindow,
    stats: Stats,
    /// Most recent unsupported protocol announcement.
    mismatched_protocol: Option<u32>,
    /// Host and device time of the first sample of the run.
    drift_origin: Option<(u64, u64)>,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new()
    }
}

impl Ingestor {
    pub fn new() -> Self {
        Self {
            last_seq: None,
            timeline: DeviceTimeline::new(),
            rate: RateWindow::per_second(),
            stats: Stats::default(),
            mismatched_protocol: None,
            drift_origin: None,
        }
    }

    /// Feed one line received at host time `now_ns`.
    pub fn ingest_line(&mut self, line: &str, now_ns: u64) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Empty;
        }
        if let Some(body) = line.strip_prefix(STATUS_MARKER) {
            self.handle_status(body);
            return LineOutcome::Status(body.trim().to_string());
        }
        if self.mismatched_protocol.is_some() {
            self.stats.protocol_mismatch += 1;
            return LineOutcome::Discarded;
        }

        match parse_line(line) {
            Ok(raw) => LineOutcome::Sample(self.accept(raw, now_ns)),
            Err(e) => {
                self.stats.parse_err += 1;
                tracing::debug!(error = %e, "Rejected line");
                LineOutcome::Rejected(e)
            }
        }
    }

    /// Count a line the source could not even decode.
    pub fn record_unreadable(&mut self) {
        self.stats.parse_err += 1;
    }

    fn handle_status(&mut self, body: &str) {
        self.stats.status_lines += 1;
        match protocol_announcement(body) {
            Some(SUPPORTED_PROTOCOL) => {
                if self.mismatched_protocol.take().is_some() {
                    tracing::info!(protocol = SUPPORTED_PROTOCOL, "Producer protocol supported again");
                }
            }
            Some(version) => {
                tracing::warn!(
                    protocol = version,
                    supported = SUPPORTED_PROTOCOL,
                    "Unsupported producer protocol, discarding samples"
                );
                self.mismatched_protocol = Some(version);
            }
            None => tracing::debug!(status = %body.trim(), "Device status"),
        }
    }

    fn accept(&mut self, raw: RawSample, now_ns: u64) -> IngestedSample {
        let (t_ms, step) = self.timeline.advance(raw.t_device_ms);
        let device_reset = step == TimelineStep::DeviceReset;

        let gap = match self.last_seq {
            Some(_) if device_reset => {
                self.stats.device_resets += 1;
                self.drift_origin = None;
                tracing::warn!(seq = raw.seq, t_device_ms = raw.t_device_ms, "Device restarted");
                0
            }
            Some(last) => seq_gap(last, raw.seq) as u64,
            None => 0,
        };
        if gap > 0 {
            self.stats.dropped += gap;
            tracing::debug!(gap, seq = raw.seq, "Sequence gap");
        }
        self.last_seq = Some(raw.seq);

        self.stats.received += 1;
        self.rate.record(now_ns);
        self.stats.pps = self.rate.rate();

        let (host0, dev0) = *self.drift_origin.get_or_insert((now_ns, t_ms));
        let drift = DriftMeasurement {
            reference_ns: t_ms.saturating_sub(dev0).saturating_mul(1_000_000),
            measured_ns: now_ns.saturating_sub(host0),
        };
        self.stats.clock_drift_ms = drift.drift_ms();

        IngestedSample {
            raw,
            t_ms,
            t_received_ns: now_ns,
            gap,
            device_reset,
        }
    }

    /// Roll the rate window without a new sample, so `pps` decays when the
    /// link goes quiet.
    pub fn refresh(&mut self, now_ns: u64) {
        self.rate.refresh(now_ns);
        self.stats.pps = self.rate.rate();
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    /// Zero every counter.
    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
        self.rate.reset();
        self.drift_origin = None;
    }

    /// The link was re-established: the next sample does not count a gap.
    pub fn reconnect(&mut self) {
        self.last_seq = None;
        self.timeline.rearm();
        self.drift_origin = None;
    }

    /// Start an unrelated stream (new replay or seek). Device time starts over.
    pub fn restart_stream(&mut self) {
        self.last_seq = None;
        self.timeline.reset();
        self.drift_origin = None;
        self.mismatched_protocol = None;
    }

    /// Unwrapped device time of the last accepted sample.
    pub fn last_t_ms(&self) -> u64 {
        self.timeline.last_ms()
    }
}
