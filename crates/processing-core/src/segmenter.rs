//! Hysteresis shot segmenter.
//!
//! The state machine itself is the pure [`Phase::step`] function. The
//! [`Segmenter`] wraps it with the adaptive threshold estimate, the
//! feature window and the open [`ShotSegment`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use shotscope_common::config::SegmenterConfig;
use shotscope_model::sample::ProcessedSample;
use shotscope_model::segment::ShotSegment;

use crate::features::{self, FeatureSample};

/// Upper bound on samples held for one segment's feature window.
const MAX_WINDOW_SAMPLES: usize = 60_000;

/// Coarse segmenter state, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterPhase {
    Idle,
    Active,
    Cooldown,
}

/// Thresholds currently in force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub on: f64,
    pub off: f64,
    pub baseline: f64,
    pub noise: f64,
    /// False until the baseline window holds enough samples.
    pub adaptive_active: bool,
}

impl Thresholds {
    fn fixed(config: &SegmenterConfig) -> Self {
        Self {
            on: config.th_on,
            off: config.th_off,
            baseline: 0.0,
            noise: 0.0,
            adaptive_active: false,
        }
    }

    fn adaptive(config: &SegmenterConfig, baseline: f64, noise: f64) -> Self {
        Self {
            on: baseline + (config.k_on * noise).max(config.th_on),
            off: baseline + (config.k_off * noise).max(config.th_off),
            baseline,
            noise,
            adaptive_active: true,
        }
    }
}

/// Machine state with the pending debounce timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle { above_since: Option<u64> },
    Active { t_start: u64, below_since: Option<u64> },
    Cooldown { quiet_since: u64 },
}

/// Edge produced by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened { t_start: u64 },
    Closed { t_start: u64, t_end: u64 },
    /// Active episode shorter than the minimum segment length.
    Discarded { t_start: u64, t_end: u64 },
}

impl Phase {
    pub const INITIAL: Phase = Phase::Idle { above_since: None };

    pub fn coarse(&self) -> SegmenterPhase {
        match self {
            Phase::Idle { .. } => SegmenterPhase::Idle,
            Phase::Active { .. } => SegmenterPhase::Active,
            Phase::Cooldown { .. } => SegmenterPhase::Cooldown,
        }
    }

    /// Advance by one sample of magnitude `g` at device time `t`.
    pub fn step(
        self,
        g: f64,
        t: u64,
        th: &Thresholds,
        config: &SegmenterConfig,
    ) -> (Phase, Option<Transition>) {
        match self {
            Phase::Idle { above_since } => {
                if g <= th.on {
                    return (Phase::Idle { above_since: None }, None);
                }
                let since = above_since.unwrap_or(t);
                if t.saturating_sub(since) >= config.on_debounce_ms {
                    (
                        Phase::Active {
                            t_start: since,
                            below_since: None,
                        },
                        Some(Transition::Opened { t_start: since }),
                    )
                } else {
                    (
                        Phase::Idle {
                            above_since: Some(since),
                        },
                        None,
                    )
                }
            }
            Phase::Active {
                t_start,
                below_since,
            } => {
                if g >= th.off {
                    return (
                        Phase::Active {
                            t_start,
                            below_since: None,
                        },
                        None,
                    );
                }
                let since = below_since.unwrap_or(t);
                if t.saturating_sub(since) < config.off_debounce_ms {
                    return (
                        Phase::Active {
                            t_start,
                            below_since: Some(since),
                        },
                        None,
                    );
                }
                let t_end = since;
                if t_end.saturating_sub(t_start) < config.min_segment_ms {
                    (
                        Phase::INITIAL,
                        Some(Transition::Discarded { t_start, t_end }),
                    )
                } else {
                    (
                        Phase::Cooldown { quiet_since: t },
                        Some(Transition::Closed { t_start, t_end }),
                    )
                }
            }
            Phase::Cooldown { quiet_since } => {
                if g > th.on {
                    (Phase::Cooldown { quiet_since: t }, None)
                } else if t.saturating_sub(quiet_since) >= config.cooldown_ms {
                    (Phase::INITIAL, None)
                } else {
                    (Phase::Cooldown { quiet_since }, None)
                }
            }
        }
    }
}

/// Segmenter output for one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterEvent {
    Opened(ShotSegment),
    Closed(ShotSegment),
    Discarded {
        shot_id: String,
        t_start: u64,
        t_end: u64,
    },
}

/// Streaming segmenter over the primary sensor's gyro magnitude.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
    phase: Phase,
    thresholds: Thresholds,
    baseline: VecDeque<f64>,
    window: VecDeque<FeatureSample>,
    open: Option<ShotSegment>,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        let thresholds = Thresholds::fixed(&config);
        Self {
            baseline: VecDeque::with_capacity(config.baseline_window),
            config,
            phase: Phase::INITIAL,
            thresholds,
            window: VecDeque::new(),
            open: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SegmenterConfig::default())
    }

    pub fn feed(&mut self, sample: &ProcessedSample) -> Option<SegmenterEvent> {
        let fs = FeatureSample::from_processed(sample, self.config.signal);
        let (g, t) = (fs.g1, fs.t_ms);

        if matches!(self.phase, Phase::Idle { .. }) && g <= self.thresholds.on {
            self.update_baseline(g);
        }

        self.window.push_back(fs);
        if self.window.len() > MAX_WINDOW_SAMPLES {
            self.window.pop_front();
        }

        let (next, transition) = self.phase.step(g, t, &self.thresholds, &self.config);
        self.phase = next;

        let event = transition.and_then(|tr| self.apply(tr));

        if matches!(
            self.phase,
            Phase::Idle { above_since: None } | Phase::Cooldown { .. }
        ) {
            self.window.clear();
        }
        event
    }

    fn apply(&mut self, transition: Transition) -> Option<SegmenterEvent> {
        match transition {
            Transition::Opened { t_start } => {
                let seg = ShotSegment::open(t_start);
                tracing::debug!(shot_id = %seg.shot_id, t_start, "Segment opened");
                self.open = Some(seg.clone());
                Some(SegmenterEvent::Opened(seg))
            }
            Transition::Closed { t_start, t_end } => {
                let mut seg = self.open.take()?;
                let samples: Vec<FeatureSample> = self.window.iter().copied().collect();
                let (features, count) = features::extract(&samples, t_start, t_end);
                seg.t_end = Some(t_end);
                seg.features = Some(features);
                seg.sample_count = count;
                tracing::debug!(
                    shot_id = %seg.shot_id,
                    t_start,
                    t_end,
                    samples = count,
                    "Segment closed"
                );
                Some(SegmenterEvent::Closed(seg))
            }
            Transition::Discarded { t_start, t_end } => {
                let seg = self.open.take()?;
                tracing::debug!(
                    shot_id = %seg.shot_id,
                    duration_ms = t_end.saturating_sub(t_start),
                    "Segment below minimum length, discarded"
                );
                Some(SegmenterEvent::Discarded {
                    shot_id: seg.shot_id,
                    t_start,
                    t_end,
                })
            }
        }
    }

    fn update_baseline(&mut self, g: f64) {
        if !self.config.adaptive || self.config.baseline_window == 0 {
            return;
        }
        if self.baseline.len() == self.config.baseline_window {
            self.baseline.pop_front();
        }
        self.baseline.push_back(g);

        if self.baseline.len() >= self.config.baseline_min_samples.max(1) {
            let (median, std) = median_and_std(&self.baseline);
            self.thresholds = Thresholds::adaptive(&self.config, median, std);
        }
    }

    pub fn phase(&self) -> SegmenterPhase {
        self.phase.coarse()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// The segment currently being recorded, if any.
    pub fn open_segment(&self) -> Option<&ShotSegment> {
        self.open.as_ref()
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Back to idle with fixed thresholds. Any open segment is dropped.
    pub fn reset(&mut self) {
        self.phase = Phase::INITIAL;
        self.thresholds = Thresholds::fixed(&self.config);
        self.baseline.clear();
        self.window.clear();
        self.open = None;
    }
}

fn median_and_std(values: &VecDeque<f64>) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (median, var.sqrt())
}
