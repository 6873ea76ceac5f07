//! Scalar features of a closed segment.

use shotscope_common::config::SegmentSignal;
use shotscope_model::sample::ProcessedSample;
use shotscope_model::segment::ShotFeatures;

/// The per-sample magnitudes a feature extraction needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSample {
    pub t_ms: u64,
    pub g1: f64,
    pub g2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl FeatureSample {
    /// Pick the filtered or unfiltered magnitude family.
    pub fn from_processed(sample: &ProcessedSample, signal: SegmentSignal) -> Self {
        let (p, s) = (sample.primary(), sample.secondary());
        match signal {
            SegmentSignal::Filtered => Self {
                t_ms: sample.t_ms,
                g1: p.gyro_mag,
                g2: s.gyro_mag,
                a1: p.accel_mag,
                a2: s.accel_mag,
            },
            SegmentSignal::Raw => Self {
                t_ms: sample.t_ms,
                g1: p.gyro_mag_raw,
                g2: s.gyro_mag_raw,
                a1: p.accel_mag_raw,
                a2: s.accel_mag_raw,
            },
        }
    }
}

#[derive(Debug, Default)]
struct Accum {
    sum_sq: f64,
    peak: f64,
}

impl Accum {
    fn add(&mut self, x: f64) {
        self.sum_sq += x * x;
        if x > self.peak {
            self.peak = x;
        }
    }

    fn rms(&self, n: usize) -> f64 {
        if n == 0 {
            0.0
        } else {
            (self.sum_sq / n as f64).sqrt()
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Features over the samples with `t_start <= t_ms <= t_end`.
///
/// Returns the features and the number of samples used.
pub fn extract(samples: &[FeatureSample], t_start: u64, t_end: u64) -> (ShotFeatures, usize) {
    let (mut g1, mut g2, mut dg, mut a1, mut a2) = (
        Accum::default(),
        Accum::default(),
        Accum::default(),
        Accum::default(),
        Accum::default(),
    );
    let mut n = 0usize;

    for s in samples
        .iter()
        .filter(|s| s.t_ms >= t_start && s.t_ms <= t_end)
    {
        g1.add(s.g1);
        g2.add(s.g2);
        dg.add(s.g2 - s.g1);
        a1.add(s.a1);
        a2.add(s.a2);
        n += 1;
    }

    let features = ShotFeatures {
        duration_ms: t_end.saturating_sub(t_start) as f64,
        g1_rms: round2(g1.rms(n)),
        g1_peak: round2(g1.peak),
        g2_rms: round2(g2.rms(n)),
        g2_peak: round2(g2.peak),
        dg_rms: round2(dg.rms(n)),
        a1_rms: round2(a1.rms(n)),
        a2_rms: round2(a2.rms(n)),
    };
    (features, n)
}
