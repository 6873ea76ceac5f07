//! Single-pole IIR low-pass filter.

/// Smoothing coefficient for a single-pole low-pass at `cutoff_hz`
/// sampled every `dt_secs`: `α = dt / (RC + dt)` with `RC = 1 / (2π f_c)`.
pub fn smoothing_alpha(cutoff_hz: f64, dt_secs: f64) -> f64 {
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
    dt_secs / (rc + dt_secs)
}

/// Exponential smoothing: `y = α·x + (1-α)·y_prev`.
/// The first input after construction or reset passes through unchanged.
#[derive(Debug, Clone)]
pub struct LowPass {
    alpha: f64,
    state: Option<f64>,
}

impl LowPass {
    pub fn new(cutoff_hz: f64, dt_secs: f64) -> Self {
        Self::with_alpha(smoothing_alpha(cutoff_hz, dt_secs))
    }

    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn apply(&mut self, x: f64) -> f64 {
        let y = match self.state {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.state = Some(y);
        y
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_from_cutoff() {
        // 18 Hz at 100 Hz sampling.
        let a = smoothing_alpha(18.0, 0.01);
        assert!((a - 0.5307).abs() < 1e-3, "alpha = {a}");
        assert!(smoothing_alpha(1.0, 0.01) < smoothing_alpha(10.0, 0.01));
    }

    #[test]
    fn test_first_sample_passes_through() {
        let mut lp = LowPass::with_alpha(0.5);
        assert_eq!(lp.apply(10.0), 10.0);
        assert_eq!(lp.apply(0.0), 5.0);
        assert_eq!(lp.apply(0.0), 2.5);
        lp.reset();
        assert_eq!(lp.apply(4.0), 4.0);
    }

    #[test]
    fn test_converges_to_step() {
        let mut lp = LowPass::new(12.0, 0.01);
        lp.apply(0.0);
        let mut y = 0.0;
        for _ in 0..50 {
            y = lp.apply(1.0);
        }
        assert!((y - 1.0).abs() < 1e-6);
    }
}
