//! Gyro bias calibration over a still period.

use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_model::sample::{CalibrationOffset, RawSample};

/// An in-progress calibration. Averages raw gyro readings per axis per
/// sensor over `duration_ms` of device time.
#[derive(Debug, Clone)]
pub struct CalibrationRun {
    duration_ms: u64,
    start_ms: Option<u64>,
    sums: [[f64; 3]; 2],
    count: usize,
}

impl CalibrationRun {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            start_ms: None,
            sums: [[0.0; 3]; 2],
            count: 0,
        }
    }

    /// Feed one sample. Returns the result once `duration_ms` of device
    /// time has been covered. The sample that completes the run is not
    /// included in the average.
    pub fn feed(&mut self, raw: &RawSample, t_ms: u64) -> Option<ShotscopeResult<CalibrationOffset>> {
        let start = *self.start_ms.get_or_insert(t_ms);
        if t_ms.saturating_sub(start) >= self.duration_ms {
            return Some(self.finish());
        }
        for (sensor, imu) in raw.imu.iter().enumerate() {
            for axis in 0..3 {
                self.sums[sensor][axis] += imu.gyro[axis] as f64;
            }
        }
        self.count += 1;
        None
    }

    /// Samples averaged so far.
    pub fn samples(&self) -> usize {
        self.count
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn finish(&self) -> ShotscopeResult<CalibrationOffset> {
        if self.count == 0 {
            return Err(ShotscopeError::calibration(
                "No samples received during calibration",
            ));
        }
        let n = self.count as f64;
        let mut gyro = [[0.0; 3]; 2];
        for (sensor, sums) in self.sums.iter().enumerate() {
            for (axis, sum) in sums.iter().enumerate() {
                gyro[sensor][axis] = sum / n;
            }
        }
        Ok(CalibrationOffset {
            gyro,
            samples: self.count,
            computed_at: Some(chrono::Utc::now().to_rfc3339()),
        })
    }
}
