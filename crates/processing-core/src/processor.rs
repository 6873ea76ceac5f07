//! Raw-to-physical sample conversion.

use shotscope_common::config::{FilterConfig, SensorConfig};
use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_model::sample::{
    magnitude, CalibrationOffset, ImuReading, ProcessedSample, RawImu, RawSample,
};

use crate::calibration::CalibrationRun;
use crate::filter::LowPass;

/// One low-pass filter per magnitude channel.
#[derive(Debug, Clone)]
struct MagnitudeFilters {
    gyro: [LowPass; 2],
    accel: [LowPass; 2],
}

impl MagnitudeFilters {
    fn new(config: &FilterConfig, dt_secs: f64) -> Self {
        let gyro = LowPass::new(config.gyro_cutoff_hz, dt_secs);
        let accel = LowPass::new(config.accel_cutoff_hz, dt_secs);
        Self {
            gyro: [gyro.clone(), gyro],
            accel: [accel.clone(), accel],
        }
    }

    fn reset(&mut self) {
        self.gyro.iter_mut().for_each(LowPass::reset);
        self.accel.iter_mut().for_each(LowPass::reset);
    }
}

/// Converts `RawSample`s to `ProcessedSample`s.
///
/// Gyro offsets are subtracted in raw LSB before scaling. Magnitudes are
/// computed from the converted vectors; `gyro_mag`/`accel_mag` are then
/// low-pass filtered when filtering is enabled, while the `*_raw`
/// magnitudes never are.
#[derive(Debug, Clone)]
pub struct Processor {
    accel_lsb_per_g: f64,
    gyro_lsb_per_dps: f64,
    offset: CalibrationOffset,
    filters: Option<MagnitudeFilters>,
    calibration: Option<CalibrationRun>,
}

impl Processor {
    pub fn new(sensor: &SensorConfig, filter: &FilterConfig) -> Self {
        let filters = filter
            .enabled
            .then(|| MagnitudeFilters::new(filter, sensor.sample_interval_secs()));
        Self {
            accel_lsb_per_g: sensor.accel_lsb_per_g,
            gyro_lsb_per_dps: sensor.gyro_lsb_per_dps,
            offset: CalibrationOffset::default(),
            filters,
            calibration: None,
        }
    }

    /// Default scales, filter on.
    pub fn with_defaults() -> Self {
        Self::new(&SensorConfig::default(), &FilterConfig::default())
    }

    /// Convert one sample.
    pub fn process(&mut self, raw: &RawSample, t_ms: u64, t_received_ns: u64) -> ProcessedSample {
        let imu = [self.convert(0, &raw.imu[0]), self.convert(1, &raw.imu[1])];
        ProcessedSample {
            seq: raw.seq,
            t_device_ms: raw.t_device_ms,
            t_ms,
            t_received_ns,
            button: raw.button,
            imu,
        }
    }

    fn convert(&mut self, sensor: usize, raw: &RawImu) -> ImuReading {
        let accel_g = raw.accel.map(|v| v as f64 / self.accel_lsb_per_g);
        let bias = self.offset.gyro[sensor];
        let mut gyro_dps = [0.0; 3];
        for axis in 0..3 {
            gyro_dps[axis] = (raw.gyro[axis] as f64 - bias[axis]) / self.gyro_lsb_per_dps;
        }

        let gyro_mag_raw = magnitude(&gyro_dps);
        let accel_mag_raw = magnitude(&accel_g);
        let (gyro_mag, accel_mag) = match self.filters.as_mut() {
            Some(f) => (
                f.gyro[sensor].apply(gyro_mag_raw),
                f.accel[sensor].apply(accel_mag_raw),
            ),
            None => (gyro_mag_raw, accel_mag_raw),
        };

        ImuReading {
            raw: *raw,
            accel_g,
            gyro_dps,
            gyro_mag,
            gyro_mag_raw,
            accel_mag,
            accel_mag_raw,
        }
    }

    /// Begin averaging gyro bias over `duration_ms` of device time.
    pub fn start_calibration(&mut self, duration_ms: u64) -> ShotscopeResult<()> {
        if self.calibration.is_some() {
            return Err(ShotscopeError::calibration(
                "Calibration already in progress",
            ));
        }
        self.calibration = Some(CalibrationRun::new(duration_ms));
        Ok(())
    }

    /// Feed the calibration run, if any. Returns its result when it ends;
    /// a successful run replaces the offset.
    pub fn feed_calibration(
        &mut self,
        raw: &RawSample,
        t_ms: u64,
    ) -> Option<ShotscopeResult<CalibrationOffset>> {
        let result = self.calibration.as_mut()?.feed(raw, t_ms)?;
        self.calibration = None;
        if let Ok(offset) = &result {
            self.offset = offset.clone();
        }
        Some(result)
    }

    /// Cancel a running calibration. The previous offset stays in force.
    pub fn abort_calibration(&mut self) -> bool {
        self.calibration.take().is_some()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn offset(&self) -> &CalibrationOffset {
        &self.offset
    }

    /// Install a known offset (e.g. the one a session was recorded with).
    pub fn set_offset(&mut self, offset: CalibrationOffset) {
        self.offset = offset;
    }

    /// Clear filter memory so an unrelated stream starts fresh.
    pub fn reset_filters(&mut self) {
        if let Some(f) = self.filters.as_mut() {
            f.reset();
        }
    }

    pub fn filtering(&self) -> bool {
        self.filters.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with(accel: [i16; 3], gyro: [i16; 3]) -> RawSample {
        RawSample {
            seq: 1,
            t_device_ms: 10,
            button: 0,
            imu: [RawImu { accel, gyro }, RawImu { accel, gyro }],
        }
    }

    fn unfiltered() -> Processor {
        Processor::new(
            &SensorConfig::default(),
            &FilterConfig {
                enabled: false,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_unit_conversion() {
        let mut p = unfiltered();
        let s = p.process(&raw_with([16384, 0, 0], [131, 0, 0]), 10, 0);
        assert!((s.primary().accel_g[0] - 1.0).abs() < 1e-12);
        assert!((s.primary().gyro_dps[0] - 1.0).abs() < 1e-12);
        assert!((s.secondary().gyro_mag - 1.0).abs() < 1e-12);
        assert_eq!(s.primary().raw.gyro, [131, 0, 0]);
    }

    #[test]
    fn test_scales_are_configurable() {
        let sensor = SensorConfig {
            accel_lsb_per_g: 8192.0,
            gyro_lsb_per_dps: 65.5,
            ..Default::default()
        };
        let mut p = Processor::new(
            &sensor,
            &FilterConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let s = p.process(&raw_with([8192, 0, 0], [131, 0, 0]), 0, 0);
        assert!((s.primary().accel_g[0] - 1.0).abs() < 1e-12);
        assert!((s.primary().gyro_dps[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_raw_vs_filtered() {
        let mut p = Processor::with_defaults();
        let first = p.process(&raw_with([0, 0, 16384], [0, 0, 0]), 0, 0);
        assert_eq!(first.primary().gyro_mag, 0.0);
        let second = p.process(&raw_with([0, 0, 16384], [1310, 0, 0]), 10, 0);
        assert!((second.primary().gyro_mag_raw - 10.0).abs() < 1e-12);
        assert!(second.primary().gyro_mag > 0.0 && second.primary().gyro_mag < 10.0);

        p.reset_filters();
        let third = p.process(&raw_with([0, 0, 16384], [1310, 0, 0]), 20, 0);
        assert!((third.primary().gyro_mag - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_offset_subtracted_before_scaling() {
        let mut p = unfiltered();
        p.start_calibration(50).unwrap();
        for i in 0..5u64 {
            assert!(p.feed_calibration(&raw_with([0; 3], [262, -131, 0]), i * 10).is_none());
        }
        let offset = p
            .feed_calibration(&raw_with([0; 3], [0; 3]), 50)
            .unwrap()
            .unwrap();
        assert_eq!(offset.gyro[0], [262.0, -131.0, 0.0]);
        assert!(!p.is_calibrating());

        let s = p.process(&raw_with([0; 3], [262 + 131, -131, 0]), 60, 0);
        assert!((s.primary().gyro_dps[0] - 1.0).abs() < 1e-12);
        assert!(s.primary().gyro_dps[1].abs() < 1e-12);
    }

    #[test]
    fn test_concurrent_calibration_rejected() {
        let mut p = unfiltered();
        p.start_calibration(1000).unwrap();
        assert!(p.start_calibration(1000).is_err());
        assert!(p.abort_calibration());
        assert!(!p.abort_calibration());
        assert!(p.offset().is_zero());
        p.start_calibration(1000).unwrap();
    }

    #[test]
    fn test_failed_calibration_keeps_offset() {
        let mut p = unfiltered();
        let mut known = CalibrationOffset::default();
        known.gyro[0][0] = 5.0;
        p.set_offset(known.clone());
        p.start_calibration(0).unwrap();
        let result = p.feed_calibration(&raw_with([0; 3], [100; 3]), 0).unwrap();
        assert!(result.is_err());
        assert_eq!(p.offset(), &known);
    }
}
