//! Sample types: what the device sends and what the processor produces.

use serde::{Deserialize, Serialize};

/// Number of comma-separated fields in one wire record.
pub const WIRE_FIELD_COUNT: usize = 15;

/// Lines starting with this character are status/comment lines.
pub const STATUS_MARKER: char = '#';

/// Raw register values of one IMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawImu {
    /// Accelerometer x, y, z (LSB).
    pub accel: [i16; 3],
    /// Gyroscope x, y, z (LSB).
    pub gyro: [i16; 3],
}

/// One parsed wire record.
///
/// Field order on the wire:
/// `seq,t_device_ms,button,ax1,ay1,az1,gx1,gy1,gz1,ax2,ay2,az2,gx2,gy2,gz2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Packet counter, wraps at 65536.
    pub seq: u16,
    /// Device clock in milliseconds, wraps at 2^32.
    pub t_device_ms: u32,
    /// Button level (0 or 1).
    pub button: u8,
    /// Sensor 1 (primary) and sensor 2.
    pub imu: [RawImu; 2],
}

impl RawSample {
    /// Format as a wire line (without trailing newline).
    pub fn to_line(&self) -> String {
        let [a, b] = &self.imu;
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.seq,
            self.t_device_ms,
            self.button,
            a.accel[0],
            a.accel[1],
            a.accel[2],
            a.gyro[0],
            a.gyro[1],
            a.gyro[2],
            b.accel[0],
            b.accel[1],
            b.accel[2],
            b.gyro[0],
            b.gyro[1],
            b.gyro[2],
        )
    }
}

/// One IMU after unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuReading {
    /// Register values as received (gyro not bias-corrected).
    pub raw: RawImu,
    /// Acceleration (g).
    pub accel_g: [f64; 3],
    /// Angular rate (°/s), bias-corrected.
    pub gyro_dps: [f64; 3],
    /// Gyro magnitude (°/s) after the low-pass filter, or equal to
    /// `gyro_mag_raw` when filtering is off.
    pub gyro_mag: f64,
    /// Unfiltered gyro magnitude (°/s).
    pub gyro_mag_raw: f64,
    /// Accel magnitude (g) after the low-pass filter.
    pub accel_mag: f64,
    /// Unfiltered accel magnitude (g).
    pub accel_mag_raw: f64,
}

/// A sample in physical units, as fanned out by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub seq: u16,
    pub t_device_ms: u32,
    /// Device time unwrapped across counter overflow and device restarts.
    pub t_ms: u64,
    /// Host monotonic receive time (ns since ingest start).
    pub t_received_ns: u64,
    pub button: u8,
    pub imu: [ImuReading; 2],
}

impl ProcessedSample {
    /// Sensor 1, which drives segmentation.
    pub fn primary(&self) -> &ImuReading {
        &self.imu[0]
    }

    /// Sensor 2.
    pub fn secondary(&self) -> &ImuReading {
        &self.imu[1]
    }

    /// The wire record this sample came from.
    pub fn raw_sample(&self) -> RawSample {
        RawSample {
            seq: self.seq,
            t_device_ms: self.t_device_ms,
            button: self.button,
            imu: [self.imu[0].raw, self.imu[1].raw],
        }
    }
}

/// Euclidean norm of a 3-vector.
pub fn magnitude(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Per-axis gyro bias for both sensors, in raw LSB.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffset {
    /// `gyro[sensor][axis]`.
    pub gyro: [[f64; 3]; 2],

    /// Samples averaged to produce the offset.
    #[serde(default)]
    pub samples: usize,

    /// When the offset was computed (ISO 8601).
    #[serde(default)]
    pub computed_at: Option<String>,
}

impl CalibrationOffset {
    /// True when no calibration has been applied.
    pub fn is_zero(&self) -> bool {
        self.gyro.iter().flatten().all(|v| *v == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawSample {
        RawSample {
            seq: 7,
            t_device_ms: 1234,
            button: 1,
            imu: [
                RawImu {
                    accel: [1, -2, 16384],
                    gyro: [131, 0, -131],
                },
                RawImu {
                    accel: [0, 0, 0],
                    gyro: [-32768, 32767, 5],
                },
            ],
        }
    }

    #[test]
    fn test_to_line_field_order() {
        let line = sample().to_line();
        assert_eq!(line, "7,1234,1,1,-2,16384,131,0,-131,0,0,0,-32768,32767,5");
        assert_eq!(line.split(',').count(), WIRE_FIELD_COUNT);
    }

    #[test]
    fn test_magnitude() {
        assert!((magnitude(&[3.0, 4.0, 0.0]) - 5.0).abs() < 1e-12);
        assert_eq!(magnitude(&[0.0; 3]), 0.0);
    }

    #[test]
    fn test_zero_offset() {
        let mut offset = CalibrationOffset::default();
        assert!(offset.is_zero());
        offset.gyro[1][2] = 0.5;
        assert!(!offset.is_zero());
    }
}
