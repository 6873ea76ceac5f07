//! Flat row schema of the per-session sample file.
//!
//! One row per `ProcessedSample`. Raw register values are stored next to
//! the physical values so that a session can be replayed through the
//! processor exactly as it was received.

use serde::{Deserialize, Serialize};

use crate::sample::{ImuReading, ProcessedSample, RawImu, RawSample};

/// One row of `data.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub seq: u16,
    pub t_device_ms: u32,
    pub t_ms: u64,
    pub t_received_ns: u64,
    pub button: u8,

    pub ax1: i16,
    pub ay1: i16,
    pub az1: i16,
    pub gx1: i16,
    pub gy1: i16,
    pub gz1: i16,
    pub ax2: i16,
    pub ay2: i16,
    pub az2: i16,
    pub gx2: i16,
    pub gy2: i16,
    pub gz2: i16,

    pub ax1_g: f64,
    pub ay1_g: f64,
    pub az1_g: f64,
    pub gx1_dps: f64,
    pub gy1_dps: f64,
    pub gz1_dps: f64,
    pub ax2_g: f64,
    pub ay2_g: f64,
    pub az2_g: f64,
    pub gx2_dps: f64,
    pub gy2_dps: f64,
    pub gz2_dps: f64,

    pub gyro_mag_1: f64,
    pub gyro_mag_2: f64,
    pub accel_mag_1: f64,
    pub accel_mag_2: f64,
}

/// Column names of `data.csv`, in order.
pub const SAMPLE_COLUMNS: [&str; 33] = [
    "seq",
    "t_device_ms",
    "t_ms",
    "t_received_ns",
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
    "ax1_g",
    "ay1_g",
    "az1_g",
    "gx1_dps",
    "gy1_dps",
    "gz1_dps",
    "ax2_g",
    "ay2_g",
    "az2_g",
    "gx2_dps",
    "gy2_dps",
    "gz2_dps",
    "gyro_mag_1",
    "gyro_mag_2",
    "accel_mag_1",
    "accel_mag_2",
];

impl From<&ProcessedSample> for SampleRecord {
    fn from(s: &ProcessedSample) -> Self {
        let [a, b]: &[ImuReading; 2] = &s.imu;
        Self {
            seq: s.seq,
            t_device_ms: s.t_device_ms,
            t_ms: s.t_ms,
            t_received_ns: s.t_received_ns,
            button: s.button,
            ax1: a.raw.accel[0],
            ay1: a.raw.accel[1],
            az1: a.raw.accel[2],
            gx1: a.raw.gyro[0],
            gy1: a.raw.gyro[1],
            gz1: a.raw.gyro[2],
            ax2: b.raw.accel[0],
            ay2: b.raw.accel[1],
            az2: b.raw.accel[2],
            gx2: b.raw.gyro[0],
            gy2: b.raw.gyro[1],
            gz2: b.raw.gyro[2],
            ax1_g: a.accel_g[0],
            ay1_g: a.accel_g[1],
            az1_g: a.accel_g[2],
            gx1_dps: a.gyro_dps[0],
            gy1_dps: a.gyro_dps[1],
            gz1_dps: a.gyro_dps[2],
            ax2_g: b.accel_g[0],
            ay2_g: b.accel_g[1],
            az2_g: b.accel_g[2],
            gx2_dps: b.gyro_dps[0],
            gy2_dps: b.gyro_dps[1],
            gz2_dps: b.gyro_dps[2],
            gyro_mag_1: a.gyro_mag,
            gyro_mag_2: b.gyro_mag,
            accel_mag_1: a.accel_mag,
            accel_mag_2: b.accel_mag,
        }
    }
}

impl SampleRecord {
    /// The wire record this row was produced from.
    pub fn raw_sample(&self) -> RawSample {
        RawSample {
            seq: self.seq,
            t_device_ms: self.t_device_ms,
            button: self.button,
            imu: [
                RawImu {
                    accel: [self.ax1, self.ay1, self.az1],
                    gyro: [self.gx1, self.gy1, self.gz1],
                },
                RawImu {
                    accel: [self.ax2, self.ay2, self.az2],
                    gyro: [self.gx2, self.gy2, self.gz2],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_match_serialized_fields() {
        let json = serde_json::to_value(SampleRecord {
            seq: 0,
            t_device_ms: 0,
            t_ms: 0,
            t_received_ns: 0,
            button: 0,
            ax1: 0,
            ay1: 0,
            az1: 0,
            gx1: 0,
            gy1: 0,
            gz1: 0,
            ax2: 0,
            ay2: 0,
            az2: 0,
            gx2: 0,
            gy2: 0,
            gz2: 0,
            ax1_g: 0.0,
            ay1_g: 0.0,
            az1_g: 0.0,
            gx1_dps: 0.0,
            gy1_dps: 0.0,
            gz1_dps: 0.0,
            ax2_g: 0.0,
            ay2_g: 0.0,
            az2_g: 0.0,
            gx2_dps: 0.0,
            gy2_dps: 0.0,
            gz2_dps: 0.0,
            gyro_mag_1: 0.0,
            gyro_mag_2: 0.0,
            accel_mag_1: 0.0,
            accel_mag_2: 0.0,
        })
        .unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), SAMPLE_COLUMNS.len());
        for col in SAMPLE_COLUMNS {
            assert!(obj.contains_key(col), "missing column {col}");
        }
    }

    #[test]
    fn test_raw_sample_restores_registers() {
        let raw = RawSample {
            seq: 3,
            t_device_ms: 99,
            button: 1,
            imu: [
                RawImu {
                    accel: [1, 2, 3],
                    gyro: [4, 5, 6],
                },
                RawImu {
                    accel: [-1, -2, -3],
                    gyro: [-4, -5, -6],
                },
            ],
        };
        let reading = |r: RawImu| ImuReading {
            raw: r,
            accel_g: [0.0; 3],
            gyro_dps: [0.0; 3],
            gyro_mag: 0.0,
            gyro_mag_raw: 0.0,
            accel_mag: 0.0,
            accel_mag_raw: 0.0,
        };
        let processed = ProcessedSample {
            seq: raw.seq,
            t_device_ms: raw.t_device_ms,
            t_ms: 99,
            t_received_ns: 0,
            button: raw.button,
            imu: [reading(raw.imu[0]), reading(raw.imu[1])],
        };
        assert_eq!(SampleRecord::from(&processed).raw_sample(), raw);
    }
}
