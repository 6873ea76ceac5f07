//! ShotScope Processing Core
//!
//! The per-sample stages of the pipeline:
//! - **Processor:** Unit conversion, gyro bias calibration, low-pass filtering
//! - **RingBuffer:** Fixed-capacity window of recent samples
//! - **Segmenter:** Hysteresis state machine that cuts the stream into shots
//! - **Labeler:** Button edge detection and alignment to closed shots
//!
//! This crate is pure computation with no I/O and no clocks. Inputs are
//! data and so are outputs. Stages hold state across samples and must
//! be fed in order by a single owner.

pub mod calibration;
pub mod features;
pub mod filter;
pub mod labeler;
pub mod processor;
pub mod ring_buffer;
pub mod segmenter;

pub use calibration::CalibrationRun;
pub use filter::LowPass;
pub use labeler::{LabelOutcome, Labeler};
pub use processor::Processor;
pub use ring_buffer::{RingBuffer, SharedRingBuffer};
pub use segmenter::{SegmenterEvent, SegmenterPhase, Segmenter, Thresholds};
