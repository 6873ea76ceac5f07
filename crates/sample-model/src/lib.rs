//! ShotScope Data Model
//!
//! Defines the fixed-schema records that flow through the pipeline:
//! - **Samples:** Raw wire samples and their processed, physical-unit form
//! - **Segments:** Detected shots, their features and labels
//! - **Messages:** JSON payloads pushed to live subscribers
//! - **Sessions:** Metadata and on-disk layout of recorded sessions
//!
//! Device time is carried twice: the wrapping `u32` from the wire and an
//! unwrapped `u64` (`t_ms`) that all time-domain logic uses.

pub mod message;
pub mod record;
pub mod sample;
pub mod segment;
pub mod session;
pub mod stats;

pub use message::*;
pub use record::*;
pub use sample::*;
pub use segment::*;
pub use session::*;
pub use stats::*;
