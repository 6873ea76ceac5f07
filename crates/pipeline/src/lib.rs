//! ShotScope Pipeline
//!
//! Wires the stages together:
//!
//! - **Coordinator:** [`Pipeline`] runs each line through ingest,
//!   calibration, filtering, segmentation, labeling and recording
//! - **Hub:** [`LiveHub`] fans live messages out to subscribers
//! - **Engine:** [`Engine`] owns a pipeline on a tokio task and takes
//!   control requests through an [`EngineHandle`]

pub mod coordinator;
pub mod engine;
pub mod hub;

pub use coordinator::{Pipeline, PipelineStatus, ReplayStatus, SourceKind};
pub use engine::{Command, Engine, EngineHandle};
pub use hub::{LiveFeed, LiveHub, LiveSubscriber};
