//! ShotScope Ingest
//!
//! Turns a stream of text lines into validated `RawSample`s. Lines come
//! from a pluggable source:
//!
//! - **Serial:** The live device link (`serial` feature)
//! - **Reader:** Any async line reader, e.g. stdin or a capture file
//! - **Synthetic:** Generated traces for demos and tests
//! - **Stub:** A fixed list of lines
//!
//! The `Ingestor` parses each line, tracks sequence gaps and the sample
//! rate, and never fails on a bad line: it counts it and moves on.

pub mod ingestor;
pub mod pacing;
pub mod sources;
pub mod synthetic;

pub use ingestor::{parse_line, seq_gap, IngestedSample, Ingestor, LineOutcome, ParseError};
pub use pacing::Pacer;
pub use sources::{ReaderSource, StubSource};
pub use synthetic::{practice_session, SyntheticSource, TraceBuilder};

use shotscope_common::error::ShotscopeResult;

/// A producer of raw wire lines.
///
/// Implementations must be cancel-safe: dropping a pending `next_line`
/// future must not lose a line.
#[async_trait::async_trait]
pub trait LineSource: Send {
    /// Wait for the next line. `Ok(None)` means the source is exhausted.
    ///
    /// A line that could not be decoded is reported as
    /// `ShotscopeError::Ingest`; the source remains usable afterwards.
    async fn next_line(&mut self) -> ShotscopeResult<Option<String>>;

    /// Source name for logging.
    fn name(&self) -> &str;
}
