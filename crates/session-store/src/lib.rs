//! ShotScope Session Store
//!
//! Everything that touches a session directory:
//! - **Recorder:** Batched, append-only capture of a live run
//! - **Player:** Paced replay of a finalized session as wire lines
//! - **Store:** Listing, inspecting, labeling and deleting sessions

pub mod player;
pub mod recorder;
pub mod store;

pub use player::{Player, PlayerState};
pub use recorder::{Recorder, RecordingSpec};
pub use store::{
    delete_session, label_session, list_sessions, load_summary, resolve_session, SessionSummary,
};
