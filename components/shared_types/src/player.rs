//! Player state shared between the scheduler and event manager

use serde::{Deserialize, Serialize};

/// Coarse player state observed by the async machinery
///
/// The scheduler refuses new tasks and skips queued ones when the player is
/// in [`PlayerState::Error`] or [`PlayerState::Released`]; the event manager
/// drops all dispatches once [`PlayerState::Released`] is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    /// Fresh instance, nothing tuned
    #[default]
    Idle,
    /// Tune in progress
    Initializing,
    /// Manifest and first segments acquired
    Prepared,
    /// Media is playing
    Playing,
    /// Media is paused
    Paused,
    /// Seek in progress
    Seeking,
    /// Playback reached the end of stream
    Complete,
    /// Unrecoverable error, awaiting release
    Error,
    /// Instance torn down
    Released,
}

impl PlayerState {
    /// States in which no new async work may be admitted
    pub fn rejects_tasks(&self) -> bool {
        matches!(self, PlayerState::Error | PlayerState::Released)
    }
}
