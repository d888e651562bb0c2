//! Event payloads and listener contract

use fluxplayer_shared_types::{PlayerState, TuneFailure};

/// Event classification used for listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Pseudo-type receiving every event
    AllEvents,
    /// Tune completed
    Tuned,
    /// Tune failed terminally
    TuneFailed,
    /// Player state transition
    StateChanged,
    /// End of stream reached
    Eos,
    /// Playback position report
    Progress,
    /// Buffering started/stopped
    BufferingChanged,
    /// DRM metadata / license outcome
    DrmMetadata,
}

/// Outcome record attached to DRM metadata events
#[derive(Debug, Clone, PartialEq)]
pub struct DrmMetadataPayload {
    /// Failure classification, `TuneFailure::Unknown` while unset
    pub failure: TuneFailure,
    /// HTTP or transport code observed on the license path
    pub response_code: i64,
    /// Whether the failure came from the platform security client path
    pub secclient_error: bool,
    /// Access attributes status returned by the license service
    pub access_status: String,
    /// Numeric access status
    pub access_status_value: i32,
}

impl Default for DrmMetadataPayload {
    fn default() -> Self {
        Self {
            failure: TuneFailure::Unknown,
            response_code: -1,
            secclient_error: false,
            access_status: String::new(),
            access_status_value: -1,
        }
    }
}

impl DrmMetadataPayload {
    /// Whether the collaborator may retry after this outcome
    pub fn is_retry_enabled(&self) -> bool {
        self.failure.is_retry_enabled()
    }
}

/// A tagged player event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Tune completed
    Tuned,
    /// Tune failed terminally
    TuneFailed {
        /// Mapped failure code
        failure: TuneFailure,
        /// Human-readable description
        description: String,
    },
    /// Player state transition
    StateChanged(PlayerState),
    /// End of stream reached
    Eos,
    /// Playback position report
    Progress {
        /// Current position in milliseconds
        position_ms: f64,
        /// Total duration in milliseconds
        duration_ms: f64,
    },
    /// Buffering started/stopped
    BufferingChanged {
        /// True while rebuffering
        buffering: bool,
    },
    /// DRM metadata / license outcome
    DrmMetadata(DrmMetadataPayload),
}

impl Event {
    /// The registration type of this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Tuned => EventType::Tuned,
            Event::TuneFailed { .. } => EventType::TuneFailed,
            Event::StateChanged(_) => EventType::StateChanged,
            Event::Eos => EventType::Eos,
            Event::Progress { .. } => EventType::Progress,
            Event::BufferingChanged { .. } => EventType::BufferingChanged,
            Event::DrmMetadata(_) => EventType::DrmMetadata,
        }
    }
}

/// Receiver of player events
///
/// The same listener instance may be registered for several types; dispatch
/// snapshots the listener list first, so handlers may add or remove
/// listeners without deadlock.
pub trait EventListener: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &Event);
}
