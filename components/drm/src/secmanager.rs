//! Platform security-manager abstraction
//!
//! On operator devices license acquisition can be delegated to a native
//! service that binds the license to a screen session. The session manager
//! talks to it through this trait; platforms provide the implementation.

use crate::types::LicenseRequest;

/// Session id meaning "no security-manager session"
pub const INVALID_SEC_SESSION_ID: i64 = -1;

/// Failure detail from the security manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("security manager license failure (status {status_code}, reason {reason_code})")]
pub struct SecManagerError {
    /// Primary status (HTTP-like)
    pub status_code: i64,
    /// Extended reason, e.g. 401 for an expired token
    pub reason_code: i64,
}

/// Native license service binding licenses to screen sessions
#[async_trait::async_trait]
pub trait SecurityManager: Send + Sync {
    /// Acquire a license; returns the opaque license and the session id
    ///
    /// `content_metadata` and `challenge` arrive base64 encoded, the way
    /// the native service expects them.
    async fn acquire_license(
        &self,
        request: &LicenseRequest,
        content_metadata_b64: &str,
        challenge_b64: &str,
        key_system: &str,
        access_token: &str,
    ) -> Result<(Vec<u8>, i64), SecManagerError>;

    /// Mark a session active/inactive as playback state changes
    fn update_session_state(&self, session_id: i64, active: bool);

    /// Release a session when its cached DRM session is destroyed
    fn release_session(&self, session_id: i64);

    /// Propagate the video window size for the bound screen region
    fn set_video_window_size(&self, session_id: i64, width: i32, height: i32);

    /// Propagate playback speed and position
    fn set_playback_speed_state(&self, session_id: i64, speed: i32, position: f64);
}
