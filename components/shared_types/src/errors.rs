//! Error taxonomy for tune and DRM operations
//!
//! Failures are expressed as typed values rather than panics; inner layers
//! return them upward and the session manager folds them into a single
//! DRM metadata event.

use thiserror::Error;

/// Tune/DRM failure taxonomy surfaced through DRM metadata events
///
/// # Examples
///
/// ```
/// use fluxplayer_shared_types::TuneFailure;
///
/// let failure = TuneFailure::LicenceRequestFailed;
/// assert!(!failure.is_retry_enabled());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TuneFailure {
    /// Protection-specific init data (pssh) could not be parsed
    #[error("corrupt DRM metadata")]
    CorruptDrmMetadata,

    /// Helper produced an empty key id
    #[error("failed to get key id")]
    FailedToGetKeyId,

    /// Platform decryption module session construction failed
    #[error("DRM init failed")]
    DrmInitFailed,

    /// Init data was rejected by the decryption module
    #[error("DRM data bind failed")]
    DrmDataBindFailed,

    /// Decryption module returned an empty session id
    #[error("DRM session id empty")]
    DrmSessionIdEmpty,

    /// No license challenge produced within the timeout
    #[error("DRM challenge failed")]
    DrmChallengeFailed,

    /// Auth service unreachable or token reply unparseable
    #[error("failed to get access token")]
    FailedToGetAccessToken,

    /// License server refused the request (HTTP 412)
    #[error("authorisation failure")]
    AuthorisationFailure,

    /// Transport timed out while fetching the license
    #[error("licence request timeout")]
    LicenceTimeout,

    /// Non-2xx license response outside the retry set
    #[error("licence request failed")]
    LicenceRequestFailed,

    /// Caller cancelled the in-flight acquisition
    #[error("DRM self abort")]
    DrmSelfAbort,

    /// Decryption module stayed pending after key processing
    #[error("invalid DRM key")]
    InvalidDrmKey,

    /// Decryption module reported an error on key update
    #[error("DRM key update failed")]
    DrmKeyUpdateFailed,

    /// Output protection rejected the display path
    #[error("HDCP compliance error")]
    HdcpComplianceError,

    /// Device has no provisioned DRM identity
    #[error("device not provisioned")]
    DeviceNotProvisioned,

    /// Placeholder before any failure is recorded
    #[error("unknown tune failure")]
    Unknown,
}

impl TuneFailure {
    /// Whether the collaborator may retry the tune after this failure
    ///
    /// Auth, request-failed, timeout, provisioning and HDCP failures are
    /// terminal for the current tune.
    pub fn is_retry_enabled(&self) -> bool {
        !matches!(
            self,
            TuneFailure::AuthorisationFailure
                | TuneFailure::LicenceRequestFailed
                | TuneFailure::LicenceTimeout
                | TuneFailure::DeviceNotProvisioned
                | TuneFailure::HdcpComplianceError
        )
    }
}

/// Key usability reported by the platform decryption module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Key can decrypt
    Usable,
    /// Output restricted, downgrade required
    OutputRestricted,
    /// Output restricted specifically for missing HDCP 2.2
    OutputRestrictedHdcp22,
    /// Hardware fault inside the decryption module
    HwError,
    /// Key expired
    Expired,
    /// Unclassified module error
    InternalError,
    /// Module reported an empty key id
    EmptyId,
}

/// Errors produced while talking to the local auth service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthTokenError {
    /// Reply carried a non-zero status field
    #[error("invalid status code in session token reply")]
    InvalidStatusCode,
    /// Reply had no token field
    #[error("could not parse token from session token reply")]
    TokenParseError,
    /// Transport-level failure, HTTP status attached when known
    #[error("session token request failed (http {0})")]
    RequestFailed(u16),
}
