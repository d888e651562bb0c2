//! Unit tests for the tune-failure taxonomy and auth errors

use fluxplayer_shared_types::{AuthTokenError, TuneFailure};

#[test]
fn test_retry_hint_matrix() {
    // Given: the failure kinds named terminal by the error design
    let terminal = [
        TuneFailure::AuthorisationFailure,
        TuneFailure::LicenceRequestFailed,
        TuneFailure::LicenceTimeout,
        TuneFailure::DeviceNotProvisioned,
        TuneFailure::HdcpComplianceError,
    ];
    for failure in terminal {
        assert!(!failure.is_retry_enabled(), "{failure:?} must not retry");
    }
    // When: any other failure occurs, Then: retry stays enabled
    assert!(TuneFailure::DrmChallengeFailed.is_retry_enabled());
    assert!(TuneFailure::FailedToGetAccessToken.is_retry_enabled());
    assert!(TuneFailure::DrmSelfAbort.is_retry_enabled());
    assert!(TuneFailure::CorruptDrmMetadata.is_retry_enabled());
}

#[test]
fn test_failures_render_distinct_messages() {
    let rendered = format!("{}", TuneFailure::LicenceTimeout);
    assert!(!rendered.is_empty());
    assert_ne!(
        format!("{}", TuneFailure::LicenceTimeout),
        format!("{}", TuneFailure::LicenceRequestFailed)
    );
}

#[test]
fn test_auth_token_error_variants() {
    assert_ne!(
        AuthTokenError::InvalidStatusCode,
        AuthTokenError::TokenParseError
    );
    let transport = AuthTokenError::RequestFailed(503);
    assert!(format!("{transport}").contains("503"));
}
