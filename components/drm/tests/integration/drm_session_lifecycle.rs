//! Session-manager lifecycle, caching and license-path scenarios

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use fluxplayer_config_store::{ConfigKey, ConfigLayer, ConfigStore};
use fluxplayer_drm::{
    AuthTokenProvider, DrmInfo, DrmSessionManager, HelperRegistry, KeyState, LicenseGateway,
    LicenseMethod, LicenseReply, LicenseRequest, SecManagerError, SecurityManager,
    SessionManagerState, SoftwareCdmConfig, SoftwareCdmHost, CLEARKEY_UUID, PLAYREADY_UUID,
};
use fluxplayer_event_manager::{Event, EventListener, EventManager};
use fluxplayer_shared_types::{
    AuthTokenError, DrmMethod, KeyStatus, MediaFormat, TuneFailure,
};
use parking_lot::Mutex;

mockall::mock! {
    Tokens {}

    #[async_trait::async_trait]
    impl AuthTokenProvider for Tokens {
        async fn fetch_token(&self) -> Result<String, AuthTokenError>;
    }
}

struct ScriptedGateway {
    replies: Mutex<VecDeque<LicenseReply>>,
    calls: Mutex<Vec<LicenseRequest>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<LicenseReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<LicenseRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl LicenseGateway for ScriptedGateway {
    async fn fetch(
        &self,
        request: &LicenseRequest,
        _timeout: Duration,
        _proxy: Option<&str>,
    ) -> LicenseReply {
        self.calls.lock().push(request.clone());
        self.replies.lock().pop_front().unwrap_or(LicenseReply {
            http_code: 404,
            body: Vec::new(),
        })
    }
}

struct ScriptedTokens {
    tokens: Mutex<VecDeque<String>>,
    fetches: Mutex<u32>,
}

impl ScriptedTokens {
    fn new(tokens: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(tokens.into_iter().map(str::to_string).collect()),
            fetches: Mutex::new(0),
        })
    }

    fn fetch_count(&self) -> u32 {
        *self.fetches.lock()
    }
}

#[async_trait::async_trait]
impl AuthTokenProvider for ScriptedTokens {
    async fn fetch_token(&self) -> Result<String, AuthTokenError> {
        *self.fetches.lock() += 1;
        self.tokens
            .lock()
            .pop_front()
            .ok_or(AuthTokenError::RequestFailed(0))
    }
}

struct EventCapture(Mutex<Vec<Event>>);

impl EventCapture {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }

    fn drm_failures(&self) -> Vec<(TuneFailure, i64, bool)> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::DrmMetadata(p) => {
                    Some((p.failure, p.response_code, p.is_retry_enabled()))
                }
                _ => None,
            })
            .collect()
    }
}

impl EventListener for EventCapture {
    fn on_event(&self, event: &Event) {
        self.0.lock().push(event.clone());
    }
}

struct Fixture {
    manager: DrmSessionManager,
    gateway: Arc<ScriptedGateway>,
    tokens: Arc<ScriptedTokens>,
    cdm: Arc<SoftwareCdmHost>,
    events: Arc<EventCapture>,
    config: Arc<ConfigStore>,
}

fn fixture_with(
    max_sessions: usize,
    cdm_config: SoftwareCdmConfig,
    replies: Vec<LicenseReply>,
    tokens: Vec<&str>,
) -> Fixture {
    let config = Arc::new(ConfigStore::new());
    let event_manager = Arc::new(EventManager::new());
    let capture = EventCapture::new();
    event_manager.add_listener_for_all_events(capture.clone());

    let gateway = ScriptedGateway::new(replies);
    let tokens = ScriptedTokens::new(tokens);
    let cdm = Arc::new(SoftwareCdmHost::with_config(cdm_config));

    let manager = DrmSessionManager::new(
        max_sessions,
        Arc::new(HelperRegistry::with_default_helpers()),
        Arc::clone(&config),
        event_manager,
        cdm.clone(),
        gateway.clone(),
        tokens.clone(),
    );
    Fixture {
        manager,
        gateway,
        tokens,
        cdm,
        events: capture,
        config,
    }
}

fn fixture(replies: Vec<LicenseReply>) -> Fixture {
    fixture_with(2, SoftwareCdmConfig::default(), replies, vec![])
}

fn ok_reply(body: &[u8]) -> LicenseReply {
    LicenseReply {
        http_code: 200,
        body: body.to_vec(),
    }
}

fn clearkey_hls_helper(
    registry: &HelperRegistry,
) -> Arc<dyn fluxplayer_drm::DrmHelper> {
    let info = DrmInfo {
        method: DrmMethod::Aes128,
        media_format: MediaFormat::HlsMp4,
        key_uri: "file.key".to_string(),
        system_uuid: CLEARKEY_UUID.to_string(),
        manifest_url: "http://example.com/assets/test.m3u8".to_string(),
        ..Default::default()
    };
    Arc::from(registry.create_helper(&info).expect("clearkey helper"))
}

fn playready_helper(
    registry: &HelperRegistry,
    policy: &str,
) -> Arc<dyn fluxplayer_drm::DrmHelper> {
    let info = DrmInfo {
        method: DrmMethod::None,
        media_format: MediaFormat::Dash,
        system_uuid: PLAYREADY_UUID.to_string(),
        ..Default::default()
    };
    let mut helper = registry.create_helper(&info).expect("playready helper");
    let pssh = format!(
        "<WRMHEADER xmlns=\"http://schemas.microsoft.com/DRM/2007/03/PlayReadyHeader\" \
         version=\"4.0.0.0\"><DATA><KID>16bytebase64enckeydata==</KID>\
         <ckm:policy xmlns:ckm=\"urn:ccp:ckm\">{policy}</ckm:policy></DATA></WRMHEADER>"
    );
    assert!(helper.parse_pssh(pssh.as_bytes()));
    Arc::from(helper)
}

#[tokio::test]
async fn test_clearkey_hls_license_acquisition() {
    // The full HLS ClearKey flow: GET of the resolved key file, JWK
    // wrapping, CDM reaching READY
    let fx = fixture(vec![ok_reply(b"TESTKEYDATA")]);
    let registry = HelperRegistry::with_default_helpers();
    let helper = clearkey_hls_helper(&registry);

    let session = fx
        .manager
        .create_drm_session(helper, true)
        .await
        .expect("session");
    assert_eq!(session.key_system(), "org.w3.clearkey");
    assert_eq!(session.state(), KeyState::Ready);

    let calls = fx.gateway.calls();
    assert_eq!(calls.len(), 1, "exactly one license request");
    assert_eq!(calls[0].method, LicenseMethod::Get);
    assert_eq!(calls[0].url, "http://example.com/assets/file.key");

    let licenses = fx.cdm.received_licenses();
    assert_eq!(licenses.len(), 1);
    let jwk: serde_json::Value = serde_json::from_slice(&licenses[0]).expect("JWK");
    assert_eq!(jwk["keys"][0]["k"], "VEVTVEtFWURBVEE");
    assert_eq!(jwk["keys"][0]["kid"], "MQ");
    assert!(fx.events.drm_failures().is_empty());
}

#[tokio::test]
async fn test_same_key_id_shares_one_session_and_one_license() {
    // Slot deduplication: equal key ids resolve to the pointer-equal
    // session and the license server sees one challenge
    let fx = fixture(vec![ok_reply(b"TESTKEYDATA")]);
    let registry = HelperRegistry::with_default_helpers();

    let first = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect("first session");
    let second = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), false)
        .await
        .expect("second session");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fx.gateway.calls().len(), 1);

    // Concurrent requests funnel through the same slot as well
    let (a, b) = tokio::join!(
        fx.manager
            .create_drm_session(clearkey_hls_helper(&registry), false),
        fx.manager
            .create_drm_session(clearkey_hls_helper(&registry), false),
    );
    assert!(Arc::ptr_eq(&a.expect("a"), &b.expect("b")));
    assert_eq!(fx.gateway.calls().len(), 1);
}

#[tokio::test]
async fn test_different_key_ids_use_separate_slots() {
    let fx = fixture(vec![ok_reply(b"LIC1"), ok_reply(b"LIC2")]);
    let registry = HelperRegistry::with_default_helpers();

    let dash_info = DrmInfo {
        method: DrmMethod::Aes128,
        media_format: MediaFormat::Dash,
        system_uuid: CLEARKEY_UUID.to_string(),
        ..Default::default()
    };
    let make_helper = |kid: u8| {
        let mut helper = registry.create_helper(&dash_info).expect("helper");
        let mut pssh = vec![0u8; 48];
        pssh[32..48].copy_from_slice(&[kid; 16]);
        assert!(helper.parse_pssh(&pssh));
        Arc::from(helper) as Arc<dyn fluxplayer_drm::DrmHelper>
    };

    let one = fx
        .manager
        .create_drm_session(make_helper(0xAA), true)
        .await
        .expect("one");
    let two = fx
        .manager
        .create_drm_session(make_helper(0xBB), false)
        .await
        .expect("two");

    assert!(!Arc::ptr_eq(&one, &two));
    assert_eq!(fx.gateway.calls().len(), 2);
    assert_eq!(one.key_id(), &[0xAA; 16]);
    assert_eq!(two.key_id(), &[0xBB; 16]);
}

#[tokio::test]
async fn test_mds_license_flow_over_http() {
    // Metadata-bearing content: MDS headers ride on the request, the
    // envelope payload carries the token, and the JSON response envelope
    // is unwrapped before the CDM
    let license_b64 = base64::engine::general_purpose::STANDARD.encode(b"PRLICENSE");
    let envelope = format!("{{\"license\":\"{license_b64}\",\"accessAttributes\":\"0\"}}");
    let fx = fixture_with(
        2,
        SoftwareCdmConfig::default(),
        vec![ok_reply(envelope.as_bytes())],
        vec!["TOKEN1"],
    );
    let registry = HelperRegistry::with_default_helpers();
    let helper = playready_helper(&registry, "policy");

    let session = fx
        .manager
        .create_drm_session(helper, true)
        .await
        .expect("session");
    assert_eq!(session.state(), KeyState::Ready);

    let calls = fx.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(fx.tokens.fetch_count(), 1, "token fetched once and cached");

    assert_eq!(
        calls[0].headers.get("Accept").map(|v| v[0].as_str()),
        Some("application/vnd.xcal.mds.licenseResponse+json; version=1")
    );
    assert_eq!(
        calls[0].headers.get("Content-Type").map(|v| v[0].as_str()),
        Some("application/vnd.xcal.mds.licenseRequest+json; version=1")
    );

    let payload: serde_json::Value =
        serde_json::from_slice(&calls[0].payload).expect("envelope");
    assert_eq!(payload["accessToken"], "TOKEN1");

    // The MDS response envelope was unwrapped before the CDM
    let licenses = fx.cdm.received_licenses();
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0], b"PRLICENSE");
}

#[tokio::test(start_paused = true)]
async fn test_5xx_responses_retry_once_then_fail() {
    let fx = fixture(vec![
        LicenseReply {
            http_code: 503,
            body: Vec::new(),
        },
        LicenseReply {
            http_code: 503,
            body: Vec::new(),
        },
    ]);
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::LicenceRequestFailed);
    assert_eq!(err.response_code, 503);
    assert_eq!(fx.gateway.calls().len(), 2);

    let failures = fx.events.drm_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, TuneFailure::LicenceRequestFailed);
    assert!(!failures[0].2, "request failures are not retryable");
}

#[tokio::test]
async fn test_terminal_http_failure_is_not_retried() {
    let fx = fixture(vec![LicenseReply {
        http_code: 404,
        body: Vec::new(),
    }]);
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::LicenceRequestFailed);
    assert_eq!(err.response_code, 404);
    assert_eq!(fx.gateway.calls().len(), 1);

    // The key id is now marked unusable until the failed set is cleared
    assert!(!fx.manager.is_key_id_usable(b"1"));
    fx.manager.clear_failed_key_ids();
    assert!(fx.manager.is_key_id_usable(b"1"));
}

#[tokio::test]
async fn test_authorisation_failure_maps_412() {
    // Plain HTTP carries no extended status, so a bare 412 is terminal
    // and never triggers a token refresh
    let fx = fixture(vec![LicenseReply {
        http_code: 412,
        body: Vec::new(),
    }]);
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::AuthorisationFailure);
    assert_eq!(fx.gateway.calls().len(), 1);
    assert_eq!(fx.tokens.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_challenge_fails_the_tune() {
    let fx = fixture_with(
        2,
        SoftwareCdmConfig {
            suppress_challenge: true,
            ..Default::default()
        },
        vec![],
        vec![],
    );
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::DrmChallengeFailed);
    assert!(fx.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_empty_session_id_from_cdm() {
    let fx = fixture_with(
        2,
        SoftwareCdmConfig {
            empty_session_id: true,
            ..Default::default()
        },
        vec![],
        vec![],
    );
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::DrmSessionIdEmpty);
}

#[tokio::test]
async fn test_construct_failure_binds_as_data_bind_failed() {
    let fx = fixture_with(
        2,
        SoftwareCdmConfig {
            fail_construct: true,
            ..Default::default()
        },
        vec![],
        vec![],
    );
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::DrmDataBindFailed);
}

#[tokio::test]
async fn test_hdcp_restriction_surfaces_compliance_error() {
    let fx = fixture_with(
        2,
        SoftwareCdmConfig {
            key_status_on_update: KeyStatus::OutputRestrictedHdcp22,
            ..Default::default()
        },
        vec![ok_reply(b"TESTKEYDATA")],
        vec![],
    );
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must fail");
    assert_eq!(err.failure, TuneFailure::HdcpComplianceError);
    let failures = fx.events.drm_failures();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].2, "HDCP failures must not be retried");
}

#[tokio::test]
async fn test_external_license_skips_the_network() {
    let fx = fixture(vec![]);
    let registry = HelperRegistry::with_default_helpers();
    let info = DrmInfo {
        method: DrmMethod::Aes128,
        media_format: MediaFormat::Hls,
        key_uri: "81701500000810367b131dd025ab0a7bd8d20c1314151600".to_string(),
        ..Default::default()
    };
    let helper: Arc<dyn fluxplayer_drm::DrmHelper> =
        Arc::from(registry.create_helper(&info).expect("vgdrm helper"));

    let session = fx
        .manager
        .create_drm_session(helper, true)
        .await
        .expect("session");
    assert_eq!(session.state(), KeyState::Ready);
    assert_eq!(session.key_system(), "net.vgdrm");
    assert!(
        fx.gateway.calls().is_empty(),
        "external license must not hit the license server"
    );
}

#[tokio::test]
async fn test_inactive_manager_refuses_sessions() {
    let fx = fixture(vec![ok_reply(b"TESTKEYDATA")]);
    let registry = HelperRegistry::with_default_helpers();

    fx.manager.set_session_mgr_state(SessionManagerState::Inactive);
    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("must refuse");
    assert_eq!(err.failure, TuneFailure::Unknown);
    assert!(fx.gateway.calls().is_empty());

    fx.manager.set_session_mgr_state(SessionManagerState::Active);
    assert!(fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_fake_tune_stops_after_initialization() {
    let fx = fixture(vec![ok_reply(b"TESTKEYDATA")]);
    fx.config
        .set_bool(ConfigLayer::Dev, ConfigKey::FakeTune, true);
    let registry = HelperRegistry::with_default_helpers();

    let err = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect_err("fake tune aborts");
    assert_eq!(err.failure, TuneFailure::Unknown);
    assert!(fx.gateway.calls().is_empty(), "no license traffic on fake tune");
}

#[tokio::test]
async fn test_clear_session_data_resets_the_cache() {
    let fx = fixture(vec![ok_reply(b"LIC1"), ok_reply(b"LIC2")]);
    let registry = HelperRegistry::with_default_helpers();

    let first = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect("first");
    fx.manager.clear_session_data().await;
    assert_eq!(first.state(), KeyState::Closed);

    // The cache is empty again: same key id acquires a fresh license
    let second = fx
        .manager
        .create_drm_session(clearkey_hls_helper(&registry), true)
        .await
        .expect("second");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(fx.gateway.calls().len(), 2);
}

#[tokio::test]
async fn test_decrypt_verifies_output_protection_first() {
    use fluxplayer_drm::{CdmError, OutputProtection};

    // PlayReady without a ckm:policy: plain challenge POST, no token
    let config = Arc::new(ConfigStore::new());
    config.set_bool(ConfigLayer::Dev, ConfigKey::EnablePlayReadyOutputProtection, true);
    let output_protection = Arc::new(OutputProtection::new());
    let gateway = ScriptedGateway::new(vec![ok_reply(b"PRLICENSE")]);
    let cdm = Arc::new(SoftwareCdmHost::new());
    let manager = DrmSessionManager::new(
        2,
        Arc::new(HelperRegistry::with_default_helpers()),
        Arc::clone(&config),
        Arc::new(EventManager::new()),
        cdm.clone(),
        gateway.clone(),
        ScriptedTokens::new(vec![]),
    )
    .with_output_protection(Arc::clone(&output_protection));

    let registry = HelperRegistry::with_default_helpers();
    let info = DrmInfo {
        method: DrmMethod::None,
        media_format: MediaFormat::Dash,
        system_uuid: PLAYREADY_UUID.to_string(),
        ..Default::default()
    };
    let mut helper = registry.create_helper(&info).expect("playready helper");
    let pssh = "<WRMHEADER xmlns=\"http://schemas.microsoft.com/DRM/2007/03/PlayReadyHeader\" \
                version=\"4.0.0.0\"><DATA><KID>16bytebase64enckeydata==</KID></DATA></WRMHEADER>";
    assert!(helper.parse_pssh(pssh.as_bytes()));
    let helper: Arc<dyn fluxplayer_drm::DrmHelper> = Arc::from(helper);

    let session = manager
        .create_drm_session(helper, true)
        .await
        .expect("session");
    assert_eq!(session.state(), KeyState::Ready);

    // HD source, no HDCP 2.2: decrypt is allowed
    output_protection.set_source_resolution(1920, 1080);
    output_protection.set_hdcp22_active(false);
    let clear = session
        .decrypt(&[0u8; 16], b"payload", session.key_id())
        .expect("decrypt");
    assert_eq!(clear, b"payload");

    // UHD source without HDCP 2.2: refused before the CDM is touched
    output_protection.set_source_resolution(3840, 2160);
    let err = session
        .decrypt(&[0u8; 16], b"payload", session.key_id())
        .expect_err("must refuse");
    assert!(matches!(err, CdmError::DecryptFailed(4328)));

    // Restoring the link re-enables decryption
    output_protection.set_hdcp22_active(true);
    assert!(session.decrypt(&[0u8; 16], b"payload", session.key_id()).is_ok());
}

struct ScriptedSecManager {
    outcomes: Mutex<VecDeque<Result<(Vec<u8>, i64), SecManagerError>>>,
    tokens_seen: Mutex<Vec<String>>,
    session_states: Mutex<Vec<(i64, bool)>>,
    window_sizes: Mutex<Vec<(i64, i32, i32)>>,
    released: Mutex<Vec<i64>>,
}

impl ScriptedSecManager {
    fn new(outcomes: Vec<Result<(Vec<u8>, i64), SecManagerError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            tokens_seen: Mutex::new(Vec::new()),
            session_states: Mutex::new(Vec::new()),
            window_sizes: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl SecurityManager for ScriptedSecManager {
    async fn acquire_license(
        &self,
        _request: &LicenseRequest,
        _content_metadata_b64: &str,
        _challenge_b64: &str,
        _key_system: &str,
        access_token: &str,
    ) -> Result<(Vec<u8>, i64), SecManagerError> {
        self.tokens_seen.lock().push(access_token.to_string());
        self.outcomes.lock().pop_front().unwrap_or(Err(SecManagerError {
            status_code: 500,
            reason_code: 0,
        }))
    }

    fn update_session_state(&self, session_id: i64, active: bool) {
        self.session_states.lock().push((session_id, active));
    }

    fn release_session(&self, session_id: i64) {
        self.released.lock().push(session_id);
    }

    fn set_video_window_size(&self, session_id: i64, width: i32, height: i32) {
        self.window_sizes.lock().push((session_id, width, height));
    }

    fn set_playback_speed_state(&self, _session_id: i64, _speed: i32, _position: f64) {}
}

fn secmanager_fixture(
    sec: Arc<ScriptedSecManager>,
    tokens: MockTokens,
) -> (DrmSessionManager, Arc<ScriptedGateway>, Arc<SoftwareCdmHost>, Arc<ConfigStore>) {
    let config = Arc::new(ConfigStore::new());
    config.set_bool(ConfigLayer::Dev, ConfigKey::UseSecurityManager, true);
    let gateway = ScriptedGateway::new(vec![]);
    let cdm = Arc::new(SoftwareCdmHost::new());
    let manager = DrmSessionManager::new(
        2,
        Arc::new(HelperRegistry::with_default_helpers()),
        Arc::clone(&config),
        Arc::new(EventManager::new()),
        cdm.clone(),
        gateway.clone(),
        Arc::new(tokens),
    )
    .with_security_manager(sec);
    (manager, gateway, cdm, config)
}

#[tokio::test]
async fn test_secmanager_path_binds_the_session() {
    let sec = ScriptedSecManager::new(vec![Ok((b"SECLICENSE".to_vec(), 77))]);
    let mut tokens = MockTokens::new();
    tokens
        .expect_fetch_token()
        .times(1)
        .returning(|| Ok("SECTOKEN".to_string()));
    let (manager, gateway, cdm, _config) = secmanager_fixture(sec.clone(), tokens);

    let registry = HelperRegistry::with_default_helpers();
    let session = manager
        .create_drm_session(playready_helper(&registry, "policy"), true)
        .await
        .expect("session");

    assert_eq!(session.state(), KeyState::Ready);
    assert_eq!(session.sec_session_id(), 77);
    assert!(gateway.calls().is_empty(), "secmanager path must not use HTTP");
    assert_eq!(sec.tokens_seen.lock().clone(), vec!["SECTOKEN".to_string()]);
    assert_eq!(cdm.received_licenses(), vec![b"SECLICENSE".to_vec()]);

    // Playback-state forwarding reaches the bound security session
    manager.set_video_window_size(1920, 1080);
    assert_eq!(sec.window_sizes.lock().clone(), vec![(77, 1920, 1080)]);
    manager.notify_cleanup();
    assert_eq!(sec.session_states.lock().clone(), vec![(77, false)]);

    // Teardown releases the security session
    manager.clear_session_data().await;
    assert_eq!(sec.released.lock().clone(), vec![77]);
}

#[tokio::test]
async fn test_secmanager_token_refresh_on_412_401() {
    // The structured path is the only transport reporting an extended
    // status: a 412/401 outcome refreshes the token exactly once and the
    // license service sees two acquisitions in total
    let sec = ScriptedSecManager::new(vec![
        Err(SecManagerError {
            status_code: 412,
            reason_code: 401,
        }),
        Ok((b"SECLICENSE".to_vec(), 78)),
    ]);
    let mut tokens = MockTokens::new();
    let mut fetch = 0u32;
    tokens.expect_fetch_token().times(2).returning(move || {
        fetch += 1;
        Ok(format!("TOKEN{fetch}"))
    });
    let (manager, _gateway, _cdm, _config) = secmanager_fixture(sec.clone(), tokens);

    let registry = HelperRegistry::with_default_helpers();
    let session = manager
        .create_drm_session(playready_helper(&registry, "policy"), true)
        .await
        .expect("session");
    assert_eq!(session.state(), KeyState::Ready);
    assert_eq!(
        sec.tokens_seen.lock().clone(),
        vec!["TOKEN1".to_string(), "TOKEN2".to_string()],
        "exactly one refresh with the fresh token"
    );
}

#[tokio::test]
async fn test_pssh_front_door_reports_corrupt_metadata() {
    let fx = fixture(vec![]);
    let err = fx
        .manager
        .create_session_for_init_data(
            PLAYREADY_UUID,
            MediaFormat::Dash,
            b"somerandomdatawhichisntevenxml",
            None,
            true,
        )
        .await
        .expect_err("corrupt pssh must fail");
    assert_eq!(err.failure, TuneFailure::CorruptDrmMetadata);
    let failures = fx.events.drm_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, TuneFailure::CorruptDrmMetadata);
}
