//! DRM session cache, license acquisition and key-state coordination

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use fluxplayer_config_store::{ConfigKey, ConfigStore};
use fluxplayer_event_manager::{DispatchMode, DrmMetadataPayload, Event, EventManager};
use fluxplayer_net_pool::AbortFlag;
use fluxplayer_shared_types::{
    DrmMethod, KeyStatus, MediaFormat, ProfilerBucket, TuneFailure, TuneProfiler,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::auth::AuthTokenProvider;
use crate::cdm::{CdmHost, CdmSession};
use crate::helper::{DrmHelper, HelperRegistry};
use crate::license::{
    LicenseGateway, LicenseReply, TRANSPORT_ABORTED, TRANSPORT_TIMEOUT,
};
use crate::output_protection::{
    OutputProtection, HDCP_COMPLIANCE_CHECK_FAILURE, HDCP_OUTPUT_PROTECTION_FAILURE,
};
use crate::secmanager::{SecurityManager, INVALID_SEC_SESSION_ID};
use crate::session::DrmSession;
use crate::types::{ChallengeInfo, DrmInfo, KeyState, LicenseMethod, LicenseRequest};

const MAX_LICENSE_REQUEST_ATTEMPTS: u32 = 2;
const MIN_DRM_SESSIONS: usize = 1;
const MAX_DRM_SESSIONS: usize = 30;

const PLAYREADY_OCDM_ID: &str = "com.microsoft.playready";
const MDS_ACCEPT: &str = "application/vnd.xcal.mds.licenseResponse+json; version=1";
const MDS_CONTENT_TYPE: &str = "application/vnd.xcal.mds.licenseRequest+json; version=1";
const LICENSE_RESPONSE_JSON_LICENSE_KEY: &str = "license";

/// Gate for new session creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionManagerState {
    /// Sessions may be created
    Active,
    /// Every create request is refused
    Inactive,
}

/// Callback invoked when the CDM reports a hardware fault
///
/// Installed by the embedding player; the default (when the recovery
/// config is set and no hook is installed) exits the process so
/// supervision can restart the stack.
pub type SupervisorHook = Arc<dyn Fn() + Send + Sync>;

/// Failure detail returned from session creation
///
/// The same information is emitted as a DRM metadata event before the
/// error is returned, except for silent refusals (inactive manager,
/// fail-fast on a known-bad key id, fake tune).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// Mapped failure code; `Unknown` for silent refusals
    pub failure: TuneFailure,
    /// HTTP or transport code when one was observed
    pub response_code: i64,
}

impl SessionError {
    fn silent() -> Self {
        Self {
            failure: TuneFailure::Unknown,
            response_code: -1,
        }
    }
}

struct KeyIdSlot {
    data: Vec<Vec<u8>>,
    creation_time_ms: u64,
    failed: bool,
    primary: bool,
}

impl KeyIdSlot {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            creation_time_ms: 0,
            failed: false,
            primary: false,
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    session: Option<Arc<DrmSession>>,
}

/// Cache of decryption sessions keyed by content key id
///
/// Holds up to `max_sessions` slots (clamped to `[1, 30]`). Concurrent
/// tune-time calls are serialized by one manager lock, so a second request
/// for a key id already being acquired reuses the first session instead of
/// issuing another license request.
pub struct DrmSessionManager {
    max_sessions: usize,
    session_slots: Vec<tokio::sync::Mutex<SessionSlot>>,
    key_slots: Mutex<Vec<KeyIdSlot>>,
    create_lock: tokio::sync::Mutex<()>,
    state: Mutex<SessionManagerState>,
    access_token: Mutex<Option<String>>,
    registry: Arc<HelperRegistry>,
    config: Arc<ConfigStore>,
    events: Arc<EventManager>,
    cdm_host: Arc<dyn CdmHost>,
    gateway: Arc<dyn LicenseGateway>,
    token_provider: Arc<dyn AuthTokenProvider>,
    security_manager: Option<Arc<dyn SecurityManager>>,
    output_protection: Arc<OutputProtection>,
    curl_abort: AbortFlag,
    license_request_abort: AtomicBool,
    sec_session_id: AtomicI64,
    supervisor: Mutex<Option<SupervisorHook>>,
    profiler: Arc<TuneProfiler>,
    epoch: Instant,
}

impl DrmSessionManager {
    /// Create a manager with `max_sessions` cache slots (clamped to [1,30])
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_sessions: usize,
        registry: Arc<HelperRegistry>,
        config: Arc<ConfigStore>,
        events: Arc<EventManager>,
        cdm_host: Arc<dyn CdmHost>,
        gateway: Arc<dyn LicenseGateway>,
        token_provider: Arc<dyn AuthTokenProvider>,
    ) -> Self {
        let max_sessions = max_sessions.clamp(MIN_DRM_SESSIONS, MAX_DRM_SESSIONS);
        info!(max_sessions, "DRM session manager created");
        Self {
            max_sessions,
            session_slots: (0..max_sessions)
                .map(|_| tokio::sync::Mutex::new(SessionSlot::default()))
                .collect(),
            key_slots: Mutex::new((0..max_sessions).map(|_| KeyIdSlot::new()).collect()),
            create_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(SessionManagerState::Active),
            access_token: Mutex::new(None),
            registry,
            config,
            events,
            cdm_host,
            gateway,
            token_provider,
            security_manager: None,
            output_protection: Arc::new(OutputProtection::new()),
            curl_abort: AbortFlag::new(),
            license_request_abort: AtomicBool::new(false),
            sec_session_id: AtomicI64::new(INVALID_SEC_SESSION_ID),
            supervisor: Mutex::new(None),
            profiler: Arc::new(TuneProfiler::new()),
            epoch: Instant::now(),
        }
    }

    /// Share the tune profiler with the rest of the player
    pub fn with_profiler(mut self, profiler: Arc<TuneProfiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Attach a platform security manager
    pub fn with_security_manager(mut self, manager: Arc<dyn SecurityManager>) -> Self {
        self.security_manager = Some(manager);
        self
    }

    /// Use a specific output-protection snapshot (shared with the sink)
    pub fn with_output_protection(mut self, output_protection: Arc<OutputProtection>) -> Self {
        self.output_protection = output_protection;
        self
    }

    /// Install the hardware-fault supervisor hook
    pub fn set_supervisor_hook(&self, hook: SupervisorHook) {
        *self.supervisor.lock() = Some(hook);
    }

    /// Abort flag shared with the license transport
    pub fn curl_abort_flag(&self) -> AbortFlag {
        self.curl_abort.clone()
    }

    /// Number of cache slots
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Gate new session creation
    pub fn set_session_mgr_state(&self, state: SessionManagerState) {
        *self.state.lock() = state;
    }

    /// Current gate state
    pub fn session_mgr_state(&self) -> SessionManagerState {
        *self.state.lock()
    }

    /// Arm/disarm the cooperative transfer abort
    pub fn set_curl_abort(&self, abort: bool) {
        self.curl_abort.set(abort);
    }

    /// Arm/disarm license-request cancellation (also arms the curl abort)
    pub fn set_license_request_abort(&self, abort: bool) {
        self.curl_abort.set(abort);
        self.license_request_abort.store(abort, Ordering::SeqCst);
    }

    /// Drop the cached access token
    pub fn clear_access_token(&self) {
        *self.access_token.lock() = None;
    }

    /// Whether a key id is worth trying
    ///
    /// False only when some slot caches the key id with its failed flag
    /// set; the manifest collaborator uses this to avoid retrying keys that
    /// already failed definitively.
    pub fn is_key_id_usable(&self, key_id: &[u8]) -> bool {
        let slots = self.key_slots.lock();
        !slots
            .iter()
            .any(|s| s.failed && s.data.iter().any(|k| k == key_id))
    }

    /// Tear down every cached session and zero the slots
    pub async fn clear_session_data(&self) {
        info!("clearing session data");
        for (idx, slot) in self.session_slots.iter().enumerate() {
            let mut slot = slot.lock().await;
            if let Some(session) = slot.session.take() {
                self.release_sec_session(&session);
                session.close().await;
                debug!(slot = idx, "session destroyed");
            }
        }
        let mut key_slots = self.key_slots.lock();
        for slot in key_slots.iter_mut() {
            *slot = KeyIdSlot::new();
        }
    }

    /// Destroy sessions whose slot failed (or all, with `force_all`)
    pub async fn clear_drm_session(&self, force_all: bool) {
        for (idx, slot) in self.session_slots.iter().enumerate() {
            let failed = self.key_slots.lock()[idx].failed;
            if !(failed || force_all) {
                continue;
            }
            let mut slot = slot.lock().await;
            if let Some(session) = slot.session.take() {
                info!(slot = idx, "clearing failed session data");
                self.release_sec_session(&session);
                session.close().await;
            }
        }
    }

    /// Reset failed and primary markings on every key slot
    pub fn clear_failed_key_ids(&self) {
        let mut slots = self.key_slots.lock();
        for slot in slots.iter_mut() {
            if slot.failed {
                slot.data.clear();
                slot.failed = false;
                slot.creation_time_ms = 0;
            }
            slot.primary = false;
        }
    }

    /// Forward the video window size to an active security session
    pub fn set_video_window_size(&self, width: i32, height: i32) {
        let session_id = self.sec_session_id.load(Ordering::SeqCst);
        if session_id != INVALID_SEC_SESSION_ID {
            if let Some(sm) = &self.security_manager {
                sm.set_video_window_size(session_id, width, height);
            }
        }
    }

    /// Forward playback speed/position to an active security session
    pub fn set_playback_speed_state(&self, speed: i32, position: f64) {
        let session_id = self.sec_session_id.load(Ordering::SeqCst);
        if session_id != INVALID_SEC_SESSION_ID {
            if let Some(sm) = &self.security_manager {
                sm.set_playback_speed_state(session_id, speed, position);
            }
        }
    }

    /// Mark the current security session inactive (stop/teardown path)
    pub fn notify_cleanup(&self) {
        let session_id = self.sec_session_id.load(Ordering::SeqCst);
        if session_id != INVALID_SEC_SESSION_ID {
            if let Some(sm) = &self.security_manager {
                sm.update_session_state(session_id, false);
            }
        }
    }

    /// Front door for raw protection data: resolve a helper, parse the
    /// pssh, then create (or reuse) the session
    pub async fn create_session_for_init_data(
        &self,
        system_id: &str,
        media_format: MediaFormat,
        init_data: &[u8],
        content_metadata: Option<&str>,
        is_primary: bool,
    ) -> Result<Arc<DrmSession>, SessionError> {
        let drm_info = DrmInfo {
            method: DrmMethod::Aes128,
            media_format,
            system_uuid: system_id.to_string(),
            propagate_uri_params: self.config.bool(ConfigKey::PropagateUriParams),
            ..Default::default()
        };
        if !self.registry.has_drm(&drm_info) {
            warn!(system_id, "failed to locate DRM helper");
            return Err(SessionError::silent());
        }
        let Some(mut helper) = self.registry.create_helper(&drm_info) else {
            return Err(SessionError::silent());
        };
        if let Some(metadata) = content_metadata {
            helper.set_drm_meta_data(metadata);
        }
        if !helper.parse_pssh(init_data) {
            warn!("failed to parse pssh from DRM init data");
            return Err(self.fail(TuneFailure::CorruptDrmMetadata, -1, false));
        }
        self.create_drm_session(Arc::from(helper), is_primary).await
    }

    /// Run the acquisition on its own task so the tune pipeline is not
    /// blocked; the handle lets the next tune join the previous flight
    pub fn spawn_drm_session(
        self: &Arc<Self>,
        helper: Arc<dyn DrmHelper>,
        is_primary: bool,
    ) -> tokio::task::JoinHandle<Result<Arc<DrmSession>, SessionError>> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.create_drm_session(helper, is_primary).await })
    }

    /// Create or reuse the decryption session for the helper's key id
    ///
    /// Serialized manager-wide; returns the cached session when the key id
    /// is already bound to a slot (waiting for readiness when the earlier
    /// acquisition is still in flight).
    pub async fn create_drm_session(
        &self,
        helper: Arc<dyn DrmHelper>,
        is_primary: bool,
    ) -> Result<Arc<DrmSession>, SessionError> {
        let _create_guard = self.create_lock.lock().await;

        if self.session_mgr_state() == SessionManagerState::Inactive {
            warn!("session manager inactive, aborting request");
            return Err(SessionError::silent());
        }
        info!(key_system = helper.ocdm_system_id(), "creating DRM session");

        let key = helper.key();
        if key.is_empty() {
            return Err(self.fail(TuneFailure::FailedToGetKeyId, -1, false));
        }
        let mut key_ids: Vec<Vec<u8>> = helper.keys().into_values().collect();
        if key_ids.is_empty() {
            key_ids.push(key.clone());
        }

        let slot_idx = self.select_slot(&key, key_ids, is_primary)?;

        // Reuse or replace whatever the slot holds
        if let Some(session) = self.try_reuse_slot(slot_idx, &helper, &key).await? {
            return Ok(session);
        }

        let session = self.initialize_session(slot_idx, &helper, &key).await?;

        if self.config.bool(ConfigKey::FakeTune) {
            // Observable testing mode: stop right after DRM initialization
            warn!("exiting fake tune after DRM initialization");
            self.mark_slot_failed(slot_idx);
            return Err(SessionError::silent());
        }

        if let Err(err) = self.acquire_license(&helper, &session).await {
            self.mark_slot_failed(slot_idx);
            return Err(err);
        }

        let sec_id = self.sec_session_id.load(Ordering::SeqCst);
        if sec_id != INVALID_SEC_SESSION_ID {
            debug!(sec_id, "binding security session to DRM session");
            session.set_sec_session_id(sec_id);
        }
        Ok(session)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn mark_slot_failed(&self, slot_idx: usize) {
        self.key_slots.lock()[slot_idx].failed = true;
    }

    fn fail(&self, failure: TuneFailure, response_code: i64, secclient: bool) -> SessionError {
        let payload = DrmMetadataPayload {
            failure,
            response_code,
            secclient_error: secclient,
            ..Default::default()
        };
        self.events
            .send_event(Event::DrmMetadata(payload), DispatchMode::Default);
        SessionError {
            failure,
            response_code,
        }
    }

    fn select_slot(
        &self,
        key: &[u8],
        key_ids: Vec<Vec<u8>>,
        is_primary: bool,
    ) -> Result<usize, SessionError> {
        let mut slots = self.key_slots.lock();

        if let Some(idx) = slots
            .iter()
            .position(|s| s.data.iter().any(|k| k == key))
        {
            info!(slot = idx, "session created/in progress with same key id");
            if slots[idx].failed {
                warn!(slot = idx, "found failed key id, returning key error");
                return Err(SessionError::silent());
            }
            slots[idx].creation_time_ms = self.now_ms();
            slots[idx].primary = is_primary;
            return Ok(idx);
        }

        // Pick the oldest non-primary slot; the slot serving the current
        // playback is marked primary and must survive
        let choice = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.primary)
            .min_by_key(|(_, s)| s.creation_time_ms)
            .map(|(idx, _)| idx);
        let Some(idx) = choice else {
            warn!("unable to find a slot for the key id");
            return Err(SessionError::silent());
        };

        let slot = &mut slots[idx];
        slot.data = key_ids;
        slot.failed = false;
        slot.creation_time_ms = self.now_ms();
        slot.primary = is_primary;
        debug!(slot = idx, "selected slot for key id");
        Ok(idx)
    }

    /// Decide what to do with a slot's existing session
    ///
    /// `Ok(Some(session))` reuses it; `Ok(None)` means the caller creates a
    /// fresh one (any stale session has been destroyed); `Err` marks the
    /// key id failed.
    async fn try_reuse_slot(
        &self,
        slot_idx: usize,
        helper: &Arc<dyn DrmHelper>,
        key: &[u8],
    ) -> Result<Option<Arc<DrmSession>>, SessionError> {
        let mut slot = self.session_slots[slot_idx].lock().await;
        let Some(existing) = slot.session.clone() else {
            return Ok(None);
        };

        let same_system = existing.key_system() == helper.ocdm_system_id();
        let same_key = {
            let slots = self.key_slots.lock();
            slots[slot_idx].data.iter().any(|k| k == existing.key_id())
        };
        if !same_system {
            warn!(
                from = existing.key_system(),
                to = helper.ocdm_system_id(),
                "changing DRM session key system"
            );
        } else if same_key {
            match existing.state() {
                KeyState::Ready => {
                    info!("found READY session with same key id, reusing");
                    self.reactivate_sec_session(&existing);
                    return Ok(Some(existing));
                }
                KeyState::Init => {
                    info!("found INIT session with same key id, reusing");
                    return Ok(Some(existing));
                }
                KeyState::Pending => {
                    if existing
                        .wait_for_state(KeyState::Ready, helper.key_process_timeout())
                        .await
                    {
                        info!("waited for session READY with same key id, reusing");
                        return Ok(Some(existing));
                    }
                    warn!(key_system = existing.key_system(), "key was never ready");
                    self.mark_slot_failed(slot_idx);
                    return Err(SessionError::silent());
                }
                state => {
                    warn!(?state, "existing session is in an error state");
                    self.mark_slot_failed(slot_idx);
                    return Err(SessionError::silent());
                }
            }
        }

        warn!(key_system = existing.key_system(), "deleting existing DRM session");
        self.release_sec_session(&existing);
        existing.close().await;
        slot.session = None;
        Ok(None)
    }

    /// Build the CDM session from helper init data and park it in the slot
    async fn initialize_session(
        &self,
        slot_idx: usize,
        helper: &Arc<dyn DrmHelper>,
        key: &[u8],
    ) -> Result<Arc<DrmSession>, SessionError> {
        let init_data = helper.create_init_data();
        let cdm = CdmSession::generate(
            self.cdm_host.as_ref(),
            helper.ocdm_system_id(),
            &init_data,
            None,
            Arc::clone(&self.output_protection),
        )
        .await;

        // Output protection is player-managed for PlayReady only
        if helper.ocdm_system_id() == PLAYREADY_OCDM_ID
            && self.config.bool(ConfigKey::EnablePlayReadyOutputProtection)
        {
            cdm.set_output_protection(true);
            helper.set_output_protection(true);
        }

        let state = cdm.state();
        let session = Arc::new(DrmSession::new(cdm, Arc::clone(helper), key.to_vec()));
        self.session_slots[slot_idx].lock().await.session = Some(Arc::clone(&session));

        match state {
            KeyState::Init => Ok(session),
            KeyState::ErrorEmptySessionId => {
                error!("DRM session id is empty");
                self.mark_slot_failed(slot_idx);
                Err(self.fail(TuneFailure::DrmSessionIdEmpty, -1, false))
            }
            other => {
                error!(?other, "DRM session was not initialized");
                self.mark_slot_failed(slot_idx);
                Err(self.fail(TuneFailure::DrmDataBindFailed, -1, false))
            }
        }
    }

    /// Challenge generation, license acquisition and key processing
    async fn acquire_license(
        &self,
        helper: &Arc<dyn DrmHelper>,
        session: &Arc<DrmSession>,
    ) -> Result<(), SessionError> {
        if helper.is_external_license() {
            // The DRM fetches its own license; just drive key processing
            return self.process_license(helper, session, None).await;
        }

        info!("requesting license challenge from the CDM");
        self.profiler.profile_begin(ProfilerBucket::LaTotal);
        self.profiler.profile_begin(ProfilerBucket::LaPreproc);
        let Some(mut challenge) = session
            .generate_key_request(helper.license_generate_timeout())
            .await
        else {
            self.profiler.profile_error(ProfilerBucket::LaPreproc, -1);
            return Err(self.fail(TuneFailure::DrmChallengeFailed, -1, false));
        };
        if session.state() != KeyState::Pending {
            self.profiler.profile_error(ProfilerBucket::LaPreproc, -1);
            return Err(self.fail(TuneFailure::DrmChallengeFailed, -1, false));
        }
        self.profiler.profile_end(ProfilerBucket::LaPreproc);

        let anonymous = self.config.bool(ConfigKey::AnonymousLicenseRequest);
        let metadata = helper.drm_meta_data();
        let app_token = self.config.string(ConfigKey::AuthToken);
        let using_app_token = !app_token.is_empty();

        if !(metadata.is_empty() || anonymous) {
            if using_app_token {
                info!("got access token from external app");
                challenge.access_token = app_token;
            } else {
                match self.get_access_token().await {
                    Ok(token) => {
                        debug!("access token is available");
                        challenge.access_token = token;
                    }
                    Err(code) => {
                        warn!("failed to get access token, anonymous request not enabled");
                        if !self.license_request_abort.load(Ordering::SeqCst) {
                            return Err(self.fail(
                                TuneFailure::FailedToGetAccessToken,
                                code,
                                false,
                            ));
                        }
                    }
                }
            }
        }
        if self.license_request_abort.load(Ordering::SeqCst) {
            error!("license request was aborted");
            return Err(self.fail(TuneFailure::DrmSelfAbort, TRANSPORT_ABORTED, false));
        }

        let mut request = LicenseRequest {
            url: self.license_server_url(helper.as_ref()),
            license_anonymous_request: anonymous,
            ..Default::default()
        };
        helper.generate_license_request(&challenge, &mut request);
        if request.method == LicenseMethod::Post
            && request.payload.is_empty()
            && challenge.data.is_empty()
        {
            error!("license challenge was not generated by the CDM");
            return Err(self.fail(TuneFailure::DrmChallengeFailed, -1, false));
        }

        let metadata_available = !metadata.is_empty();
        self.configure_license_headers(&mut request, metadata_available);
        let proxy = self.config.string(ConfigKey::LicenseProxy);
        let proxy = (!proxy.is_empty()).then_some(proxy);

        info!(url = %request.url, "requesting license from the DRM server");
        let use_secmanager = self.config.bool(ConfigKey::UseSecurityManager)
            && self.security_manager.is_some()
            && (metadata_available || using_app_token);
        if use_secmanager {
            return self
                .acquire_via_secmanager(helper, session, &metadata, challenge, request, using_app_token)
                .await;
        }

        self.profiler.profile_begin(ProfilerBucket::LaNetwork);
        let reply = self.fetch_with_retry(&request, proxy.as_deref()).await;
        if reply.is_success() {
            self.profiler.profile_end(ProfilerBucket::LaNetwork);
        } else {
            self.profiler
                .profile_error(ProfilerBucket::LaNetwork, reply.http_code);
        }
        self.handle_license_reply(helper, session, reply, metadata_available)
            .await
    }

    /// HTTP attempts: at most two, retrying 5xx and transport
    /// timeout/connect failures with the configured back-off
    ///
    /// Plain HTTP has no expired-token signal; only the security-manager
    /// path carries an extended status and refreshes the token.
    async fn fetch_with_retry(&self, request: &LicenseRequest, proxy: Option<&str>) -> LicenseReply {
        let timeout = Duration::from_secs(self.config.int(ConfigKey::DrmNetworkTimeout) as u64);
        let retry_wait = self.config.int(ConfigKey::LicenseRetryWaitTime).max(0) as u64;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let reply = self.gateway.fetch(request, timeout, proxy).await;
            if reply.is_success() {
                info!(attempt, "license acquisition succeeded");
                return reply;
            }
            warn!(attempt, code = reply.http_code, "license request attempt failed");

            if reply.is_retryable() && attempt < MAX_LICENSE_REQUEST_ATTEMPTS {
                if retry_wait > 0 {
                    info!(retry_wait, "sleeping before license retry");
                    tokio::time::sleep(Duration::from_millis(retry_wait)).await;
                }
                continue;
            }
            return reply;
        }
    }

    /// Security-manager acquisition path
    ///
    /// The structured API is the only transport that reports an extended
    /// status, so the single expired-token (412/401) refresh lives here.
    async fn acquire_via_secmanager(
        &self,
        helper: &Arc<dyn DrmHelper>,
        session: &Arc<DrmSession>,
        metadata: &str,
        mut challenge: ChallengeInfo,
        request: LicenseRequest,
        using_app_token: bool,
    ) -> Result<(), SessionError> {
        let Some(sm) = self.security_manager.clone() else {
            return Err(self.fail(TuneFailure::LicenceRequestFailed, -1, true));
        };
        let engine = base64::engine::general_purpose::STANDARD;
        let metadata_b64 = engine.encode(metadata.as_bytes());
        let challenge_b64 = engine.encode(&challenge.data);

        let mut refreshed = false;
        loop {
            let outcome = sm
                .acquire_license(
                    &request,
                    &metadata_b64,
                    &challenge_b64,
                    helper.ocdm_system_id(),
                    &challenge.access_token,
                )
                .await;
            match outcome {
                Ok((license, sec_session_id)) => {
                    info!("license acquired via security manager");
                    self.sec_session_id.store(sec_session_id, Ordering::SeqCst);
                    let body = helper.transform_license_response(license);
                    return self.process_license(helper, session, Some(body)).await;
                }
                Err(err) if err.status_code == 412 && err.reason_code == 401 && !using_app_token && !refreshed => {
                    info!("security manager reports expired token, refreshing");
                    self.clear_access_token();
                    match self.get_access_token().await {
                        Ok(token) => {
                            refreshed = true;
                            challenge.access_token = token;
                            continue;
                        }
                        Err(code) => {
                            return Err(self.fail(
                                TuneFailure::FailedToGetAccessToken,
                                code,
                                true,
                            ))
                        }
                    }
                }
                Err(err) => {
                    error!(status = err.status_code, reason = err.reason_code, "security manager license failure");
                    let failure = if err.status_code == 412 {
                        TuneFailure::AuthorisationFailure
                    } else if err.status_code == TRANSPORT_TIMEOUT {
                        TuneFailure::LicenceTimeout
                    } else {
                        TuneFailure::LicenceRequestFailed
                    };
                    return Err(self.fail(failure, err.status_code, true));
                }
            }
        }
    }

    /// Map the transport outcome, unwrap MDS envelopes and feed the CDM
    async fn handle_license_reply(
        &self,
        helper: &Arc<dyn DrmHelper>,
        session: &Arc<DrmSession>,
        reply: LicenseReply,
        metadata_available: bool,
    ) -> Result<(), SessionError> {
        if !reply.is_success() {
            error!(code = reply.http_code, "invalid license response from server");
            let failure = match reply.http_code {
                412 => TuneFailure::AuthorisationFailure,
                TRANSPORT_TIMEOUT => TuneFailure::LicenceTimeout,
                TRANSPORT_ABORTED => TuneFailure::DrmSelfAbort,
                _ => TuneFailure::LicenceRequestFailed,
            };
            return Err(self.fail(failure, reply.http_code, false));
        }

        let mut body = reply.body;
        if metadata_available {
            // MDS responses wrap the license:
            // {"license":"<base64>","accessAttributes":"0"}
            match serde_json::from_slice::<serde_json::Value>(&body) {
                Ok(envelope) => {
                    match envelope
                        .get(LICENSE_RESPONSE_JSON_LICENSE_KEY)
                        .and_then(|v| v.as_str())
                        .and_then(|b64| {
                            base64::engine::general_purpose::STANDARD.decode(b64).ok()
                        }) {
                        Some(license) => body = license,
                        None => warn!("unable to retrieve license from JSON response"),
                    }
                }
                Err(_) => warn!("failed to parse JSON license response"),
            }
        }

        info!("license acquisition completed");
        let body = helper.transform_license_response(body);
        self.process_license(helper, session, Some(body)).await
    }

    /// Feed the license to the CDM and map the resulting key state
    async fn process_license(
        &self,
        helper: &Arc<dyn DrmHelper>,
        session: &Arc<DrmSession>,
        license: Option<Vec<u8>>,
    ) -> Result<(), SessionError> {
        info!("updating license response to the CDM");
        self.profiler.profile_begin(ProfilerBucket::LaPostproc);
        let cdm_code = session
            .process_key(license.as_deref(), helper.key_process_timeout())
            .await;
        self.profiler.profile_end(ProfilerBucket::LaPostproc);

        match session.state() {
            KeyState::Ready => {
                self.profiler.profile_end(ProfilerBucket::LaTotal);
                Ok(())
            }
            KeyState::Pending => {
                warn!("failed to get DRM keys");
                Err(self.fail(TuneFailure::InvalidDrmKey, -1, false))
            }
            state => {
                if session.key_status() == KeyStatus::HwError {
                    self.handle_hw_error();
                }
                let failure = if cdm_code == HDCP_OUTPUT_PROTECTION_FAILURE
                    || cdm_code == HDCP_COMPLIANCE_CHECK_FAILURE
                {
                    TuneFailure::HdcpComplianceError
                } else {
                    TuneFailure::DrmKeyUpdateFailed
                };
                warn!(?state, cdm_code, "key update failed");
                Err(self.fail(failure, i64::from(cdm_code), false))
            }
        }
    }

    /// Cached-token accessor; fetches once per process (or after an
    /// explicit refresh)
    async fn get_access_token(&self) -> Result<String, i64> {
        if let Some(token) = self.access_token.lock().clone() {
            return Ok(token);
        }
        match self.token_provider.fetch_token().await {
            Ok(token) => {
                *self.access_token.lock() = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                warn!(%err, "session token acquisition failed");
                let code = match err {
                    fluxplayer_shared_types::AuthTokenError::RequestFailed(code) => i64::from(code),
                    _ => -1,
                };
                Err(code)
            }
        }
    }

    /// Configured license URL for the helper's scheme, most specific first
    fn license_server_url(&self, helper: &dyn DrmHelper) -> String {
        let specific = match helper.ocdm_system_id() {
            "com.widevine.alpha" => self.config.string(ConfigKey::WidevineLicenseServerUrl),
            PLAYREADY_OCDM_ID => self.config.string(ConfigKey::PlayReadyLicenseServerUrl),
            "org.w3.clearkey" => self.config.string(ConfigKey::ClearKeyLicenseServerUrl),
            _ => String::new(),
        };
        if !specific.is_empty() {
            specific
        } else {
            self.config.string(ConfigKey::LicenseServerUrl)
        }
    }

    /// MDS headers when metadata rides along; custom operator headers
    /// otherwise
    fn configure_license_headers(&self, request: &mut LicenseRequest, metadata_available: bool) {
        if metadata_available {
            request.headers = [
                ("Accept".to_string(), vec![MDS_ACCEPT.to_string()]),
                ("Content-Type".to_string(), vec![MDS_CONTENT_TYPE.to_string()]),
            ]
            .into();
            return;
        }
        let custom = self.config.string(ConfigKey::CustomLicenseData);
        if custom.is_empty() {
            return;
        }
        // Operator-provided headers, one `Name: value` per line
        let mut headers = std::collections::HashMap::new();
        for line in custom.lines() {
            if let Some((name, value)) = line.split_once(':') {
                headers
                    .entry(name.trim().to_string())
                    .or_insert_with(Vec::new)
                    .push(value.trim().to_string());
            }
        }
        if !headers.is_empty() {
            request.headers = headers;
        }
    }

    fn reactivate_sec_session(&self, session: &DrmSession) {
        let session_id = session.sec_session_id();
        if session_id != INVALID_SEC_SESSION_ID
            && self.sec_session_id.load(Ordering::SeqCst) == INVALID_SEC_SESSION_ID
        {
            if let Some(sm) = &self.security_manager {
                self.sec_session_id.store(session_id, Ordering::SeqCst);
                sm.update_session_state(session_id, true);
            }
        }
    }

    fn release_sec_session(&self, session: &DrmSession) {
        let session_id = session.sec_session_id();
        if session_id != INVALID_SEC_SESSION_ID {
            if let Some(sm) = &self.security_manager {
                sm.release_session(session_id);
            }
            if self.sec_session_id.load(Ordering::SeqCst) == session_id {
                self.sec_session_id
                    .store(INVALID_SEC_SESSION_ID, Ordering::SeqCst);
            }
        }
    }

    /// Hardware fault: hand control to the supervisor hook when recovery
    /// is enabled
    fn handle_hw_error(&self) {
        if !self.config.bool(ConfigKey::EnableHwErrorRecovery) {
            return;
        }
        error!("CDM reported a hardware error, invoking supervisor");
        let hook = self.supervisor.lock().clone();
        match hook {
            Some(hook) => hook(),
            None => std::process::exit(1),
        }
    }
}
