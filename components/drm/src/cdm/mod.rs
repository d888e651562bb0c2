//! Adapter over the platform content-decryption module
//!
//! Each session is an explicit state machine: the platform host pushes
//! challenge / key-update signals into [`CdmSignals`], and the adapter
//! joins them with bounded waits instead of raw callbacks.

mod software;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fluxplayer_shared_types::KeyStatus;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub use software::{SoftwareCdmConfig, SoftwareCdmHost};

use crate::output_protection::{OutputProtection, HDCP_OUTPUT_PROTECTION_FAILURE};
use crate::types::{ChallengeInfo, KeyState};

/// Message-type prefixes the CDM uses for individualization traffic
const INDIVIDUALIZATION_TYPES: [&str; 2] = ["individualization-request", "3"];
const MESSAGE_TYPE_DELIMITER: &str = ":Type:";

/// Errors surfaced by the platform module
#[derive(Debug, thiserror::Error)]
pub enum CdmError {
    /// The platform module could not be opened
    #[error("CDM system unavailable: {0}")]
    SystemUnavailable(String),
    /// Session construction was rejected
    #[error("CDM session construction failed: {0}")]
    ConstructFailed(String),
    /// Update/decrypt called on a closed or broken session
    #[error("CDM session unusable")]
    SessionUnusable,
    /// Decrypt refused or failed, code attached
    #[error("decrypt failed with code {0}")]
    DecryptFailed(i32),
}

/// Signal surface the platform host drives
///
/// The host calls these from its own thread; the adapter side observes
/// them through bounded waits.
pub struct CdmSignals {
    challenge: Mutex<Option<(String, Vec<u8>)>>,
    challenge_ready: (watch::Sender<bool>, watch::Receiver<bool>),
    individualization: Mutex<Option<String>>,
    key_status: Mutex<KeyStatus>,
    key_ready: (watch::Sender<bool>, watch::Receiver<bool>),
}

impl Default for CdmSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl CdmSignals {
    /// Fresh signal surface for one session
    pub fn new() -> Self {
        Self {
            challenge: Mutex::new(None),
            challenge_ready: watch::channel(false),
            individualization: Mutex::new(None),
            key_status: Mutex::new(KeyStatus::InternalError),
            key_ready: watch::channel(false),
        }
    }

    /// Challenge (or individualization message) produced by the CDM
    ///
    /// Messages prefixed `<type>:Type:` with an individualization type are
    /// routed aside; everything else wakes the challenge wait.
    pub fn on_challenge(&self, dest_url: &str, challenge: &[u8]) {
        if let Ok(text) = std::str::from_utf8(challenge) {
            if let Some(pos) = text.find(MESSAGE_TYPE_DELIMITER) {
                let message_type = &text[..pos];
                if INDIVIDUALIZATION_TYPES.contains(&message_type) {
                    info!(message_type, "individualization message from CDM");
                    *self.individualization.lock() =
                        Some(text[pos + MESSAGE_TYPE_DELIMITER.len()..].to_string());
                    return;
                }
            }
        }
        *self.challenge.lock() = Some((dest_url.to_string(), challenge.to_vec()));
        let _ = self.challenge_ready.0.send(true);
    }

    /// Per-key status report from the CDM
    pub fn on_key_update(&self, status: KeyStatus) {
        *self.key_status.lock() = status;
    }

    /// All key statuses delivered; wakes the key wait
    pub fn on_keys_updated(&self) {
        let _ = self.key_ready.0.send(true);
    }
}

/// One platform CDM session created by a [`CdmHost`]
#[async_trait::async_trait]
pub trait CdmHostSession: Send + Sync {
    /// Session id assigned by the platform (may be empty on faults)
    fn session_id(&self) -> String;

    /// Feed license bytes; an empty slice acknowledges an external license
    async fn update(&self, license: &[u8]) -> Result<(), CdmError>;

    /// Decrypt one payload
    fn decrypt(&self, iv: &[u8], payload: &[u8], key_id: &[u8]) -> Result<Vec<u8>, CdmError>;

    /// Tear the platform session down (idempotent)
    async fn close(&self);
}

/// Factory for platform CDM sessions
#[async_trait::async_trait]
pub trait CdmHost: Send + Sync {
    /// Construct a session bound to `signals`
    async fn construct_session(
        &self,
        key_system: &str,
        init_data: &[u8],
        custom_data: Option<&str>,
        signals: Arc<CdmSignals>,
    ) -> Result<Arc<dyn CdmHostSession>, CdmError>;
}

/// Adapter state machine over one platform session
pub struct CdmSession {
    key_system: String,
    session_id: String,
    host_session: Option<Arc<dyn CdmHostSession>>,
    closed: AtomicBool,
    signals: Arc<CdmSignals>,
    state: (watch::Sender<KeyState>, watch::Receiver<KeyState>),
    output_protection: Arc<OutputProtection>,
    hdcp22_required: AtomicBool,
}

impl CdmSession {
    /// Build the CDM session from helper init data
    ///
    /// Completes in `Init` on success; `ErrorEmptySessionId` when the
    /// platform produced no session id; `Error` when construction failed.
    pub async fn generate(
        host: &dyn CdmHost,
        key_system: &str,
        init_data: &[u8],
        custom_data: Option<&str>,
        output_protection: Arc<OutputProtection>,
    ) -> Self {
        let signals = Arc::new(CdmSignals::new());
        let state = watch::channel(KeyState::Init);
        let mut session = Self {
            key_system: key_system.to_string(),
            session_id: String::new(),
            host_session: None,
            closed: AtomicBool::new(false),
            signals: Arc::clone(&signals),
            state,
            output_protection,
            hdcp22_required: AtomicBool::new(false),
        };

        match host
            .construct_session(key_system, init_data, custom_data, signals)
            .await
        {
            Ok(host_session) => {
                let id = host_session.session_id();
                if id.is_empty() {
                    error!(key_system, "CDM returned an empty session id");
                    session.set_state(KeyState::ErrorEmptySessionId);
                } else {
                    debug!(key_system, session_id = %id, "CDM session constructed");
                    session.session_id = id;
                }
                session.host_session = Some(host_session);
            }
            Err(err) => {
                error!(key_system, %err, "CDM session construction failed");
                session.set_state(KeyState::Error);
            }
        }
        session
    }

    /// Key-system identifier this session was built for
    pub fn key_system(&self) -> &str {
        &self.key_system
    }

    /// Platform session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current state
    pub fn state(&self) -> KeyState {
        *self.state.1.borrow()
    }

    /// Require HDCP 2.2 on the output link for this session's content
    pub fn set_output_protection(&self, required: bool) {
        self.hdcp22_required.store(required, Ordering::SeqCst);
    }

    /// Individualization payload routed aside from the challenge channel
    pub fn take_individualization(&self) -> Option<String> {
        self.signals.individualization.lock().take()
    }

    /// Wait for the CDM challenge, bounded by `timeout`
    ///
    /// On success the session moves to `Pending` and the challenge is
    /// returned; on timeout the state is left untouched.
    pub async fn generate_key_request(&self, timeout: Duration) -> Option<ChallengeInfo> {
        if !wait_flag(&self.signals.challenge_ready.1, timeout).await {
            warn!(key_system = %self.key_system, "no challenge from CDM within timeout");
            return None;
        }
        let (url, data) = self.signals.challenge.lock().clone()?;
        self.set_state(KeyState::Pending);
        Some(ChallengeInfo {
            data,
            url,
            access_token: String::new(),
        })
    }

    /// Feed the (transformed) license and wait for key-updated
    ///
    /// Returns the CDM status code: 0 for usable, an HDCP error code for
    /// output-protection rejections, -1 otherwise. The state moves to
    /// `Ready` or `Error` accordingly; a timed-out wait leaves the session
    /// in `Pending`.
    pub async fn process_key(&self, license: Option<&[u8]>, timeout: Duration) -> i32 {
        let Some(host_session) = self.usable_host_session() else {
            self.set_state(KeyState::Error);
            return -1;
        };
        if let Err(err) = host_session.update(license.unwrap_or(&[])).await {
            error!(%err, "CDM rejected the license payload");
            self.set_state(KeyState::Error);
            return -1;
        }

        if !wait_flag(&self.signals.key_ready.1, timeout).await {
            warn!(key_system = %self.key_system, "key was never marked updated");
            return -1;
        }

        let status = *self.signals.key_status.lock();
        match status {
            KeyStatus::Usable => {
                self.set_state(KeyState::Ready);
                0
            }
            KeyStatus::OutputRestrictedHdcp22 | KeyStatus::OutputRestricted => {
                self.set_state(KeyState::Error);
                HDCP_OUTPUT_PROTECTION_FAILURE
            }
            other => {
                warn!(?other, "key update ended in error status");
                self.set_state(KeyState::Error);
                -1
            }
        }
    }

    /// Last key status reported by the platform
    pub fn key_status(&self) -> KeyStatus {
        *self.signals.key_status.lock()
    }

    /// Wait until the session reaches `target`, bounded by `timeout`
    pub async fn wait_for_state(&self, target: KeyState, timeout: Duration) -> bool {
        let mut rx = self.state.1.clone();
        if *rx.borrow() == target {
            return true;
        }
        tokio::time::timeout(timeout, async move {
            loop {
                if rx.changed().await.is_err() {
                    return false;
                }
                if *rx.borrow_and_update() == target {
                    return true;
                }
            }
        })
        .await
        .unwrap_or(false)
    }

    /// Decrypt one payload, verifying output protection first
    pub fn decrypt(&self, iv: &[u8], payload: &[u8], key_id: &[u8]) -> Result<Vec<u8>, CdmError> {
        let code = self
            .output_protection
            .check_decrypt_allowed(self.hdcp22_required.load(Ordering::SeqCst));
        if code != 0 {
            return Err(CdmError::DecryptFailed(code));
        }
        let session = self.usable_host_session().ok_or(CdmError::SessionUnusable)?;
        session.decrypt(iv, payload, key_id)
    }

    /// Close the platform session; safe to call repeatedly
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = &self.host_session {
            session.close().await;
        }
        let _ = self.state.0.send(KeyState::Closed);
    }

    fn usable_host_session(&self) -> Option<Arc<dyn CdmHostSession>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.host_session.clone()
    }

    fn set_state(&self, state: KeyState) {
        // Closed is terminal
        if *self.state.1.borrow() == KeyState::Closed {
            return;
        }
        let _ = self.state.0.send(state);
    }
}

async fn wait_flag(rx: &watch::Receiver<bool>, timeout: Duration) -> bool {
    let mut rx = rx.clone();
    if *rx.borrow() {
        return true;
    }
    tokio::time::timeout(timeout, async move {
        loop {
            if rx.changed().await.is_err() {
                return false;
            }
            if *rx.borrow_and_update() {
                return true;
            }
        }
    })
    .await
    .unwrap_or(false)
}
