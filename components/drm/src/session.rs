//! Cached decryption session

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fluxplayer_shared_types::KeyStatus;

use crate::cdm::{CdmError, CdmSession};
use crate::helper::DrmHelper;
use crate::secmanager::INVALID_SEC_SESSION_ID;
use crate::types::{ChallengeInfo, KeyState};

/// One cached DRM session bound to a content key id
///
/// Owned by a session-manager slot and shared with collaborators as
/// `Arc<DrmSession>`; concurrent tunes for the same key id receive the
/// same allocation.
pub struct DrmSession {
    cdm: CdmSession,
    helper: Arc<dyn DrmHelper>,
    key_id: Vec<u8>,
    sec_session_id: AtomicI64,
}

impl fmt::Debug for DrmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrmSession")
            .field("key_system", &self.cdm.key_system())
            .field("key_id", &self.key_id)
            .field("sec_session_id", &self.sec_session_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl DrmSession {
    pub(crate) fn new(cdm: CdmSession, helper: Arc<dyn DrmHelper>, key_id: Vec<u8>) -> Self {
        Self {
            cdm,
            helper,
            key_id,
            sec_session_id: AtomicI64::new(INVALID_SEC_SESSION_ID),
        }
    }

    /// OCDM key-system identifier
    pub fn key_system(&self) -> &str {
        self.cdm.key_system()
    }

    /// Platform CDM session id
    pub fn session_id(&self) -> &str {
        self.cdm.session_id()
    }

    /// Content key id this session decrypts
    pub fn key_id(&self) -> &[u8] {
        &self.key_id
    }

    /// Helper the session was built from
    pub fn helper(&self) -> &Arc<dyn DrmHelper> {
        &self.helper
    }

    /// Current lifecycle state
    pub fn state(&self) -> KeyState {
        self.cdm.state()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for_state(&self, target: KeyState, timeout: Duration) -> bool {
        self.cdm.wait_for_state(target, timeout).await
    }

    /// Security-manager session bound to this DRM session
    pub fn sec_session_id(&self) -> i64 {
        self.sec_session_id.load(Ordering::SeqCst)
    }

    /// Bind (or clear) the security-manager session
    pub fn set_sec_session_id(&self, session_id: i64) {
        self.sec_session_id.store(session_id, Ordering::SeqCst);
    }

    /// Last key status reported by the CDM
    pub fn key_status(&self) -> KeyStatus {
        self.cdm.key_status()
    }

    /// Decrypt one payload; output protection is verified first
    pub fn decrypt(&self, iv: &[u8], payload: &[u8], key_id: &[u8]) -> Result<Vec<u8>, CdmError> {
        self.cdm.decrypt(iv, payload, key_id)
    }

    /// Close the underlying CDM session (idempotent)
    pub async fn close(&self) {
        self.cdm.close().await;
    }

    pub(crate) async fn generate_key_request(&self, timeout: Duration) -> Option<ChallengeInfo> {
        self.cdm.generate_key_request(timeout).await
    }

    pub(crate) async fn process_key(&self, license: Option<&[u8]>, timeout: Duration) -> i32 {
        self.cdm.process_key(license, timeout).await
    }
}
