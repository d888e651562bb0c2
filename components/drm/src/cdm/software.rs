//! In-process software CDM host
//!
//! Stands in for the platform module during development and tests: the
//! challenge is produced immediately at construction, and a license update
//! drives the key status configured on the host.

use std::sync::Arc;

use base64::Engine;
use fluxplayer_shared_types::KeyStatus;
use parking_lot::Mutex;
use tracing::debug;

use super::{CdmError, CdmHost, CdmHostSession, CdmSignals};

/// Behaviour knobs for the software host
#[derive(Debug, Clone)]
pub struct SoftwareCdmConfig {
    /// Reject session construction outright
    pub fail_construct: bool,
    /// Produce an empty session id
    pub empty_session_id: bool,
    /// Never emit a challenge
    pub suppress_challenge: bool,
    /// Never signal key-updated after an update
    pub suppress_key_ready: bool,
    /// Key status reported once a license is processed
    pub key_status_on_update: KeyStatus,
}

impl Default for SoftwareCdmConfig {
    fn default() -> Self {
        Self {
            fail_construct: false,
            empty_session_id: false,
            suppress_challenge: false,
            suppress_key_ready: false,
            key_status_on_update: KeyStatus::Usable,
        }
    }
}

/// Software stand-in for the platform decryption module
#[derive(Default)]
pub struct SoftwareCdmHost {
    config: SoftwareCdmConfig,
    licenses: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SoftwareCdmHost {
    /// Host with default (always succeeding) behaviour
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with explicit behaviour knobs
    pub fn with_config(config: SoftwareCdmConfig) -> Self {
        Self {
            config,
            licenses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Licenses fed to any session of this host, in arrival order
    pub fn received_licenses(&self) -> Vec<Vec<u8>> {
        self.licenses.lock().clone()
    }
}

#[async_trait::async_trait]
impl CdmHost for SoftwareCdmHost {
    async fn construct_session(
        &self,
        key_system: &str,
        init_data: &[u8],
        _custom_data: Option<&str>,
        signals: Arc<CdmSignals>,
    ) -> Result<Arc<dyn CdmHostSession>, CdmError> {
        if self.config.fail_construct {
            return Err(CdmError::ConstructFailed(
                "software CDM configured to fail".to_string(),
            ));
        }
        let session_id = if self.config.empty_session_id {
            String::new()
        } else {
            uuid::Uuid::new_v4().to_string()
        };

        let session = Arc::new(SoftwareCdmSession {
            session_id: session_id.clone(),
            config: self.config.clone(),
            signals: Arc::clone(&signals),
            host_licenses: Arc::clone(&self.licenses),
        });

        // The software module has no round trip to wait for: emit the
        // challenge as soon as the session exists.
        if !self.config.suppress_challenge {
            let challenge = serde_json::json!({
                "keySystem": key_system,
                "sessionId": session_id,
                "initData": base64::engine::general_purpose::STANDARD.encode(init_data),
                "type": "license-request",
            })
            .to_string();
            signals.on_challenge("", challenge.as_bytes());
        }
        Ok(session)
    }
}

struct SoftwareCdmSession {
    session_id: String,
    config: SoftwareCdmConfig,
    signals: Arc<CdmSignals>,
    // Shared with the host so tests can assert on what the CDM received
    host_licenses: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait::async_trait]
impl CdmHostSession for SoftwareCdmSession {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    async fn update(&self, license: &[u8]) -> Result<(), CdmError> {
        debug!(len = license.len(), "software CDM received license");
        self.host_licenses.lock().push(license.to_vec());
        if !self.config.suppress_key_ready {
            self.signals.on_key_update(self.config.key_status_on_update);
            self.signals.on_keys_updated();
        }
        Ok(())
    }

    fn decrypt(&self, _iv: &[u8], payload: &[u8], key_id: &[u8]) -> Result<Vec<u8>, CdmError> {
        if key_id.is_empty() {
            return Err(CdmError::DecryptFailed(-1));
        }
        // Clear-path stand-in: hand the payload back
        Ok(payload.to_vec())
    }

    async fn close(&self) {}
}
