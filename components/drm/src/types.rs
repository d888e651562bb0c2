//! DRM data model shared across the component

use std::collections::HashMap;

use fluxplayer_shared_types::{DrmMethod, MediaFormat};

/// Widevine scheme UUID
pub const WIDEVINE_UUID: &str = "edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";
/// PlayReady scheme UUID
pub const PLAYREADY_UUID: &str = "9a04f079-9840-4286-ab92-e65be0885f95";
/// W3C ClearKey scheme UUID
pub const CLEARKEY_UUID: &str = "1077efec-c0b2-4d02-ace3-3c1e52e2fb4b";
/// VGDRM scheme UUID
pub const VGDRM_UUID: &str = "A68129D3-575B-4F1A-9CBA-3223846CF7C3";

/// Cryptographic context of one protected segment
///
/// Built by the manifest collaborator and consumed by the helper registry.
#[derive(Debug, Clone, Default)]
pub struct DrmInfo {
    /// Encryption method signalled for the segment
    pub method: DrmMethod,
    /// Stream container format
    pub media_format: MediaFormat,
    /// Initialisation vector when carried by the manifest (16 bytes)
    pub iv: Vec<u8>,
    /// URL of the master manifest
    pub master_manifest_url: String,
    /// URL of the playlist the DRM info came from
    pub manifest_url: String,
    /// Key URI, possibly relative to the manifest URL
    pub key_uri: String,
    /// Key format identifier
    pub key_format: String,
    /// Scheme UUID
    pub system_uuid: String,
    /// Raw init-data string from the manifest
    pub init_data: String,
    /// Propagate manifest query parameters into DRM requests
    pub propagate_uri_params: bool,
}

/// Lifecycle state of a CDM-backed decryption session
///
/// Transitions only move forward, except [`KeyState::Closed`] which is
/// terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Session constructed, init data bound
    Init,
    /// Challenge produced, waiting for the key
    Pending,
    /// Key usable
    Ready,
    /// Key exchange failed
    Error,
    /// CDM returned an empty session id
    ErrorEmptySessionId,
    /// Session closed
    Closed,
}

impl KeyState {
    /// True for states that may still advance to [`KeyState::Ready`]
    pub fn is_before_ready(&self) -> bool {
        matches!(self, KeyState::Init | KeyState::Pending)
    }
}

/// Challenge material produced by the CDM
#[derive(Debug, Clone, Default)]
pub struct ChallengeInfo {
    /// Challenge bytes to present to the license server
    pub data: Vec<u8>,
    /// License URL suggested by the CDM
    pub url: String,
    /// Access token attached to the license request, when required
    pub access_token: String,
}

/// How the license is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LicenseMethod {
    /// The DRM fetches the license itself; no player HTTP request
    #[default]
    DrmRetrieve,
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
}

/// Shaped license request handed to the transport
#[derive(Debug, Clone, Default)]
pub struct LicenseRequest {
    /// Transport method
    pub method: LicenseMethod,
    /// License server URL
    pub url: String,
    /// Header name → values
    pub headers: HashMap<String, Vec<String>>,
    /// POST payload
    pub payload: Vec<u8>,
    /// Request without an access token
    pub license_anonymous_request: bool,
}
