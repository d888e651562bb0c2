//! W3C ClearKey scheme helper

use std::collections::BTreeMap;

use base64::Engine;
use fluxplayer_shared_types::{DrmMethod, MediaFormat};
use tracing::warn;

use super::{resolve_key_uri, DrmHelper, DrmHelperFactory, DEFAULT_WEIGHTING};
use crate::types::{ChallengeInfo, DrmInfo, LicenseMethod, LicenseRequest, CLEARKEY_UUID};

const CLEARKEY_OCDM_ID: &str = "org.w3.clearkey";
/// Synthetic key id used for HLS, also placed in the init data
const CLEARKEY_HLS_KEY_ID: &str = "1";
const DASH_KEY_ID_OFFSET: usize = 32;
const DASH_KEY_ID_LEN: usize = 16;

/// Helper for `org.w3.clearkey` content
///
/// DASH extracts the key id from the pssh; HLS uses the synthetic key id
/// `"1"` and wraps the fetched key into a JWK set for the CDM.
pub struct ClearKeyHelper {
    drm_info: DrmInfo,
    init_data: Vec<u8>,
    key_id: Vec<u8>,
}

impl ClearKeyHelper {
    fn new(drm_info: DrmInfo) -> Self {
        Self {
            drm_info,
            init_data: Vec::new(),
            key_id: Vec::new(),
        }
    }

    // Everything that is not DASH follows the HLS key-file protocol
    fn is_hls(&self) -> bool {
        self.drm_info.media_format != MediaFormat::Dash
    }
}

impl DrmHelper for ClearKeyHelper {
    fn ocdm_system_id(&self) -> &str {
        CLEARKEY_OCDM_ID
    }

    fn uuid(&self) -> &str {
        &self.drm_info.system_uuid
    }

    fn media_format(&self) -> MediaFormat {
        self.drm_info.media_format
    }

    /// DASH binds the pssh as-is; HLS constructs a `{"kids":["1"]}` document
    fn create_init_data(&self) -> Vec<u8> {
        if self.drm_info.media_format == MediaFormat::Dash {
            self.init_data.clone()
        } else {
            serde_json::json!({ "kids": [CLEARKEY_HLS_KEY_ID] })
                .to_string()
                .into_bytes()
        }
    }

    fn parse_pssh(&mut self, init_data: &[u8]) -> bool {
        self.init_data = init_data.to_vec();
        match init_data.get(DASH_KEY_ID_OFFSET..DASH_KEY_ID_OFFSET + DASH_KEY_ID_LEN) {
            Some(key_id) => {
                self.key_id = key_id.to_vec();
                true
            }
            None => {
                warn!(len = init_data.len(), "clearkey pssh too short for key id");
                false
            }
        }
    }

    fn is_clear_decrypt(&self) -> bool {
        true
    }

    fn key(&self) -> Vec<u8> {
        if self.drm_info.media_format == MediaFormat::Dash {
            self.key_id.clone()
        } else {
            CLEARKEY_HLS_KEY_ID.as_bytes().to_vec()
        }
    }

    fn keys(&self) -> BTreeMap<i32, Vec<u8>> {
        BTreeMap::from([(0, self.key())])
    }

    /// HLS fetches the key file itself (GET on the resolved key URI); DASH
    /// posts the CDM challenge.
    fn generate_license_request(&self, challenge: &ChallengeInfo, request: &mut LicenseRequest) {
        if request.url.is_empty() {
            if !self.drm_info.key_uri.is_empty() {
                request.url = resolve_key_uri(
                    &self.drm_info.manifest_url,
                    &self.drm_info.key_uri,
                    self.drm_info.propagate_uri_params,
                );
            } else {
                request.url = challenge.url.clone();
            }
        }
        if self.is_hls() {
            request.method = LicenseMethod::Get;
        } else {
            request.method = LicenseMethod::Post;
            request.payload = challenge.data.clone();
        }
    }

    /// HLS wraps the raw key bytes into a JWK set; DASH responses already
    /// arrive in JWK form and pass through untouched.
    fn transform_license_response(&self, response: Vec<u8>) -> Vec<u8> {
        if !self.is_hls() {
            return response;
        }
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        serde_json::json!({
            "keys": [{
                "alg": "cbc",
                "k": engine.encode(&response),
                "kid": engine.encode(self.key()),
            }]
        })
        .to_string()
        .into_bytes()
    }

    fn friendly_name(&self) -> &str {
        "Clearkey"
    }

    fn codec_type(&self) -> i32 {
        0
    }
}

/// Factory for [`ClearKeyHelper`]
pub struct ClearKeyHelperFactory;

impl DrmHelperFactory for ClearKeyHelperFactory {
    fn is_drm(&self, drm_info: &DrmInfo) -> bool {
        drm_info.method == DrmMethod::Aes128
            && (drm_info.media_format.is_fragmented_mp4()
                || drm_info.media_format == MediaFormat::Hls)
    }

    fn create(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>> {
        self.is_drm(drm_info)
            .then(|| Box::new(ClearKeyHelper::new(drm_info.clone())) as Box<dyn DrmHelper>)
    }

    fn append_system_id(&self, system_ids: &mut Vec<String>) {
        system_ids.push(CLEARKEY_UUID.to_string());
    }

    /// ClearKey is the fallback for AES content, hence the doubled weight
    fn weighting(&self) -> i32 {
        DEFAULT_WEIGHTING * 2
    }
}
