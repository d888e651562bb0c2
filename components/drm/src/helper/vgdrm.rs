//! VGDRM scheme helper

use std::collections::BTreeMap;
use std::time::Duration;

use fluxplayer_shared_types::MediaFormat;
use tracing::warn;

use super::{DrmHelper, DrmHelperFactory};
use crate::memory::{FileInterchange, MemorySystem};
use crate::types::{ChallengeInfo, DrmInfo, LicenseMethod, LicenseRequest, VGDRM_UUID};

const VGDRM_OCDM_ID: &str = "net.vgdrm";
/// Character offset of the key-length byte inside the hex key URI
const KEY_ID_OFFSET: usize = 12;
/// Character offset of the key-id payload inside the hex key URI
const KEY_PAYLOAD_OFFSET: usize = 14;
const TEN_SECONDS: Duration = Duration::from_millis(10_000);

/// Legacy key-URI prefixes recognised as VGDRM content
const VGDRM_URI_START: [&str; 6] = [
    "80701500000810",
    "81701500000810",
    "8070110000080C",
    "8170110000080C",
    "8070110000080c",
    "8170110000080c",
];

/// Helper for `net.vgdrm` protected HLS streams
///
/// The license lives entirely inside the DRM (external license); buffers
/// are exchanged with the CDM through a side-channel memory system.
pub struct VgdrmHelper {
    drm_info: DrmInfo,
    pssh_str: String,
    memory: FileInterchange,
}

impl VgdrmHelper {
    fn new(drm_info: DrmInfo) -> Self {
        Self {
            drm_info,
            pssh_str: String::new(),
            memory: FileInterchange::new("vgdrm"),
        }
    }
}

impl DrmHelper for VgdrmHelper {
    fn ocdm_system_id(&self) -> &str {
        VGDRM_OCDM_ID
    }

    fn uuid(&self) -> &str {
        &self.drm_info.system_uuid
    }

    fn media_format(&self) -> MediaFormat {
        self.drm_info.media_format
    }

    /// JSON document carrying manifest init data, key URI and optional pssh
    fn create_init_data(&self) -> Vec<u8> {
        let mut doc = serde_json::json!({
            "initData": self.drm_info.init_data,
            "uri": self.drm_info.key_uri,
        });
        if !self.pssh_str.is_empty() {
            doc["pssh"] = serde_json::Value::String(self.pssh_str.clone());
        }
        doc.to_string().into_bytes()
    }

    fn parse_pssh(&mut self, init_data: &[u8]) -> bool {
        self.pssh_str = String::from_utf8_lossy(init_data).into_owned();
        true
    }

    fn is_clear_decrypt(&self) -> bool {
        true
    }

    fn is_hdcp22_required(&self) -> bool {
        true
    }

    fn license_generate_timeout(&self) -> Duration {
        TEN_SECONDS
    }

    fn key_process_timeout(&self) -> Duration {
        TEN_SECONDS
    }

    /// The key id lives inside the hex key URI: length byte at character
    /// offset 12, payload from character offset 14
    fn key(&self) -> Vec<u8> {
        let uri = &self.drm_info.key_uri;
        if uri.len() != 40 && uri.len() != 48 {
            warn!(len = uri.len(), "invalid vgdrm key URI length");
            return Vec::new();
        }
        let Some(len_hex) = uri.get(KEY_ID_OFFSET..KEY_ID_OFFSET + 2) else {
            return Vec::new();
        };
        let Ok(key_len) = usize::from_str_radix(len_hex, 16) else {
            warn!("vgdrm key length byte is not hex");
            return Vec::new();
        };
        let end = KEY_PAYLOAD_OFFSET + 2 * key_len;
        if end > uri.len() {
            warn!(key_len, "vgdrm key length exceeds URI");
            return Vec::new();
        }
        match hex::decode(&uri[KEY_PAYLOAD_OFFSET..end]) {
            Ok(key) => key,
            Err(err) => {
                warn!(%err, "vgdrm key id is not hex");
                Vec::new()
            }
        }
    }

    fn keys(&self) -> BTreeMap<i32, Vec<u8>> {
        let key = self.key();
        if key.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([(0, key)])
        }
    }

    fn is_external_license(&self) -> bool {
        true
    }

    fn generate_license_request(&self, _challenge: &ChallengeInfo, request: &mut LicenseRequest) {
        request.method = LicenseMethod::DrmRetrieve;
        request.url.clear();
        request.payload.clear();
    }

    fn friendly_name(&self) -> &str {
        "VGDRM"
    }

    fn codec_type(&self) -> i32 {
        4
    }

    fn memory_system(&self) -> Option<&dyn MemorySystem> {
        Some(&self.memory)
    }
}

/// Factory for [`VgdrmHelper`]
pub struct VgdrmHelperFactory;

impl DrmHelperFactory for VgdrmHelperFactory {
    fn is_drm(&self, drm_info: &DrmInfo) -> bool {
        // VGDRM only supports HLS
        if drm_info.media_format != MediaFormat::Hls {
            return false;
        }
        if drm_info.key_format == VGDRM_UUID || drm_info.key_format == VGDRM_OCDM_ID {
            return true;
        }
        // Legacy streams are recognised by the shape of the key URI alone
        let uri = &drm_info.key_uri;
        (uri.len() == 40 || uri.len() == 48)
            && uri.chars().all(|c| c.is_ascii_hexdigit())
            && uri.get(..14).is_some_and(|p| VGDRM_URI_START.contains(&p))
    }

    fn create(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>> {
        self.is_drm(drm_info)
            .then(|| Box::new(VgdrmHelper::new(drm_info.clone())) as Box<dyn DrmHelper>)
    }

    fn append_system_id(&self, system_ids: &mut Vec<String>) {
        system_ids.push(VGDRM_UUID.to_string());
    }

    /// Ahead of the default helpers so legacy URI matching wins
    fn weighting(&self) -> i32 {
        40
    }
}
