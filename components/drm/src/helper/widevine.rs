//! Widevine scheme helper

use std::collections::BTreeMap;

use fluxplayer_shared_types::MediaFormat;
use tracing::{info, warn};

use super::{DrmHelper, DrmHelperFactory, DEFAULT_WEIGHTING};
use crate::types::{ChallengeInfo, DrmInfo, LicenseMethod, LicenseRequest, WIDEVINE_UUID};

const WIDEVINE_OCDM_ID: &str = "com.widevine.alpha";
/// Marker byte preceding the key-id length in version-0 pssh data
const KEY_ID_SIZE_INDICATOR: u8 = 0x12;
/// Key-id offset inside a version-1 pssh box
const DASH_KEY_ID_OFFSET: usize = 32;

/// Helper for `com.widevine.alpha` protected DASH / fMP4-HLS streams
pub struct WidevineHelper {
    drm_info: DrmInfo,
    init_data: Vec<u8>,
    key_id: Vec<u8>,
    key_ids: BTreeMap<i32, Vec<u8>>,
    content_metadata: String,
}

impl WidevineHelper {
    fn new(drm_info: DrmInfo) -> Self {
        Self {
            drm_info,
            init_data: Vec::new(),
            key_id: Vec::new(),
            key_ids: BTreeMap::new(),
            content_metadata: String::new(),
        }
    }
}

impl DrmHelper for WidevineHelper {
    fn ocdm_system_id(&self) -> &str {
        WIDEVINE_OCDM_ID
    }

    fn uuid(&self) -> &str {
        &self.drm_info.system_uuid
    }

    fn media_format(&self) -> MediaFormat {
        self.drm_info.media_format
    }

    fn create_init_data(&self) -> Vec<u8> {
        self.init_data.clone()
    }

    /// Version 0 pssh carries a size-prefixed key id whose size byte sits at
    /// offset 32 or 34 depending on the packager; version 1 carries a plain
    /// 16-byte key id at offset 32.
    fn parse_pssh(&mut self, init_data: &[u8]) -> bool {
        self.init_data = init_data.to_vec();
        if init_data.len() <= DASH_KEY_ID_OFFSET {
            warn!(len = init_data.len(), "widevine pssh too short");
            return false;
        }

        let version = init_data[8];
        info!(version, "widevine pssh data version");
        let key_id = match version {
            0 => {
                let header = if init_data[32] == KEY_ID_SIZE_INDICATOR {
                    33
                } else if init_data.len() > 34 && init_data[34] == KEY_ID_SIZE_INDICATOR {
                    35
                } else {
                    warn!("widevine key-id size indicator not found, using default offset");
                    33
                };
                let size = *init_data.get(header).unwrap_or(&0) as usize;
                init_data.get(header + 1..header + 1 + size).map(<[u8]>::to_vec)
            }
            1 => init_data
                .get(DASH_KEY_ID_OFFSET..DASH_KEY_ID_OFFSET + 16)
                .map(<[u8]>::to_vec),
            other => {
                warn!(version = other, "unsupported widevine pssh version");
                None
            }
        };

        match key_id {
            Some(key_id) if !key_id.is_empty() => {
                self.key_ids.insert(0, key_id.clone());
                self.key_id = key_id;
                true
            }
            _ => false,
        }
    }

    fn drm_meta_data(&self) -> String {
        self.content_metadata.clone()
    }

    /// Content metadata arrives from the manifest collaborator, not the pssh
    fn set_drm_meta_data(&mut self, meta_data: &str) {
        self.content_metadata = meta_data.to_string();
    }

    fn key(&self) -> Vec<u8> {
        self.key_id.clone()
    }

    fn keys(&self) -> BTreeMap<i32, Vec<u8>> {
        self.key_ids.clone()
    }

    fn generate_license_request(&self, challenge: &ChallengeInfo, request: &mut LicenseRequest) {
        request.method = LicenseMethod::Post;
        if request.url.is_empty() {
            request.url = challenge.url.clone();
        }
        request.headers = [(
            "Content-Type".to_string(),
            vec!["application/octet-stream".to_string()],
        )]
        .into();
        request.payload = challenge.data.clone();
    }

    fn friendly_name(&self) -> &str {
        "Widevine"
    }

    fn codec_type(&self) -> i32 {
        1
    }
}

/// Factory for [`WidevineHelper`]
pub struct WidevineHelperFactory;

impl DrmHelperFactory for WidevineHelperFactory {
    fn is_drm(&self, drm_info: &DrmInfo) -> bool {
        (drm_info.system_uuid == WIDEVINE_UUID || drm_info.key_format == WIDEVINE_OCDM_ID)
            && drm_info.media_format.is_fragmented_mp4()
    }

    fn create(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>> {
        self.is_drm(drm_info)
            .then(|| Box::new(WidevineHelper::new(drm_info.clone())) as Box<dyn DrmHelper>)
    }

    fn append_system_id(&self, system_ids: &mut Vec<String>) {
        system_ids.push(WIDEVINE_UUID.to_string());
    }

    fn weighting(&self) -> i32 {
        DEFAULT_WEIGHTING
    }
}
