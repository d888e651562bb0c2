//! Trivial bypass helper for vanilla AES streams

use fluxplayer_shared_types::MediaFormat;

use super::{DrmHelper, DrmHelperFactory, DEFAULT_WEIGHTING};
use crate::types::{ChallengeInfo, DrmInfo, LicenseRequest};

/// Pass-through helper: no init data, no key, external license
///
/// Used when the stream is plainly AES encrypted and no real DRM applies.
pub struct VanillaAesHelper {
    drm_info: DrmInfo,
}

impl DrmHelper for VanillaAesHelper {
    fn ocdm_system_id(&self) -> &str {
        ""
    }

    fn uuid(&self) -> &str {
        &self.drm_info.system_uuid
    }

    fn media_format(&self) -> MediaFormat {
        self.drm_info.media_format
    }

    fn create_init_data(&self) -> Vec<u8> {
        Vec::new()
    }

    fn parse_pssh(&mut self, _init_data: &[u8]) -> bool {
        false
    }

    fn is_clear_decrypt(&self) -> bool {
        true
    }

    fn key(&self) -> Vec<u8> {
        Vec::new()
    }

    fn is_external_license(&self) -> bool {
        true
    }

    fn generate_license_request(&self, _challenge: &ChallengeInfo, _request: &mut LicenseRequest) {}

    fn friendly_name(&self) -> &str {
        "Vanilla_AES"
    }

    fn codec_type(&self) -> i32 {
        3
    }
}

/// Factory for [`VanillaAesHelper`]
///
/// Never self-selects from DRM info; the player constructs it explicitly
/// for clear AES playback.
pub struct VanillaAesHelperFactory;

impl DrmHelperFactory for VanillaAesHelperFactory {
    fn is_drm(&self, _drm_info: &DrmInfo) -> bool {
        false
    }

    fn create(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>> {
        Some(Box::new(VanillaAesHelper {
            drm_info: drm_info.clone(),
        }))
    }

    fn append_system_id(&self, _system_ids: &mut Vec<String>) {}

    fn weighting(&self) -> i32 {
        DEFAULT_WEIGHTING * 2
    }
}
