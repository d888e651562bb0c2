//! Widevine helper pssh parsing and request shaping

use fluxplayer_drm::{HelperRegistry, WIDEVINE_UUID};
use fluxplayer_shared_types::{DrmMethod, MediaFormat};

use super::{drm_info, widevine_pssh_v0, WIDEVINE_V0_KEY_ID};

#[test]
fn test_v0_pssh_key_extraction() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::Aes128, MediaFormat::Dash, "file.key", "", WIDEVINE_UUID);
    let mut helper = registry.create_helper(&info).expect("widevine helper");

    assert_eq!(helper.ocdm_system_id(), "com.widevine.alpha");
    assert!(!helper.is_clear_decrypt());
    assert!(!helper.is_external_license());
    assert_eq!(helper.license_generate_timeout().as_millis(), 5000);
    assert_eq!(helper.key_process_timeout().as_millis(), 5000);

    let pssh = widevine_pssh_v0();
    assert!(helper.parse_pssh(&pssh));
    assert_eq!(helper.key(), WIDEVINE_V0_KEY_ID.to_vec());
    // Init data round-trips untouched for DASH
    assert_eq!(helper.create_init_data(), pssh);

    // Content metadata is caller-supplied
    assert_eq!(helper.drm_meta_data(), "");
    helper.set_drm_meta_data("content meta data");
    assert_eq!(helper.drm_meta_data(), "content meta data");
}

#[test]
fn test_v1_pssh_key_extraction() {
    // Version 1 carries a plain 16-byte key id at offset 32
    let mut pssh = vec![0u8; 52];
    pssh[8] = 0x01;
    pssh[32..48].copy_from_slice(&WIDEVINE_V0_KEY_ID);

    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::Aes128, MediaFormat::Dash, "", "", WIDEVINE_UUID);
    let mut helper = registry.create_helper(&info).expect("widevine helper");
    assert!(helper.parse_pssh(&pssh));
    assert_eq!(helper.key(), WIDEVINE_V0_KEY_ID.to_vec());
}

#[test]
fn test_truncated_pssh_is_rejected() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::Aes128, MediaFormat::Dash, "", "", WIDEVINE_UUID);
    let mut helper = registry.create_helper(&info).expect("widevine helper");
    assert!(!helper.parse_pssh(&[0u8; 16]));
}
