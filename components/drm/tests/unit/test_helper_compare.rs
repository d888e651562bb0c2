//! Helper equivalence used by the session cache

use fluxplayer_drm::{HelperRegistry, CLEARKEY_UUID, PLAYREADY_UUID, WIDEVINE_UUID};
use fluxplayer_shared_types::{DrmMethod, MediaFormat};

use super::{drm_info, playready_pssh, widevine_pssh_v0};

#[test]
fn test_compare_identity_and_discrimination() {
    let registry = HelperRegistry::with_default_helpers();

    let pr_info = drm_info(DrmMethod::None, MediaFormat::Dash, "", "", PLAYREADY_UUID);
    let wv_info = drm_info(DrmMethod::Aes128, MediaFormat::Dash, "file.key", "", WIDEVINE_UUID);
    let ck_info = drm_info(DrmMethod::Aes128, MediaFormat::HlsMp4, "file.key", "", CLEARKEY_UUID);

    let mut playready = registry.create_helper(&pr_info).expect("playready");
    let mut widevine = registry.create_helper(&wv_info).expect("widevine");
    let clearkey = registry.create_helper(&ck_info).expect("clearkey");

    assert!(playready.parse_pssh(playready_pssh(Some("policy")).as_bytes()));
    assert!(widevine.parse_pssh(&widevine_pssh_v0()));

    // Reflexivity
    assert!(playready.compare(playready.as_ref()));
    assert!(widevine.compare(widevine.as_ref()));
    assert!(clearkey.compare(clearkey.as_ref()));

    // Different schemes never compare equal
    assert!(!playready.compare(widevine.as_ref()));
    assert!(!playready.compare(clearkey.as_ref()));
    assert!(!widevine.compare(clearkey.as_ref()));

    // Same scheme + same key id compares equal
    let mut playready2 = registry.create_helper(&pr_info).expect("playready2");
    assert!(playready2.parse_pssh(playready_pssh(Some("policy")).as_bytes()));
    assert!(playready.compare(playready2.as_ref()));

    // Differing metadata breaks equality even with the same key id
    let mut playready3 = registry.create_helper(&pr_info).expect("playready3");
    assert!(playready3.parse_pssh(playready_pssh(Some("otherpolicy")).as_bytes()));
    assert!(!playready.compare(playready3.as_ref()));
}
