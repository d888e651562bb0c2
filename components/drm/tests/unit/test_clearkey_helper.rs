//! ClearKey key extraction, JWK transform and key-URI resolution

use base64::Engine;
use fluxplayer_drm::{ChallengeInfo, HelperRegistry, LicenseMethod, LicenseRequest, CLEARKEY_UUID};
use fluxplayer_shared_types::{DrmMethod, MediaFormat};

use super::{drm_info, WIDEVINE_V0_KEY_ID};

#[test]
fn test_dash_key_from_pssh() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::Aes128, MediaFormat::Dash, "file.key", "", CLEARKEY_UUID);
    let mut helper = registry.create_helper(&info).expect("clearkey helper");
    assert_eq!(helper.ocdm_system_id(), "org.w3.clearkey");
    assert!(helper.is_clear_decrypt());

    let mut pssh = vec![0u8; 48];
    pssh[32..48].copy_from_slice(&WIDEVINE_V0_KEY_ID);
    assert!(helper.parse_pssh(&pssh));
    assert_eq!(helper.key(), WIDEVINE_V0_KEY_ID.to_vec());

    // DASH responses pass through untouched
    let response = helper.transform_license_response(b"DASHLIC".to_vec());
    assert_eq!(response, b"DASHLIC".to_vec());
}

#[test]
fn test_hls_jwk_round_trip() {
    // Raw key bytes must come back as a JWK whose fields base64url-decode
    // to the key and the synthetic key id
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::Aes128, MediaFormat::HlsMp4, "file.key", "", CLEARKEY_UUID);
    let helper = registry.create_helper(&info).expect("clearkey helper");

    assert_eq!(helper.key(), b"1".to_vec());
    let init_data: serde_json::Value =
        serde_json::from_slice(&helper.create_init_data()).expect("init data JSON");
    assert_eq!(init_data["kids"][0], "1");

    let jwk_bytes = helper.transform_license_response(b"TESTKEYDATA".to_vec());
    let jwk: serde_json::Value = serde_json::from_slice(&jwk_bytes).expect("JWK JSON");
    assert_eq!(jwk["keys"][0]["alg"], "cbc");
    assert_eq!(jwk["keys"][0]["k"], "VEVTVEtFWURBVEE");
    assert_eq!(jwk["keys"][0]["kid"], "MQ");

    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let decoded_key = engine
        .decode(jwk["keys"][0]["k"].as_str().expect("k"))
        .expect("base64url key");
    assert_eq!(decoded_key, b"TESTKEYDATA");
    let decoded_kid = engine
        .decode(jwk["keys"][0]["kid"].as_str().expect("kid"))
        .expect("base64url kid");
    assert_eq!(decoded_kid, b"1");
}

#[test]
fn test_key_uri_resolved_against_manifest() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::Aes128, MediaFormat::HlsMp4, "file.key", "", CLEARKEY_UUID);
    let helper = registry.create_helper(&info).expect("clearkey helper");

    let mut request = LicenseRequest::default();
    helper.generate_license_request(&ChallengeInfo::default(), &mut request);
    assert_eq!(request.method, LicenseMethod::Get);
    assert_eq!(request.url, "http://example.com/assets/file.key");
}
