//! PlayReady WRMHEADER parsing and MDS envelope shaping

use fluxplayer_drm::{
    ChallengeInfo, HelperRegistry, LicenseMethod, LicenseRequest, PLAYREADY_UUID,
};
use fluxplayer_shared_types::{DrmMethod, MediaFormat};

use super::{drm_info, playready_pssh};

#[test]
fn test_pssh_with_policy() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::None, MediaFormat::Dash, "", "", PLAYREADY_UUID);
    let mut helper = registry.create_helper(&info).expect("playready helper");
    assert_eq!(helper.ocdm_system_id(), "com.microsoft.playready");

    let pssh = playready_pssh(Some("policy"));
    assert!(helper.parse_pssh(pssh.as_bytes()));
    assert_eq!(
        String::from_utf8(helper.key()).expect("utf8 key id"),
        "b5f2a6d7-dae6-eeb1-b87a-77247b275ab5"
    );
    assert_eq!(helper.drm_meta_data(), "policy");

    // The policy from the pssh wins over external supplies
    helper.set_drm_meta_data("content meta data that should be ignored");
    assert_eq!(helper.drm_meta_data(), "policy");
}

#[test]
fn test_pssh_without_policy_and_bad_pssh() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::None, MediaFormat::Dash, "", "", PLAYREADY_UUID);
    let mut helper = registry.create_helper(&info).expect("playready helper");

    let pssh = playready_pssh(None);
    assert!(helper.parse_pssh(pssh.as_bytes()));
    assert_eq!(
        String::from_utf8(helper.key()).expect("utf8 key id"),
        "b5f2a6d7-dae6-eeb1-b87a-77247b275ab5"
    );
    assert_eq!(helper.drm_meta_data(), "");

    assert!(!helper.parse_pssh(b"somerandomdatawhichisntevenxml"));
}

#[test]
fn test_license_request_shapes() {
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(DrmMethod::None, MediaFormat::Dash, "", "", PLAYREADY_UUID);
    let mut helper = registry.create_helper(&info).expect("playready helper");

    let challenge = ChallengeInfo {
        data: b"OCDM_CHALLENGE_DATA".to_vec(),
        url: "http://challengeinfourl.example".to_string(),
        access_token: "ACCESS_TOKEN".to_string(),
    };

    // Without parsed metadata the raw challenge goes out
    let mut request = LicenseRequest::default();
    helper.generate_license_request(&challenge, &mut request);
    assert_eq!(request.method, LicenseMethod::Post);
    assert_eq!(request.url, challenge.url);
    assert_eq!(request.payload, challenge.data);

    // With a ckm:policy the payload becomes the MDS JSON envelope
    assert!(helper.parse_pssh(playready_pssh(Some("policy")).as_bytes()));
    let mut request = LicenseRequest::default();
    helper.generate_license_request(&challenge, &mut request);
    let envelope: serde_json::Value =
        serde_json::from_slice(&request.payload).expect("JSON challenge payload");
    assert_eq!(envelope["keySystem"], "playReady");
    assert_eq!(envelope["mediaUsage"], "stream");
    assert_eq!(envelope["licenseRequest"], "T0NETV9DSEFMTEVOR0VfREFUQQ==");
    assert_eq!(envelope["contentMetadata"], "cG9saWN5");
    assert_eq!(envelope["accessToken"], "ACCESS_TOKEN");

    // A pre-set URL (config override) survives the helper
    let mut request = LicenseRequest {
        url: "http://prlicenseserver.example".to_string(),
        ..Default::default()
    };
    helper.generate_license_request(&challenge, &mut request);
    assert_eq!(request.url, "http://prlicenseserver.example");
}
