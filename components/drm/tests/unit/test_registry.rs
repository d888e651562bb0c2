//! Helper registry acceptance, ordering and capability advertisement

use fluxplayer_drm::{HelperRegistry, CLEARKEY_UUID, PLAYREADY_UUID, VGDRM_UUID, WIDEVINE_UUID};
use fluxplayer_shared_types::{DrmMethod, MediaFormat};

use super::drm_info;

#[test]
fn test_registry_accept_and_create_agree() {
    // hasDRM(info) must hold exactly when createHelper(info) yields a helper
    let registry = HelperRegistry::with_default_helpers();
    let infos = [
        drm_info(DrmMethod::Aes128, MediaFormat::Dash, "file.key", "", WIDEVINE_UUID),
        drm_info(DrmMethod::None, MediaFormat::Dash, "", "", PLAYREADY_UUID),
        drm_info(DrmMethod::Aes128, MediaFormat::HlsMp4, "file.key", "", CLEARKEY_UUID),
        drm_info(DrmMethod::None, MediaFormat::Hls, "", "net.vgdrm", ""),
        // Unsupported combinations
        drm_info(DrmMethod::None, MediaFormat::Hls, "file.key", "", WIDEVINE_UUID),
        drm_info(DrmMethod::None, MediaFormat::Hls, "file.key", "", PLAYREADY_UUID),
        drm_info(DrmMethod::None, MediaFormat::Progressive, "", "", ""),
    ];
    for info in infos {
        assert_eq!(
            registry.has_drm(&info),
            registry.create_helper(&info).is_some(),
            "{info:?}"
        );
    }
}

#[test]
fn test_registry_orders_factories_by_weight() {
    // A legacy VGDRM key URI is also AES/HLS; the lower-weight VGDRM
    // factory must win over the ClearKey fallback
    let registry = HelperRegistry::with_default_helpers();
    let info = drm_info(
        DrmMethod::Aes128,
        MediaFormat::Hls,
        "81701500000810367b131dd025ab0a7bd8d20c1314151600",
        "",
        "",
    );
    let helper = registry.create_helper(&info).expect("helper");
    assert_eq!(helper.ocdm_system_id(), "net.vgdrm");
}

#[test]
fn test_registry_advertises_system_ids() {
    let registry = HelperRegistry::with_default_helpers();
    let ids = registry.system_ids();
    assert!(ids.contains(&WIDEVINE_UUID.to_string()));
    assert!(ids.contains(&PLAYREADY_UUID.to_string()));
    assert!(ids.contains(&CLEARKEY_UUID.to_string()));
    assert!(ids.contains(&VGDRM_UUID.to_string()));
}
