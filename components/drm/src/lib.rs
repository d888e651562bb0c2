//! # drm Component
//!
//! Content-protection core: helper registry, DRM session manager and the
//! adapter over the platform content-decryption module.
//!
//! The flow on a protected segment: the session manager consults the
//! [`HelperRegistry`] for a [`DrmHelper`] matching the segment's
//! [`DrmInfo`], binds the helper's init data to a CDM session, drives the
//! challenge → license → key-update exchange (over HTTP via the transfer
//! pool, or through a platform security manager), and caches the resulting
//! session keyed by content key-id. Concurrent tunes for the same key-id
//! share one license acquisition.
//!
//! # Examples
//!
//! Selecting a helper for a Widevine DASH stream:
//!
//! ```
//! use fluxplayer_drm::{DrmInfo, HelperRegistry, WIDEVINE_UUID};
//! use fluxplayer_shared_types::{DrmMethod, MediaFormat};
//!
//! let registry = HelperRegistry::with_default_helpers();
//! let info = DrmInfo {
//!     method: DrmMethod::Aes128,
//!     media_format: MediaFormat::Dash,
//!     system_uuid: WIDEVINE_UUID.to_string(),
//!     ..Default::default()
//! };
//! assert!(registry.has_drm(&info));
//! let helper = registry.create_helper(&info).expect("widevine helper");
//! assert_eq!(helper.ocdm_system_id(), "com.widevine.alpha");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Module declarations
mod auth;
mod cdm;
mod helper;
mod license;
mod memory;
mod output_protection;
mod secmanager;
mod session;
mod session_manager;
mod types;

// Re-export public API
pub use auth::{AuthTokenProvider, HttpAuthTokenProvider};
pub use cdm::{
    CdmError, CdmHost, CdmHostSession, CdmSession, CdmSignals, SoftwareCdmConfig, SoftwareCdmHost,
};
pub use helper::{
    ClearKeyHelperFactory, DrmHelper, DrmHelperFactory, HelperRegistry, PlayReadyHelperFactory,
    VanillaAesHelperFactory, VgdrmHelperFactory, WidevineHelperFactory, DEFAULT_WEIGHTING,
};
pub use license::{HttpLicenseGateway, LicenseGateway, LicenseReply};
pub use memory::{FileInterchange, MemorySystem};
pub use output_protection::OutputProtection;
pub use secmanager::{SecManagerError, SecurityManager, INVALID_SEC_SESSION_ID};
pub use session::DrmSession;
pub use session_manager::{DrmSessionManager, SessionError, SessionManagerState, SupervisorHook};
pub use types::{
    ChallengeInfo, DrmInfo, KeyState, LicenseMethod, LicenseRequest, CLEARKEY_UUID,
    PLAYREADY_UUID, VGDRM_UUID, WIDEVINE_UUID,
};
