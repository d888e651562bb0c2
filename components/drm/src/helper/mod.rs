//! DRM helper contract and the weighted factory registry

mod clearkey;
mod playready;
mod vanilla;
mod vgdrm;
mod widevine;

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

pub use clearkey::{ClearKeyHelper, ClearKeyHelperFactory};
pub use playready::{PlayReadyHelper, PlayReadyHelperFactory};
pub use vanilla::{VanillaAesHelper, VanillaAesHelperFactory};
pub use vgdrm::{VgdrmHelper, VgdrmHelperFactory};
pub use widevine::{WidevineHelper, WidevineHelperFactory};

use crate::memory::MemorySystem;
use crate::types::{ChallengeInfo, DrmInfo, LicenseRequest};
use fluxplayer_shared_types::MediaFormat;

/// Nominal factory weighting; larger weightings have lower priority
pub const DEFAULT_WEIGHTING: i32 = 50;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Strategy object for one DRM scheme
///
/// Helpers are configured (pssh parse, metadata) before being shared with
/// the session manager; afterwards every method takes `&self`.
pub trait DrmHelper: Send + Sync {
    /// OCDM key-system identifier, e.g. `com.widevine.alpha`
    fn ocdm_system_id(&self) -> &str;

    /// Scheme UUID from the originating [`DrmInfo`]
    fn uuid(&self) -> &str;

    /// Stream format this helper was created for
    fn media_format(&self) -> MediaFormat;

    /// Init data to bind to the CDM session
    fn create_init_data(&self) -> Vec<u8>;

    /// Parse scheme-specific pssh/init data; false on corrupt input
    fn parse_pssh(&mut self, init_data: &[u8]) -> bool;

    /// Whether decrypted data may leave the trusted path
    fn is_clear_decrypt(&self) -> bool {
        false
    }

    /// Whether HDCP 2.2 output protection must be active
    fn is_hdcp22_required(&self) -> bool {
        false
    }

    /// Content-specific DRM metadata exported by the helper
    fn drm_meta_data(&self) -> String {
        String::new()
    }

    /// Supply content metadata extracted elsewhere (e.g. the manifest)
    fn set_drm_meta_data(&mut self, _meta_data: &str) {}

    /// Supply a default key id for schemes that need one
    fn set_default_key_id(&mut self, _cenc_data: &str) {}

    /// Primary content key id
    fn key(&self) -> Vec<u8>;

    /// All key ids known to the helper, keyed by track index
    fn keys(&self) -> BTreeMap<i32, Vec<u8>> {
        BTreeMap::new()
    }

    /// Whether the DRM acquires the license itself (no player HTTP)
    fn is_external_license(&self) -> bool {
        false
    }

    /// Shape the license request from the CDM challenge
    fn generate_license_request(&self, challenge: &ChallengeInfo, request: &mut LicenseRequest);

    /// Rewrite the license-server response into what the CDM expects
    fn transform_license_response(&self, response: Vec<u8>) -> Vec<u8> {
        response
    }

    /// Wait bound for the CDM challenge
    fn license_generate_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Wait bound for the key-updated signal
    fn key_process_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Friendly display name
    fn friendly_name(&self) -> &str {
        ""
    }

    /// DRM codec tag used in traces
    fn codec_type(&self) -> i32 {
        0
    }

    /// Enable output protection for this content (config driven)
    fn set_output_protection(&self, _enabled: bool) {}

    /// Side-channel memory system for CDM buffer interchange, if any
    fn memory_system(&self) -> Option<&dyn MemorySystem> {
        None
    }

    /// Equivalence used by the session cache
    ///
    /// Two helpers match iff scheme UUID, media format, OCDM id and
    /// metadata agree, and this helper's primary key id is among the
    /// other's key ids.
    fn compare(&self, other: &dyn DrmHelper) -> bool {
        if self.uuid() != other.uuid()
            || self.media_format() != other.media_format()
            || self.ocdm_system_id() != other.ocdm_system_id()
            || self.drm_meta_data() != other.drm_meta_data()
        {
            return false;
        }
        let key = self.key();
        other.key() == key || other.keys().values().any(|k| *k == key)
    }
}

/// Factory producing helpers for the schemes it understands
pub trait DrmHelperFactory: Send + Sync {
    /// Whether this factory provides the identified DRM
    fn is_drm(&self, drm_info: &DrmInfo) -> bool;

    /// Build a helper when [`DrmHelperFactory::is_drm`] accepts
    fn create(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>>;

    /// Contribute supported scheme ids for capability advertisement
    fn append_system_id(&self, system_ids: &mut Vec<String>);

    /// Priority weighting; lower runs first
    fn weighting(&self) -> i32 {
        DEFAULT_WEIGHTING
    }
}

/// Priority-ordered collection of helper factories
///
/// Built explicitly at program start; iteration order is deterministic
/// (ascending weight, registration order within a weight).
#[derive(Default)]
pub struct HelperRegistry {
    factories: Vec<Box<dyn DrmHelperFactory>>,
}

impl HelperRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in scheme helper registered
    pub fn with_default_helpers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(VgdrmHelperFactory));
        registry.register(Box::new(WidevineHelperFactory));
        registry.register(Box::new(PlayReadyHelperFactory));
        registry.register(Box::new(ClearKeyHelperFactory));
        registry.register(Box::new(VanillaAesHelperFactory));
        registry
    }

    /// Add a factory, keeping ascending-weight order (stable)
    pub fn register(&mut self, factory: Box<dyn DrmHelperFactory>) {
        let weight = factory.weighting();
        let at = self
            .factories
            .iter()
            .position(|f| f.weighting() > weight)
            .unwrap_or(self.factories.len());
        self.factories.insert(at, factory);
    }

    /// Whether any factory accepts this DRM info
    pub fn has_drm(&self, drm_info: &DrmInfo) -> bool {
        self.factories.iter().any(|f| f.is_drm(drm_info))
    }

    /// Build a helper from the first accepting factory
    pub fn create_helper(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>> {
        for factory in &self.factories {
            if factory.is_drm(drm_info) {
                return factory.create(drm_info);
            }
        }
        debug!(uuid = %drm_info.system_uuid, "no helper factory accepted DRM info");
        None
    }

    /// Scheme ids supported across all factories
    pub fn system_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for factory in &self.factories {
            factory.append_system_id(&mut ids);
        }
        ids
    }
}

/// Resolve a possibly-relative key URI against the manifest URL
///
/// Query parameters of the manifest are carried over when
/// `propagate_params` is set and the key URI has none of its own.
pub(crate) fn resolve_key_uri(manifest_url: &str, key_uri: &str, propagate_params: bool) -> String {
    if key_uri.contains("://") {
        return key_uri.to_string();
    }
    let Ok(base) = reqwest::Url::parse(manifest_url) else {
        return key_uri.to_string();
    };
    let Ok(mut resolved) = base.join(key_uri) else {
        return key_uri.to_string();
    };
    if propagate_params && resolved.query().is_none() {
        if let Ok(manifest) = reqwest::Url::parse(manifest_url) {
            resolved.set_query(manifest.query());
        }
    }
    resolved.to_string()
}
