//! PlayReady scheme helper

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use fluxplayer_shared_types::MediaFormat;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use tracing::warn;

use super::{DrmHelper, DrmHelperFactory, DEFAULT_WEIGHTING};
use crate::types::{ChallengeInfo, DrmInfo, LicenseMethod, LicenseRequest, PLAYREADY_UUID};

const PLAYREADY_OCDM_ID: &str = "com.microsoft.playready";

/// Helper for `com.microsoft.playready` protected DASH streams
///
/// The pssh payload is a WRMHEADER XML document carrying the key id
/// (base64, Microsoft GUID byte order) and an optional `ckm:policy` element
/// holding the content metadata.
pub struct PlayReadyHelper {
    drm_info: DrmInfo,
    init_data: Vec<u8>,
    key_id: Vec<u8>,
    content_metadata: String,
    output_protection: AtomicBool,
}

impl PlayReadyHelper {
    fn new(drm_info: DrmInfo) -> Self {
        Self {
            drm_info,
            init_data: Vec::new(),
            key_id: Vec::new(),
            content_metadata: String::new(),
            output_protection: AtomicBool::new(false),
        }
    }

    /// Decode the `<KID>` content: base64 → 16 bytes in GUID byte order →
    /// canonical UUID string
    fn key_id_from_kid(kid_base64: &str) -> Option<Vec<u8>> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(kid_base64.trim())
            .ok()?;
        if bytes.len() != 16 {
            warn!(len = bytes.len(), "playready KID is not 16 bytes");
            return None;
        }
        // Microsoft GUIDs store the first three fields little-endian
        let swapped = [
            bytes[3], bytes[2], bytes[1], bytes[0], bytes[5], bytes[4], bytes[7], bytes[6],
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        ];
        let uuid = uuid::Uuid::from_bytes(swapped);
        Some(uuid.to_string().into_bytes())
    }
}

impl DrmHelper for PlayReadyHelper {
    fn ocdm_system_id(&self) -> &str {
        PLAYREADY_OCDM_ID
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

    fn parse_pssh(&mut self, init_data: &[u8]) -> bool {
        self.init_data = init_data.to_vec();
        self.key_id.clear();
        self.content_metadata.clear();

        let Ok(xml) = std::str::from_utf8(init_data) else {
            warn!("playready pssh is not valid UTF-8");
            return false;
        };
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut in_kid = false;
        let mut in_policy = false;
        let mut kid_text = String::new();
        loop {
            match reader.read_event() {
                Ok(XmlEvent::Start(e)) => match e.name().as_ref() {
                    b"KID" => in_kid = true,
                    b"ckm:policy" => in_policy = true,
                    _ => {}
                },
                Ok(XmlEvent::End(e)) => match e.name().as_ref() {
                    b"KID" => in_kid = false,
                    b"ckm:policy" => in_policy = false,
                    _ => {}
                },
                Ok(XmlEvent::Text(text)) => {
                    let Ok(value) = text.unescape() else { continue };
                    if in_kid {
                        kid_text = value.into_owned();
                    } else if in_policy {
                        self.content_metadata = value.into_owned();
                    }
                }
                Ok(XmlEvent::Eof) => break,
                Err(err) => {
                    warn!(%err, "failed to parse playready WRMHEADER");
                    return false;
                }
                _ => {}
            }
        }

        if kid_text.is_empty() {
            warn!("playready WRMHEADER carried no KID");
            return false;
        }
        match Self::key_id_from_kid(&kid_text) {
            Some(key_id) => {
                self.key_id = key_id;
                true
            }
            None => false,
        }
    }

    fn is_hdcp22_required(&self) -> bool {
        self.output_protection.load(Ordering::SeqCst)
    }

    fn drm_meta_data(&self) -> String {
        self.content_metadata.clone()
    }

    // Metadata comes from the pssh policy; external supplies are ignored

    fn key(&self) -> Vec<u8> {
        self.key_id.clone()
    }

    fn keys(&self) -> BTreeMap<i32, Vec<u8>> {
        if self.key_id.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([(0, self.key_id.clone())])
        }
    }

    /// With a `ckm:policy` in play the license payload is the MDS JSON
    /// envelope; otherwise the raw challenge bytes go out as-is.
    fn generate_license_request(&self, challenge: &ChallengeInfo, request: &mut LicenseRequest) {
        request.method = LicenseMethod::Post;
        if request.url.is_empty() {
            request.url = challenge.url.clone();
        }
        if self.content_metadata.is_empty() {
            request.headers = [(
                "Content-Type".to_string(),
                vec!["text/xml; charset=utf-8".to_string()],
            )]
            .into();
            request.payload = challenge.data.clone();
        } else {
            let engine = base64::engine::general_purpose::STANDARD;
            let envelope = serde_json::json!({
                "keySystem": "playReady",
                "mediaUsage": "stream",
                "licenseRequest": engine.encode(&challenge.data),
                "contentMetadata": engine.encode(self.content_metadata.as_bytes()),
                "accessToken": challenge.access_token,
            });
            request.payload = envelope.to_string().into_bytes();
        }
    }

    fn friendly_name(&self) -> &str {
        "PlayReady"
    }

    fn codec_type(&self) -> i32 {
        2
    }

    fn set_output_protection(&self, enabled: bool) {
        self.output_protection.store(enabled, Ordering::SeqCst);
    }
}

/// Factory for [`PlayReadyHelper`]
pub struct PlayReadyHelperFactory;

impl DrmHelperFactory for PlayReadyHelperFactory {
    fn is_drm(&self, drm_info: &DrmInfo) -> bool {
        (drm_info.system_uuid == PLAYREADY_UUID || drm_info.key_format == PLAYREADY_OCDM_ID)
            && drm_info.media_format == MediaFormat::Dash
    }

    fn create(&self, drm_info: &DrmInfo) -> Option<Box<dyn DrmHelper>> {
        self.is_drm(drm_info)
            .then(|| Box::new(PlayReadyHelper::new(drm_info.clone())) as Box<dyn DrmHelper>)
    }

    fn append_system_id(&self, system_ids: &mut Vec<String>) {
        system_ids.push(PLAYREADY_UUID.to_string());
    }

    fn weighting(&self) -> i32 {
        DEFAULT_WEIGHTING
    }
}
