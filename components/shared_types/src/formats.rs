//! Stream and transfer classification enums
//!
//! This module provides the format vocabulary shared between the DRM core,
//! the transfer store and the event manager.

use serde::{Deserialize, Serialize};

/// Container/transport format of the media being played
///
/// # Examples
///
/// ```
/// use fluxplayer_shared_types::MediaFormat;
///
/// let format = MediaFormat::Dash;
/// assert!(format.is_fragmented_mp4());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MediaFormat {
    /// HLS with transport-stream segments
    Hls,
    /// MPEG-DASH
    Dash,
    /// HLS with fragmented-MP4 segments
    HlsMp4,
    /// Progressive download
    Progressive,
    /// Unknown or not yet probed
    #[default]
    Unknown,
}

impl MediaFormat {
    /// True when segments are ISO-BMFF fragments (DASH or fMP4 HLS)
    pub fn is_fragmented_mp4(&self) -> bool {
        matches!(self, MediaFormat::Dash | MediaFormat::HlsMp4)
    }
}

/// Segment encryption method signalled by the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DrmMethod {
    /// Clear content
    #[default]
    None,
    /// AES-128 CBC with PKCS7 padding
    Aes128,
}

/// Track kind a download or decrypt operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// Main/variant manifest
    Manifest,
    /// Video segments
    Video,
    /// Audio segments
    Audio,
    /// Subtitle segments
    Subtitle,
    /// License / key material
    License,
    /// Other downloads
    Default,
}

/// Transfer-handle instance kind inside the connection store
///
/// Slot `i` of a host bucket maps to instance `i`; slots `i + MAX` serve a
/// concurrent background user of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum TransferInstance {
    /// Manifest and playlist downloads
    Manifest = 0,
    /// Video segment downloads
    Video = 1,
    /// Audio segment downloads
    Audio = 2,
    /// Subtitle downloads
    Subtitle = 3,
    /// AES key downloads
    Aes = 4,
    /// Dynamic ad-insertion downloads
    Dai = 5,
}

impl TransferInstance {
    /// Number of distinct instance kinds
    pub const COUNT: usize = 6;

    /// Index of this instance inside a bucket's slot array
    pub fn index(&self) -> usize {
        *self as usize
    }
}
