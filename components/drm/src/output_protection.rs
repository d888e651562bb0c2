//! Display link capabilities and output-protection checks

use parking_lot::Mutex;
use tracing::warn;

/// CDM error code for a restricted output path
pub const HDCP_OUTPUT_PROTECTION_FAILURE: i32 = 4327;
/// CDM error code for a failed UHD compliance check
pub const HDCP_COMPLIANCE_CHECK_FAILURE: i32 = 4328;

const UHD_WIDTH: u32 = 3840;
const UHD_HEIGHT: u32 = 2160;

#[derive(Debug, Clone)]
struct LinkState {
    source_width: u32,
    source_height: u32,
    hdcp22_active: bool,
}

/// Snapshot of the display link consulted before every decrypt
///
/// The platform updates the link state on HDMI hotplug; tests drive it
/// directly.
#[derive(Debug)]
pub struct OutputProtection {
    state: Mutex<LinkState>,
}

impl Default for OutputProtection {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputProtection {
    /// Link with HDCP 2.2 active and no source attached yet
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LinkState {
                source_width: 0,
                source_height: 0,
                hdcp22_active: true,
            }),
        }
    }

    /// Record the source resolution of the current content
    pub fn set_source_resolution(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.source_width = width;
        state.source_height = height;
    }

    /// Record whether the link negotiated HDCP 2.2
    pub fn set_hdcp22_active(&self, active: bool) {
        self.state.lock().hdcp22_active = active;
    }

    /// Whether the current source is UHD
    pub fn is_source_uhd(&self) -> bool {
        let state = self.state.lock();
        state.source_width >= UHD_WIDTH || state.source_height >= UHD_HEIGHT
    }

    /// Pre-decrypt check: 0 when allowed, HDCP error code otherwise
    ///
    /// A helper demanding HDCP 2.2 with a UHD source and a link that did
    /// not negotiate HDCP 2.2 fails immediately, without touching the CDM.
    pub fn check_decrypt_allowed(&self, hdcp22_required: bool) -> i32 {
        if !hdcp22_required {
            return 0;
        }
        let state = self.state.lock();
        let uhd = state.source_width >= UHD_WIDTH || state.source_height >= UHD_HEIGHT;
        if uhd && !state.hdcp22_active {
            warn!("UHD source without HDCP 2.2, decrypt refused");
            return HDCP_COMPLIANCE_CHECK_FAILURE;
        }
        0
    }
}
