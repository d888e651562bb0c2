//! Logging facility and structured triage records
//!
//! Components log through `tracing`; this module owns subscriber setup and
//! the structured record emitted at the end of every license/token transfer
//! so field triage can grep one line per request.

use std::sync::Once;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::MediaType;

static INIT: Once = Once::new();

/// Install the global tracing subscriber
///
/// Level selection follows `FLUXPLAYER_LOG` (falling back to `RUST_LOG`,
/// then `info`). Safe to call more than once; only the first call wins.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("FLUXPLAYER_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

/// End-of-transfer triage record for license and token requests
///
/// One record is emitted per HTTP attempt, successful or not.
#[derive(Debug, Clone)]
pub struct HttpRequestEnd {
    /// Application name when provided by the embedding app
    pub app_name: Option<String>,
    /// Transfer classification
    pub media_type: MediaType,
    /// HTTP status, or the mapped transport code when no response arrived
    pub response_code: i64,
    /// 1-based attempt number
    pub attempt: u32,
    /// Wall time spent on this attempt in milliseconds
    pub duration_ms: u64,
    /// Bytes received
    pub download_size: usize,
    /// Request URL (truncated by the caller if oversized)
    pub url: String,
}

impl HttpRequestEnd {
    /// Emit the record as a single structured warning line
    pub fn emit(&self) {
        warn!(
            app = self.app_name.as_deref().unwrap_or(""),
            media_type = ?self.media_type,
            code = self.response_code,
            attempt = self.attempt,
            duration_ms = self.duration_ms,
            size = self.download_size,
            url = %self.url,
            "HttpRequestEnd"
        );
    }
}
