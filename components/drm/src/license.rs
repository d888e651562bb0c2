//! License transport over the pooled transfer store
//!
//! One gateway call is one HTTP attempt; the session manager owns the
//! retry and token-refresh policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fluxplayer_net_pool::{AbortFlag, TransferStore};
use fluxplayer_shared_types::{HttpRequestEnd, MediaType};
use fluxplayer_shared_types::TransferInstance;
use tracing::{info, warn};

use crate::types::{LicenseMethod, LicenseRequest};

/// Transport code for a whole-transfer timeout
pub const TRANSPORT_TIMEOUT: i64 = 28;
/// Transport code for a connect failure
pub const TRANSPORT_CONNECT_FAILED: i64 = 7;
/// Transport code for a cooperative abort
pub const TRANSPORT_ABORTED: i64 = 42;

/// Outcome of one license-server attempt
///
/// Plain HTTP carries no extended status; that detail only exists on the
/// structured security-manager path (`SecManagerError`).
#[derive(Debug, Clone, Default)]
pub struct LicenseReply {
    /// HTTP status, or a transport code (< 100) when no response arrived
    pub http_code: i64,
    /// Response body
    pub body: Vec<u8>,
}

impl LicenseReply {
    /// Whether the reply carries a usable license payload
    pub fn is_success(&self) -> bool {
        (self.http_code == 200 || self.http_code == 206) && !self.body.is_empty()
    }

    /// Whether this outcome is in the retry set (5xx or transport 28/7)
    pub fn is_retryable(&self) -> bool {
        (500..600).contains(&self.http_code)
            || self.http_code == TRANSPORT_TIMEOUT
            || self.http_code == TRANSPORT_CONNECT_FAILED
    }
}

/// One-attempt license transport
#[async_trait::async_trait]
pub trait LicenseGateway: Send + Sync {
    /// Perform the shaped request once, optionally through a proxy
    async fn fetch(
        &self,
        request: &LicenseRequest,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> LicenseReply;
}

/// Production gateway: pooled handles, cooperative abort, triage records
pub struct HttpLicenseGateway {
    store: Arc<TransferStore>,
    abort: AbortFlag,
    app_name: Option<String>,
}

impl HttpLicenseGateway {
    /// Gateway drawing handles from `store` and honouring `abort`
    pub fn new(store: Arc<TransferStore>, abort: AbortFlag) -> Self {
        Self {
            store,
            abort,
            app_name: None,
        }
    }

    /// Tag triage records with the embedding application's name
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait::async_trait]
impl LicenseGateway for HttpLicenseGateway {
    async fn fetch(
        &self,
        request: &LicenseRequest,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> LicenseReply {
        let started = Instant::now();
        let mut reply = LicenseReply::default();

        // A proxied transfer cannot share a pooled handle
        let drawn = match proxy {
            Some(proxy) if !proxy.is_empty() => {
                self.store.build_handle(Some(proxy.to_string()))
            }
            _ => self.store.get_handle(&request.url, TransferInstance::Aes),
        };
        let handle = match drawn {
            Ok(handle) => handle,
            Err(err) => {
                warn!(%err, url = %request.url, "could not build license transfer handle");
                reply.http_code = TRANSPORT_CONNECT_FAILED;
                return reply;
            }
        };

        let client = handle.client().clone();
        let mut builder = match request.method {
            LicenseMethod::Get => client.get(&request.url),
            LicenseMethod::Post => client.post(&request.url).body(request.payload.clone()),
            LicenseMethod::DrmRetrieve => {
                // Nothing to fetch, the DRM acquires the license itself
                self.store.save_handle(handle);
                return reply;
            }
        };
        builder = builder.timeout(timeout);
        for (name, values) in &request.headers {
            for value in values {
                builder = builder.header(name, value);
            }
        }

        info!(url = %request.url, "sending license request to server");
        let outcome = tokio::select! {
            result = builder.send() => Some(result),
            _ = watch_abort(&self.abort) => None,
        };

        match outcome {
            None => {
                warn!("aborting license transfer");
                reply.http_code = TRANSPORT_ABORTED;
            }
            Some(Err(err)) => {
                reply.http_code = classify_transport_error(&err);
                warn!(%err, code = reply.http_code, "license request failed");
            }
            Some(Ok(response)) => {
                reply.http_code = i64::from(response.status().as_u16());
                match response.bytes().await {
                    Ok(bytes) => reply.body = bytes.to_vec(),
                    Err(err) => {
                        warn!(%err, "license response body read failed");
                        reply.http_code = classify_transport_error(&err);
                    }
                }
            }
        }

        self.store.save_handle(handle);
        HttpRequestEnd {
            app_name: self.app_name.clone(),
            media_type: MediaType::License,
            response_code: reply.http_code,
            attempt: 1,
            duration_ms: started.elapsed().as_millis() as u64,
            download_size: reply.body.len(),
            url: request.url.chars().take(500).collect(),
        }
        .emit();
        reply
    }
}

fn classify_transport_error(err: &reqwest::Error) -> i64 {
    if err.is_timeout() {
        TRANSPORT_TIMEOUT
    } else if err.is_connect() {
        TRANSPORT_CONNECT_FAILED
    } else {
        -1
    }
}

/// Resolve once the abort flag is armed; polls at progress-callback cadence
async fn watch_abort(abort: &AbortFlag) {
    loop {
        if abort.consume() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
