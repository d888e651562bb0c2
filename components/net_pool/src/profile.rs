//! Transfer-handle configuration profile

use std::time::Duration;

use crate::store::NetPoolError;

/// Standard configuration applied to every transfer handle
///
/// Mirrors the knobs the player applies at handle creation: user-agent,
/// certificate verification, DNS cache lifetime, redirect following,
/// connect/total timeouts and an optional proxy.
#[derive(Debug, Clone)]
pub struct HandleProfile {
    /// User-agent header sent on every request
    pub user_agent: String,
    /// Verify the peer certificate chain
    pub ssl_verify_peer: bool,
    /// Lifetime of cached name resolutions / idle connections
    pub dns_cache_ttl: Duration,
    /// Follow HTTP redirects
    pub follow_redirects: bool,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Whole-transfer timeout
    pub total_timeout: Duration,
    /// Proxy URL, empty for direct
    pub proxy: Option<String>,
}

impl Default for HandleProfile {
    fn default() -> Self {
        Self {
            user_agent: "FluxPlayer/1.0".to_string(),
            ssl_verify_peer: true,
            dns_cache_ttl: Duration::from_secs(180),
            follow_redirects: true,
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(10),
            proxy: None,
        }
    }
}

impl HandleProfile {
    /// Build a client carrying this profile
    ///
    /// The client's idle-connection lifetime stands in for the DNS cache
    /// TTL; both bound how long per-host state is reused.
    pub fn build_client(&self) -> Result<reqwest::Client, NetPoolError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout)
            .timeout(self.total_timeout)
            .pool_idle_timeout(self.dns_cache_ttl);
        if !self.ssl_verify_peer {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder = if self.follow_redirects {
            builder.redirect(reqwest::redirect::Policy::limited(10))
        } else {
            builder.redirect(reqwest::redirect::Policy::none())
        };
        if let Some(proxy) = &self.proxy {
            if !proxy.is_empty() {
                builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            }
        }
        Ok(builder.build()?)
    }

    /// Same profile with a different proxy
    pub fn with_proxy(&self, proxy: Option<String>) -> Self {
        Self {
            proxy,
            ..self.clone()
        }
    }
}
