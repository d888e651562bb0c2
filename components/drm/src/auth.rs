//! Access-token acquisition from the local auth service

use std::time::Duration;

use fluxplayer_shared_types::AuthTokenError;
use serde::Deserialize;
use tracing::{info, warn};

/// Source of session tokens for license requests
#[async_trait::async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// Fetch a fresh token; callers handle caching
    async fn fetch_token(&self) -> Result<String, AuthTokenError>;
}

#[derive(Deserialize)]
struct TokenReply {
    token: Option<String>,
    status: Option<i64>,
}

/// Token provider talking to the device auth service
///
/// Expected reply: `{"token":"…","status":0}`; a non-zero status or a
/// missing token are distinct failures.
pub struct HttpAuthTokenProvider {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAuthTokenProvider {
    /// Provider against `url` with the given per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl AuthTokenProvider for HttpAuthTokenProvider {
    async fn fetch_token(&self) -> Result<String, AuthTokenError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                warn!(%err, "session token request failed");
                AuthTokenError::RequestFailed(0)
            })?;

        let status = response.status();
        if !(status == reqwest::StatusCode::OK || status == reqwest::StatusCode::PARTIAL_CONTENT) {
            warn!(code = status.as_u16(), "session token call failed");
            return Err(AuthTokenError::RequestFailed(status.as_u16()));
        }

        let reply: TokenReply = response
            .json()
            .await
            .map_err(|_| AuthTokenError::TokenParseError)?;
        if reply.status != Some(0) {
            warn!(status = ?reply.status, "missing or invalid status in token reply");
            return Err(AuthTokenError::InvalidStatusCode);
        }
        match reply.token {
            Some(token) if !token.is_empty() => {
                info!("received session token from auth service");
                Ok(token)
            }
            _ => {
                warn!("could not get access token from session token reply");
                Err(AuthTokenError::TokenParseError)
            }
        }
    }
}
