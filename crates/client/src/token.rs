//! Access tokens for the card API.
//!
//! Every card call needs an app access token. [`OAuthTokenProvider`] fetches
//! one with the app credentials and caches it until it is close to expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cardwire_core::error::AuthError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Refresh once fewer than this many seconds remain.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
/// Upper bound on a server-reported token lifetime.
const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently valid access token.
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed token. Useful in tests and for tokens managed elsewhere.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

#[derive(Default)]
struct CachedToken {
    token: Option<String>,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn valid_token(&self) -> Option<&str> {
        let remaining = self
            .expires_at?
            .checked_duration_since(Instant::now())
            .unwrap_or_default();
        if remaining > REFRESH_MARGIN {
            self.token.as_deref()
        } else {
            None
        }
    }
}

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TOKEN_TTL)).unwrap_or(now)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    app_key: &'a str,
    app_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expire_in: Option<u64>,
}

/// Exchanges app credentials for an access token via
/// `POST /v1.0/oauth2/accessToken`.
///
/// The token is cached behind a mutex, so concurrent callers that find it
/// stale wait for a single refresh. A failed refresh is returned as an error;
/// the old token is never handed out once it is inside the refresh margin.
pub struct OAuthTokenProvider {
    base_url: String,
    app_key: String,
    app_secret: String,
    client: reqwest::Client,
    cache: Mutex<CachedToken>,
}

impl OAuthTokenProvider {
    pub fn new(
        base_url: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            client,
            cache: Mutex::new(CachedToken::default()),
        }
    }

    /// Build from configuration. Fails when either credential is missing.
    pub fn from_config(
        config: &cardwire_config::AppConfig,
        client: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let app_key = config
            .credentials
            .client_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::NotConfigured("credentials.client_id".into()))?;
        let app_secret = config
            .credentials
            .client_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::NotConfigured("credentials.client_secret".into()))?;
        Ok(Self::new(&config.api.base_url, app_key, app_secret, client))
    }

    async fn fetch(&self) -> Result<(String, Duration), AuthError> {
        let url = format!("{}/v1.0/oauth2/accessToken", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&TokenRequest {
                app_key: &self.app_key,
                app_secret: &self.app_secret,
            })
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Token endpoint returned error");
            return Err(AuthError::RequestFailed(format!("status {status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("missing accessToken".into()))?;
        let expire_in = parsed.expire_in.unwrap_or(7200);
        Ok((token, Duration::from_secs(expire_in)))
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.valid_token() {
            return Ok(token.to_string());
        }

        let (token, ttl) = self.fetch().await?;
        cache.token = Some(token.clone());
        cache.expires_at = Some(expiry_after(Instant::now(), ttl));
        debug!(expires_in_secs = ttl.as_secs(), "Access token refreshed");
        Ok(token)
    }
}
