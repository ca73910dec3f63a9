//! Identity provider exchange.
//!
//! Flow Overview: read the session cookies, ask the hosted auth API who the
//! caller is, and refresh the session when the access token has expired. The
//! result is the caller's identity (if any) plus the cookie updates that must
//! travel back to the browser.

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::cookies::{CookieJar, CookieOptions, CookieUpdate};

const DEFAULT_COOKIE_PREFIX: &str = "atal";
const DEFAULT_SESSION_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Authenticated principal as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Result of a cookie exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exchange {
    pub identity: Option<Identity>,
    pub updates: Vec<CookieUpdate>,
}

impl Exchange {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            updates: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to build identity provider client")]
    Client(#[source] reqwest::Error),
    #[error("identity provider request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("identity provider returned {status} for {endpoint}")]
    Status { endpoint: String, status: StatusCode },
    #[error("invalid identity provider response from {endpoint}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Exchanges the caller's cookies for an identity and cookie updates.
///
/// Implementations must not treat their own failures as "no identity"; a
/// failed exchange is returned as an error.
pub trait IdentityProvider: Send + Sync + 'static {
    fn exchange(
        &self,
        cookies: &CookieJar,
    ) -> impl Future<Output = Result<Exchange, ProviderError>> + Send;
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    base_url: String,
    api_key: SecretString,
    cookie_prefix: String,
    cookie_secure: bool,
    session_max_age_seconds: i64,
    timeout: Duration,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(base_url: &str, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
            cookie_secure: false,
            session_max_age_seconds: DEFAULT_SESSION_MAX_AGE_SECONDS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_cookie_prefix(mut self, prefix: String) -> Self {
        self.cookie_prefix = prefix;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_session_max_age_seconds(mut self, seconds: i64) -> Self {
        self.session_max_age_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn access_cookie_name(&self) -> String {
        format!("{}-access-token", self.cookie_prefix)
    }

    #[must_use]
    pub fn refresh_cookie_name(&self) -> String {
        format!("{}-refresh-token", self.cookie_prefix)
    }

    fn cookie_options(&self) -> CookieOptions {
        CookieOptions::session(self.cookie_secure)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: Identity,
}

/// Client for a hosted GoTrue-style auth API.
#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Client)?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// `Ok(None)` when the provider rejects the access token.
    #[instrument(skip_all)]
    async fn fetch_user(&self, access_token: &str) -> Result<Option<Identity>, ProviderError> {
        let endpoint = self.endpoint("/auth/v1/user");

        let response = self
            .client
            .get(&endpoint)
            .header("apikey", self.config.api_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => {
                let identity = response
                    .json::<Identity>()
                    .await
                    .map_err(|source| ProviderError::Decode { endpoint, source })?;
                Ok(Some(identity))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("access token rejected");
                Ok(None)
            }
            status => Err(ProviderError::Status { endpoint, status }),
        }
    }

    /// `Ok(None)` when the refresh token is no longer valid.
    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenResponse>, ProviderError> {
        let endpoint = self.endpoint("/auth/v1/token?grant_type=refresh_token");

        let response = self
            .client
            .post(&endpoint)
            .header("apikey", self.config.api_key.expose_secret())
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => {
                let tokens = response
                    .json::<TokenResponse>()
                    .await
                    .map_err(|source| ProviderError::Decode { endpoint, source })?;
                Ok(Some(tokens))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                debug!("refresh token rejected");
                Ok(None)
            }
            status => Err(ProviderError::Status { endpoint, status }),
        }
    }

    fn session_updates(&self, tokens: &TokenResponse) -> Vec<CookieUpdate> {
        let options = self.config.cookie_options();
        let access_ttl = tokens
            .expires_in
            .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECONDS);
        vec![
            CookieUpdate::new(
                self.config.access_cookie_name(),
                tokens.access_token.as_str(),
                options.clone().with_max_age(access_ttl),
            ),
            CookieUpdate::new(
                self.config.refresh_cookie_name(),
                tokens.refresh_token.as_str(),
                options.with_max_age(self.config.session_max_age_seconds),
            ),
        ]
    }

    /// Expire whichever session cookies the caller still holds.
    fn clear_session(&self, cookies: &CookieJar) -> Vec<CookieUpdate> {
        [
            self.config.access_cookie_name(),
            self.config.refresh_cookie_name(),
        ]
        .into_iter()
        .filter(|name| cookies.contains(name))
        .map(|name| CookieUpdate::expire(name, self.config.cookie_options()))
        .collect()
    }
}

impl IdentityProvider for HttpIdentityProvider {
    async fn exchange(&self, cookies: &CookieJar) -> Result<Exchange, ProviderError> {
        let access_name = self.config.access_cookie_name();
        let refresh_name = self.config.refresh_cookie_name();
        let access_token = cookies.get(&access_name).filter(|t| !t.is_empty());
        let refresh_token = cookies.get(&refresh_name).filter(|t| !t.is_empty());

        if access_token.is_none() && refresh_token.is_none() {
            return Ok(Exchange {
                identity: None,
                updates: self.clear_session(cookies),
            });
        }

        if let Some(token) = access_token {
            if let Some(identity) = self.fetch_user(token).await? {
                return Ok(Exchange::authenticated(identity));
            }
        }

        let Some(token) = refresh_token else {
            return Ok(Exchange {
                identity: None,
                updates: self.clear_session(cookies),
            });
        };

        match self.refresh(token).await? {
            Some(tokens) => {
                debug!("session refreshed");
                Ok(Exchange {
                    updates: self.session_updates(&tokens),
                    identity: Some(tokens.user),
                })
            }
            None => {
                warn!("session expired, clearing cookies");
                Ok(Exchange {
                    identity: None,
                    updates: self.clear_session(cookies),
                })
            }
        }
    }
}
