//! VCD Authentication
//!
//! Handles session login with user and password against the login
//! organization, or a pre-issued bearer token, and caches the access token.

use crate::config::{AuthType, ProviderConfig, DEFAULT_SYS_ORG};
use crate::error::VcdError;
use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

/// Header carrying the bearer token issued at login
pub const ACCESS_TOKEN_HEADER: &str = "x-vmware-vcloud-access-token";

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Session lifetime assumed when the backend does not say (30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Credentials holder with token caching
#[derive(Clone)]
pub struct VcdCredentials {
    auth_type: AuthType,
    user: String,
    password: String,
    login_org: String,
    static_token: String,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl VcdCredentials {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            auth_type: config.auth_type,
            user: config.user.clone(),
            password: config.password.clone(),
            login_org: config.login_org().to_string(),
            static_token: config.token.clone(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls, logging in when the cached one
    /// has expired.
    pub async fn get_token(&self, http: &Client, root: &Url, api_version: &str) -> Result<String> {
        if self.auth_type == AuthType::Token {
            return Ok(self.static_token.clone());
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, logging in again");
            }
        }

        let token = self.login(http, root, api_version).await?;
        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New session token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );
        Ok(token)
    }

    /// Drop the cached token so the next call logs in again.
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }

    fn session_path(&self) -> &'static str {
        if self.login_org.eq_ignore_ascii_case(DEFAULT_SYS_ORG) {
            "cloudapi/1.0.0/sessions/provider"
        } else {
            "cloudapi/1.0.0/sessions"
        }
    }

    async fn login(&self, http: &Client, root: &Url, api_version: &str) -> Result<String> {
        let url = root
            .join(self.session_path())
            .context("Failed to build login URL")?;
        tracing::debug!("POST {} (login as {}@{})", url, self.user, self.login_org);

        let response = http
            .post(url)
            .basic_auth(format!("{}@{}", self.user, self.login_org), Some(&self.password))
            .header(reqwest::header::ACCEPT, format!("application/json;version={}", api_version))
            .send()
            .await
            .context("Failed to send login request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(VcdError::Auth(format!("login returned {}", status)).into());
        }

        let token = response
            .headers()
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                VcdError::Auth(format!("login response lacks {}", ACCESS_TOKEN_HEADER))
            })?;
        Ok(token)
    }
}
