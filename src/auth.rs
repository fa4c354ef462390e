//! Google authorization material.
//!
//! The interactive consent flow lives outside this crate; it leaves behind a
//! client-secrets file and a cached token. [`OAuthTokenCache`] reads both,
//! hands out the access token, and refreshes it with the stored refresh token
//! once it is close to expiry, writing the new token back in place.

use crate::config::AuthConfig;
use crate::error::NotifyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Scope required to read rows and write the tracking column.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_MS: i64 = 60_000;

/// Supplies bearer tokens for the Sheets API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Return a currently valid access token.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Auth` if no valid token can be produced.
    async fn access_token(&self) -> crate::Result<String>;
}

/// A fixed token, e.g. from `auth.access_token` or a test.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&redact(&self.0)).finish()
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> crate::Result<String> {
        if self.0.trim().is_empty() {
            return Err(NotifyError::Auth("static access token is empty".to_owned()));
        }
        Ok(self.0.clone())
    }
}

/// OAuth client identity from the downloaded `credentials.json`.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a credentials file holding either an `installed` or `web` block.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Auth` if the file is unreadable or has neither block.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            NotifyError::Auth(format!("cannot read credentials {}: {e}", path.display()))
        })?;
        let file: CredentialsFile = serde_json::from_slice(&bytes).map_err(|e| {
            NotifyError::Auth(format!("cannot parse credentials {}: {e}", path.display()))
        })?;
        file.installed.or(file.web).ok_or_else(|| {
            NotifyError::Auth(format!(
                "credentials {} has neither an `installed` nor a `web` client",
                path.display()
            ))
        })
    }
}

/// Token as cached by the consent flow (`token.json`).
///
/// Unknown fields are carried through so a rewrite does not drop them.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry as epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &redact(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .field("expiry_date", &self.expiry_date)
            .finish()
    }
}

impl CachedToken {
    /// Whether the token should be refreshed before use at `now_ms`.
    #[must_use]
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expiry_date
            .is_some_and(|expiry| expiry - EXPIRY_SKEW_MS <= now_ms)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// File-backed token cache with refresh-token renewal.
pub struct OAuthTokenCache {
    client: reqwest::Client,
    secrets: ClientSecrets,
    token_path: PathBuf,
    token: Mutex<CachedToken>,
}

impl OAuthTokenCache {
    /// Load client secrets and the cached token named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Auth` if either file is missing or malformed.
    pub fn load(config: &AuthConfig) -> crate::Result<Self> {
        let secrets = ClientSecrets::from_file(&config.credentials_path)?;
        let bytes = std::fs::read(&config.token_cache_path).map_err(|e| {
            NotifyError::Auth(format!(
                "no cached token at {} ({e}); complete the authorization flow to create it",
                config.token_cache_path.display()
            ))
        })?;
        let token: CachedToken = serde_json::from_slice(&bytes).map_err(|e| {
            NotifyError::Auth(format!(
                "cannot parse token cache {}: {e}",
                config.token_cache_path.display()
            ))
        })?;
        Ok(Self::new(secrets, token, config.token_cache_path.clone()))
    }

    pub fn new(secrets: ClientSecrets, token: CachedToken, token_path: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            secrets,
            token_path,
            token: Mutex::new(token),
        }
    }

    async fn refresh(&self, token: &mut CachedToken) -> crate::Result<()> {
        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(NotifyError::Auth(
                "access token expired and no refresh token is cached".to_owned(),
            ));
        };

        tracing::debug!("refreshing Google access token");
        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| NotifyError::Auth(format!("token refresh request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Auth(format!(
                "token refresh rejected ({status}): {body}"
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Auth(format!("cannot parse refresh response: {e}")))?;

        token.access_token = refreshed.access_token;
        token.expiry_date = refreshed
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp_millis() + secs * 1000);
        if refreshed.scope.is_some() {
            token.scope = refreshed.scope;
        }
        if refreshed.token_type.is_some() {
            token.token_type = refreshed.token_type;
        }
        if refreshed.refresh_token.is_some() {
            token.refresh_token = refreshed.refresh_token;
        }

        if let Err(e) = save_token(&self.token_path, token) {
            tracing::warn!("refreshed token not persisted: {e}");
        }
        Ok(())
    }
}

#[async_trait]
impl AccessTokenSource for OAuthTokenCache {
    async fn access_token(&self) -> crate::Result<String> {
        let mut token = self.token.lock().await;
        if token.needs_refresh(chrono::Utc::now().timestamp_millis()) {
            self.refresh(&mut token).await?;
        }
        Ok(token.access_token.clone())
    }
}

fn save_token(path: &Path, token: &CachedToken) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string(token)
        .map_err(|e| NotifyError::Auth(format!("cannot serialize token: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}
