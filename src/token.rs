use crate::error::{FlairError, Result};
use crate::rest::ApiContext;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Path of the OAuth2 token endpoint
pub const TOKEN_PATH: &str = "/oauth/token";

/// OAuth2 client credentials identifying the session
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Client ID issued by Flair
    pub client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create a new credential pair
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The client secret
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Token represents an OAuth2 bearer token obtained through the
/// client-credentials grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Access token for API requests
    #[serde(rename = "access_token")]
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(rename = "token_type", default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds, counted from `obtained_at`
    #[serde(rename = "expires_in", default)]
    pub expires_in: Option<i64>,

    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// When the token was received; absent in server responses
    #[serde(default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Create a new Token obtained now
    pub fn new(access_token: String, expires_in: Option<i64>) -> Self {
        Token {
            access_token,
            token_type: default_token_type(),
            expires_in,
            scope: None,
            obtained_at: Utc::now(),
        }
    }

    /// Instant after which the server no longer accepts the token.
    /// `None` means the lifetime is unknown and the token is kept until invalidated.
    /// A lifetime too long to represent is treated the same way.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = TimeDelta::try_seconds(self.expires_in?.max(0))?;
        self.obtained_at.checked_add_signed(lifetime)
    }

    /// Check whether the token is expired, or will be within `margin`, at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at() else {
            return false;
        };
        TimeDelta::from_std(margin)
            .ok()
            .and_then(|margin| now.checked_add_signed(margin))
            .map_or(true, |deadline| deadline >= expires_at)
    }

    /// Check whether the token is expired, or will be within `margin`
    pub fn is_expired(&self, margin: Duration) -> bool {
        self.is_expired_at(Utc::now(), margin)
    }
}

/// Parse a token endpoint response body
fn parse_token_response(body: &[u8]) -> Result<Token> {
    let auth_error = |reason: String| FlairError::Auth { status: None, reason };

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| auth_error(format!("token response is not JSON: {}", e)))?;

    match value.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => {}
        _ => return Err(auth_error("token response has no access_token".to_string())),
    }

    serde_json::from_value(value)
        .map_err(|e| auth_error(format!("malformed token response: {}", e)))
}

/// TokenProvider exchanges client credentials for bearer tokens and caches the
/// most recent one for the session.
pub struct TokenProvider {
    ctx: Arc<ApiContext>,
    credentials: Option<Credentials>,
    cache: Mutex<Option<Token>>,
}

impl TokenProvider {
    /// Create a provider that acquires tokens with the given credentials
    pub fn new(ctx: Arc<ApiContext>, credentials: Credentials) -> Self {
        TokenProvider {
            ctx,
            credentials: Some(credentials),
            cache: Mutex::new(None),
        }
    }

    /// Create a provider around a pre-obtained token. Without credentials the
    /// session ends once the token expires.
    pub fn from_token(ctx: Arc<ApiContext>, token: Token) -> Self {
        TokenProvider {
            ctx,
            credentials: None,
            cache: Mutex::new(Some(token)),
        }
    }

    /// The credentials, if the provider was built with any
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Exchange the credentials for a fresh token. Always performs exactly one
    /// request; on success the new token also replaces the cached one.
    #[instrument(skip(self))]
    pub fn acquire(&self) -> Result<Token> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let token = self.exchange()?;
        *cache = Some(token.clone());
        Ok(token)
    }

    /// Return a token valid for at least the configured margin, acquiring a new
    /// one only when none is cached or the cached one is expiring.
    pub fn bearer(&self) -> Result<Token> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(token) = cache.as_ref() {
            if !token.is_expired(self.ctx.config.token_expiry_margin) {
                return Ok(token.clone());
            }
            debug!("cached token expired, acquiring a new one");
        }

        let token = self.exchange()?;
        *cache = Some(token.clone());
        Ok(token)
    }

    /// The currently cached token, expired or not
    pub fn cached(&self) -> Option<Token> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drop the cached token; the next `bearer` call acquires a new one
    pub fn invalidate(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Drop the cached token if the server answered a request made with it
    /// with 401 Unauthorized
    pub fn invalidate_on_unauthorized(&self, token: &Token, error: &FlairError) {
        if !matches!(error, FlairError::Http { status: 401, .. }) {
            return;
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.as_ref().is_some_and(|cached| cached.access_token == token.access_token) {
            warn!("server rejected the bearer token, dropping it");
            cache.take();
        }
    }

    fn exchange(&self) -> Result<Token> {
        let credentials = self.credentials.as_ref().ok_or_else(|| FlairError::Auth {
            status: None,
            reason: "token expired and no client credentials are configured".to_string(),
        })?;

        let request = self.ctx.request(Method::POST, TOKEN_PATH)?.query(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret()),
            ("grant_type", "client_credentials"),
        ]);

        let response = self.ctx.send(request)?;
        if !response.status.is_success() {
            return Err(FlairError::Auth {
                status: Some(response.status.as_u16()),
                reason: response.text(),
            });
        }

        let token = parse_token_response(&response.body)?;
        debug!(expires_in = ?token.expires_in, "acquired access token");
        Ok(token)
    }
}
