use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::auth::{AuthError, AuthResult};

/// Required length of the HMAC signing secret, in characters.
pub const JWT_SECRET_LEN: usize = 512;

/// What the gate does when an access token was presented, had expired, and
/// the refresh token could not renew it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiredSessionPolicy {
    Reject,
    RedirectToLogout,
}

impl FromStr for ExpiredSessionPolicy {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ExpiredSessionPolicy::Reject),
            "redirect" => Ok(ExpiredSessionPolicy::RedirectToLogout),
            other => Err(AuthError::Config(format!(
                "unknown expired session policy '{other}'"
            ))),
        }
    }
}

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub cookie_secure: bool,
    pub expired_session_policy: ExpiredSessionPolicy,
    pub storage_timeout_ms: u64,
    pub jwt_secret: String,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer = std::env::var("SVEGO_JWT_ISSUER").unwrap_or_else(|_| "svego-api".into());
        let access_token_ttl_secs = std::env::var("SVEGO_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(60 * 60);
        let refresh_token_ttl_secs = std::env::var("SVEGO_REFRESH_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30 * 24 * 60 * 60);
        let access_cookie_name =
            std::env::var("SVEGO_ACCESS_COOKIE_NAME").unwrap_or_else(|_| "token".into());
        let refresh_cookie_name =
            std::env::var("SVEGO_REFRESH_COOKIE_NAME").unwrap_or_else(|_| "refreshToken".into());
        let cookie_secure = std::env::var("SVEGO_COOKIE_SECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(true);
        let expired_session_policy = match std::env::var("SVEGO_EXPIRED_SESSION_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => ExpiredSessionPolicy::Reject,
        };
        let storage_timeout_ms = std::env::var("SVEGO_STORAGE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5_000);
        let jwt_secret = std::env::var("SVEGO_JWT_SECRET")
            .map_err(|_| AuthError::Config("SVEGO_JWT_SECRET is required".into()))?;

        let config = Self {
            issuer,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            access_cookie_name,
            refresh_cookie_name,
            cookie_secure,
            expired_session_policy,
            storage_timeout_ms,
            jwt_secret,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the service refuses to start without.
    pub fn validate(&self) -> AuthResult<()> {
        let secret_len = self.jwt_secret.chars().count();
        if secret_len != JWT_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "signing secret must be exactly {JWT_SECRET_LEN} characters, got {secret_len}"
            )));
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }
        if self.access_cookie_name == self.refresh_cookie_name {
            return Err(AuthError::Config(
                "access and refresh cookies need distinct names".into(),
            ));
        }
        Ok(())
    }

    pub fn storage_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.storage_timeout_ms)
    }
}
