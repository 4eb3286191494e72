use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::auth::{AuthConfig, AuthError, AuthResult};

/// The identity fields an access token asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccessTokenClaims {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub claims: AccessTokenClaims,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        // Expiry is checked by hand so that `exp == now` counts as expired
        // and so an expired token can be told apart from a forged one.
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
        })
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub fn issue_access_token(
        &self,
        identity: &UserIdentity,
        session_id: &str,
    ) -> AuthResult<SignedAccessToken> {
        self.issue_access_token_at(identity, session_id, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        identity: &UserIdentity,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<SignedAccessToken> {
        let expires_at = now + self.access_token_ttl;

        let claims = AccessTokenClaims {
            user_id: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: session_id.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)?;

        Ok(SignedAccessToken {
            token,
            claims,
            expires_at,
        })
    }

    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.decode_access_token_at(token, Utc::now())
    }

    /// Verifies signature and shape first; only a genuine token can come back
    /// as `AccessTokenExpired`.
    pub fn decode_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<AccessTokenClaims> {
        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| {
                log::debug!("rejecting access token: {}", err);
                AuthError::Malformed
            })?;

        let claims = token_data.claims;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::AccessTokenExpired);
        }
        Ok(claims)
    }
}
