//! Exchanges a refresh credential for a fresh access token.

use chrono::{DateTime, Utc};

use crate::auth::jwt::{SignedAccessToken, UserIdentity};
use crate::auth::{AuthError, AuthResult, AuthState};

#[derive(Debug, Clone)]
pub struct RenewedSession {
    pub identity: UserIdentity,
    pub access_token: SignedAccessToken,
}

impl RenewedSession {
    pub fn session_id(&self) -> &str {
        &self.access_token.claims.jti
    }
}

/// Runs the renewal state machine for one request. Every error is terminal
/// for that request; nothing here ever yields a partial identity.
pub async fn renew_session(
    state: &AuthState,
    refresh_token: Option<&str>,
    now: DateTime<Utc>,
) -> AuthResult<RenewedSession> {
    let refresh_token = refresh_token
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthenticated)?;

    let record = state
        .refresh_store
        .lookup(refresh_token)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    if !record.active {
        log::info!("refusing revoked session {}", record.jwt_id);
        return Err(AuthError::SessionRevoked);
    }

    if record.is_expired_at(now) {
        match state.refresh_store.deactivate(refresh_token, now).await {
            Ok(_) => log::info!("session {} expired and was deactivated", record.jwt_id),
            Err(err) => log::error!(
                "failed to deactivate expired session {}: {}",
                record.jwt_id,
                err
            ),
        }
        return Err(AuthError::SessionExpired);
    }

    let user = match state.users.find_by_id(record.user_id).await? {
        Some(user) if user.active => user,
        Some(_) => {
            log::info!(
                "session {} belongs to disabled user {}",
                record.jwt_id,
                record.user_id
            );
            return Err(AuthError::SessionRevoked);
        }
        None => return Err(AuthError::SessionRevoked),
    };

    let identity = user.identity();
    let access_token = state
        .jwt_service
        .issue_access_token_at(&identity, &record.jwt_id, now)?;

    log::info!(
        "renewed access token for user {} in session {}",
        identity.user_id,
        record.jwt_id
    );

    Ok(RenewedSession {
        identity,
        access_token,
    })
}
