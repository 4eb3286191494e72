use chrono::{DateTime, Utc};
use rocket::Request;
use rocket::request::{FromRequest, Outcome};

use crate::auth::config::ExpiredSessionPolicy;
use crate::auth::cookies::{access_cookie_value, refresh_cookie_value, set_access_cookie};
use crate::auth::jwt::AccessTokenClaims;
use crate::auth::renewal::{RenewedSession, renew_session};
use crate::auth::{AuthError, AuthResult, AuthState, within_deadline};

/// Identity resolved by the authorization gate. Handlers that take this guard
/// never run for a request the gate rejected.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub session_id: String,
    pub renewed: bool,
}

impl AuthUser {
    fn from_claims(claims: &AccessTokenClaims) -> Self {
        Self {
            id: claims.user_id,
            username: claims.username.clone(),
            email: claims.email.clone(),
            session_id: claims.jti.clone(),
            renewed: false,
        }
    }

    fn from_renewal(renewed: &RenewedSession) -> Self {
        Self {
            id: renewed.identity.user_id,
            username: renewed.identity.username.clone(),
            email: renewed.identity.email.clone(),
            session_id: renewed.session_id().to_string(),
            renewed: true,
        }
    }
}

/// Request-local marker: the 401 catcher redirects to logout instead of
/// answering with JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectToLogout(pub bool);

/// Request-local marker read by the request logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenewedFor(pub Option<i64>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = request.rocket().state::<AuthState>() else {
            let err = AuthError::Config("AuthState missing from state".into());
            log::error!("{}", err);
            return Outcome::Error((err.status(), err));
        };

        match authorize(request, state, Utc::now()).await {
            Ok(user) => Outcome::Success(user),
            Err(err) => {
                if err.is_internal() {
                    log::error!("authorization aborted: {}", err);
                } else {
                    log::debug!("authorization rejected: {}", err);
                }
                Outcome::Error((err.status(), err))
            }
        }
    }
}

async fn authorize(
    request: &Request<'_>,
    state: &AuthState,
    now: DateTime<Utc>,
) -> AuthResult<AuthUser> {
    let config = &state.config;
    let cookies = request.cookies();

    let access_expired = match access_cookie_value(cookies, config) {
        Some(token) => match state.jwt_service.decode_access_token_at(&token, now) {
            Ok(claims) => return Ok(AuthUser::from_claims(&claims)),
            Err(AuthError::AccessTokenExpired) => true,
            // Forged or garbled tokens never get a renewal attempt.
            Err(err) => return Err(err),
        },
        None => false,
    };

    let refresh_token = refresh_cookie_value(cookies, config);
    let renewal = within_deadline(
        config.storage_timeout(),
        renew_session(state, refresh_token.as_deref(), now),
    )
    .await;

    match renewal {
        Ok(renewed) => {
            set_access_cookie(cookies, config, &renewed.access_token);
            request.local_cache(|| RenewedFor(Some(renewed.identity.user_id)));
            Ok(AuthUser::from_renewal(&renewed))
        }
        Err(err) => {
            if access_expired
                && !err.is_internal()
                && config.expired_session_policy == ExpiredSessionPolicy::RedirectToLogout
            {
                request.local_cache(|| RedirectToLogout(true));
            }
            Err(err)
        }
    }
}
