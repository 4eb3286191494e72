use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use rocket::form::{self, Errors, Form};
use rocket::http::CookieJar;
use rocket::response::{Redirect, status};
use rocket::serde::json::Json;
use rocket::{FromForm, Responder, State, get, post};
use uuid::Uuid;

use crate::auth::cookies::{
    access_cookie_value, clear_auth_cookies, refresh_cookie_value, set_access_cookie,
    set_refresh_cookie,
};
use crate::auth::jwt::{SignedAccessToken, UserIdentity};
use crate::auth::refresh_store::RefreshTokenIssued;
use crate::auth::{AuthError, AuthResult, AuthState, within_deadline};
use crate::models::{ErrorResponse, MessageResponse};

type AuthRouteError = status::Custom<Json<ErrorResponse>>;

#[derive(Debug, FromForm)]
pub struct LoginForm {
    #[field(validate = char_len(4..=16))]
    pub username: String,
    #[field(validate = char_len(5..=128))]
    pub password: String,
}

/// Length check in characters; Rocket's `len` validator counts bytes.
fn char_len<'v>(value: &str, range: RangeInclusive<usize>) -> form::Result<'v, ()> {
    if range.contains(&value.chars().count()) {
        Ok(())
    } else {
        Err(form::Error::validation(format!(
            "length must be between {} and {} characters",
            range.start(),
            range.end()
        ))
        .into())
    }
}

#[derive(Responder)]
pub enum LoginOutcome {
    LoggedIn(Json<MessageResponse>),
    AlreadyAuthenticated(Redirect),
}

#[post("/login", data = "<form>")]
pub async fn login(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    form: Result<Form<LoginForm>, Errors<'_>>,
) -> Result<LoginOutcome, AuthRouteError> {
    let form = match form {
        Ok(form) => form.into_inner(),
        Err(errors) => {
            log::debug!("rejecting login form: {}", errors);
            return Err(respond_error(AuthError::InvalidForm));
        }
    };

    let now = Utc::now();
    let limit = state.config.storage_timeout();

    if within_deadline(limit, has_live_session(state, cookies, now))
        .await
        .map_err(respond_error)?
    {
        return Ok(LoginOutcome::AlreadyAuthenticated(Redirect::found("/")));
    }

    let user = within_deadline(limit, state.users.find_by_username(&form.username))
        .await
        .map_err(respond_error)?;

    // Unknown and disabled accounts take the same path and the same time as
    // a wrong password.
    let user = match user {
        Some(user) if user.active => user,
        _ => {
            state.password_service.verify_against_dummy(&form.password);
            log::debug!("login refused for '{}'", form.username);
            return Err(respond_error(AuthError::InvalidCredentials));
        }
    };

    if !state
        .password_service
        .verify_password(&form.password, &user.password_hash)
    {
        log::debug!("login refused for '{}'", form.username);
        return Err(respond_error(AuthError::InvalidCredentials));
    }

    let session_id = Uuid::new_v4().to_string();
    let identity = user.identity();
    let (access_token, refresh_token) =
        within_deadline(limit, open_session(state, &identity, &session_id, now))
            .await
            .map_err(respond_error)?;

    set_access_cookie(cookies, &state.config, &access_token);
    set_refresh_cookie(cookies, &state.config, &refresh_token);

    log::info!(
        "user {} logged in, session {} (access until {}, refresh until {})",
        user.id,
        refresh_token.session_id,
        access_token.expires_at,
        refresh_token.expires_at
    );

    Ok(LoginOutcome::LoggedIn(Json(MessageResponse::new(
        "logged in",
    ))))
}

#[get("/logout")]
pub async fn logout(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, AuthRouteError> {
    let now = Utc::now();
    let revoked = within_deadline(
        state.config.storage_timeout(),
        revoke_presented_session(state, cookies, now),
    )
    .await;

    clear_auth_cookies(cookies, &state.config);

    match revoked {
        Ok(true) => log::info!("session revoked at logout"),
        Ok(false) => log::debug!("logout without a live session"),
        Err(err) => return Err(respond_error(err)),
    }

    Ok(Redirect::to("/"))
}

/// Durably records the refresh token before the access token leaves.
async fn open_session(
    state: &AuthState,
    identity: &UserIdentity,
    session_id: &str,
    now: DateTime<Utc>,
) -> AuthResult<(SignedAccessToken, RefreshTokenIssued)> {
    let mut tx = state.refresh_store.pool().begin().await?;
    let refresh_token = state
        .refresh_store
        .create_tx(
            &mut tx,
            identity.user_id,
            session_id,
            now,
            Duration::seconds(state.config.refresh_token_ttl_secs),
        )
        .await?;
    let access_token = state
        .jwt_service
        .issue_access_token_at(identity, session_id, now)?;
    tx.commit().await?;

    Ok((access_token, refresh_token))
}

async fn has_live_session(
    state: &AuthState,
    cookies: &CookieJar<'_>,
    now: DateTime<Utc>,
) -> AuthResult<bool> {
    if let Some(token) = access_cookie_value(cookies, &state.config) {
        if state.jwt_service.decode_access_token_at(&token, now).is_ok() {
            return Ok(true);
        }
    }

    let Some(token) = refresh_cookie_value(cookies, &state.config) else {
        return Ok(false);
    };
    let record = match state.refresh_store.lookup(&token).await? {
        Some(record) if record.active && !record.is_expired_at(now) => record,
        _ => return Ok(false),
    };
    let owner = state.users.find_by_id(record.user_id).await?;
    Ok(owner.is_some_and(|user| user.active))
}

async fn revoke_presented_session(
    state: &AuthState,
    cookies: &CookieJar<'_>,
    now: DateTime<Utc>,
) -> AuthResult<bool> {
    if let Some(token) = refresh_cookie_value(cookies, &state.config) {
        return state.refresh_store.deactivate(&token, now).await;
    }

    if let Some(token) = access_cookie_value(cookies, &state.config) {
        if let Ok(claims) = state.jwt_service.decode_access_token_at(&token, now) {
            return state.refresh_store.deactivate_session(&claims.jti, now).await;
        }
    }

    Ok(false)
}

fn respond_error(err: AuthError) -> AuthRouteError {
    if err.is_internal() {
        log::error!("auth request failed: {}", err);
    }
    let status = err.status();
    status::Custom(status, Json(ErrorResponse::new(err.public_message())))
}
