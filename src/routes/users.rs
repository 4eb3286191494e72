use rocket::serde::json::Json;
use rocket::{State, get};

use crate::auth::{AuthState, AuthUser, within_deadline};
use crate::error::ApiError;
use crate::models::UserProfile;

/// Profile of the caller, as resolved by the gate.
#[get("/me")]
pub async fn me(user: AuthUser, state: &State<AuthState>) -> Result<Json<UserProfile>, ApiError> {
    let record = within_deadline(state.config.storage_timeout(), state.users.find_by_id(user.id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", user.id)))?;

    Ok(Json(UserProfile::from(record)))
}
