//! JSON error bodies for requests that never reached a handler.

use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, Responder, catch, catchers};

use crate::auth::guards::RedirectToLogout;
use crate::models::ErrorResponse;

pub const LOGOUT_PATH: &str = "/v1/logout";

#[derive(Responder)]
pub enum Rejection {
    #[response(status = 401)]
    Unauthorized(Json<ErrorResponse>),
    Logout(Redirect),
}

#[catch(401)]
pub fn unauthorized(request: &Request<'_>) -> Rejection {
    if request.local_cache(RedirectToLogout::default).0 {
        Rejection::Logout(Redirect::to(LOGOUT_PATH))
    } else {
        Rejection::Unauthorized(Json(ErrorResponse::new("unauthorized")))
    }
}

#[catch(400)]
pub fn bad_request() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("bad request"))
}

#[catch(404)]
pub fn not_found() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("not found"))
}

#[catch(422)]
pub fn unprocessable() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("bad request"))
}

#[catch(500)]
pub fn internal_error() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("internal server error"))
}

pub fn all() -> Vec<Catcher> {
    catchers![unauthorized, bad_request, not_found, unprocessable, internal_error]
}
