use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use std::io::Cursor;

use crate::auth::AuthError;
use crate::models::ErrorResponse;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    NotFound(String),
}

impl ApiError {
    fn status_and_message(&self) -> (Status, String) {
        match self {
            ApiError::Auth(err) => {
                if err.is_internal() {
                    log::error!("request failed: {}", err);
                }
                (err.status(), err.public_message().to_string())
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "not found".to_string())
            }
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, message) = self.status_and_message();

        let json = serde_json::to_string(&ErrorResponse::new(message))
            .unwrap_or_else(|_| r#"{"error":"internal server error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("row not found".to_string()),
            other => ApiError::Auth(AuthError::Storage(other)),
        }
    }
}
