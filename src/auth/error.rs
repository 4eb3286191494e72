use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no usable credential presented")]
    Unauthenticated,
    #[error("access token expired")]
    AccessTokenExpired,
    #[error("session expired")]
    SessionExpired,
    #[error("session revoked")]
    SessionRevoked,
    #[error("malformed token")]
    Malformed,
    #[error("invalid login form")]
    InvalidForm,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("storage deadline exceeded")]
    StorageTimeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("token signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::AccessTokenExpired
            | AuthError::SessionExpired
            | AuthError::SessionRevoked
            | AuthError::Malformed => Status::Unauthorized,
            AuthError::InvalidForm => Status::BadRequest,
            AuthError::Storage(_)
            | AuthError::StorageTimeout
            | AuthError::Config(_)
            | AuthError::Signing(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }

    /// Message safe to hand to a client. Session failures collapse into one
    /// string and internal failures never carry their source text.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid username or password",
            AuthError::InvalidForm => "invalid login form",
            AuthError::Unauthenticated
            | AuthError::AccessTokenExpired
            | AuthError::SessionExpired
            | AuthError::SessionRevoked
            | AuthError::Malformed => "unauthorized",
            _ => "internal server error",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() == Status::InternalServerError
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
