//! Session authentication: configuration, credential checks, token minting,
//! refresh-token persistence, the renewal protocol, the Rocket request guard
//! that enforces it, and the login/logout routes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use rocket_db_pools::sqlx::SqlitePool;

pub mod config;
pub mod cookies;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod refresh_store;
pub mod renewal;
pub mod routes;
pub mod user_store;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::AuthUser;
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use refresh_store::RefreshTokenStore;
pub use user_store::UserStore;

/// Everything the auth routes and the gate need, built once at ignition.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub refresh_store: RefreshTokenStore,
    pub users: UserStore,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
        refresh_store: RefreshTokenStore,
        users: UserStore,
    ) -> Self {
        Self {
            config,
            password_service: Arc::new(password_service),
            jwt_service: Arc::new(jwt_service),
            refresh_store,
            users,
        }
    }

    /// Builds the full state over one pool. Fails on any misconfiguration so
    /// the service refuses to start.
    pub fn from_pool(config: AuthConfig, pool: SqlitePool) -> AuthResult<Self> {
        let password_service = PasswordService::new()?;
        let jwt_service = JwtService::from_config(&config)?;
        Ok(Self::new(
            config,
            password_service,
            jwt_service,
            RefreshTokenStore::new(pool.clone()),
            UserStore::new(pool),
        ))
    }
}

/// Storage work that outlives its deadline fails closed.
pub async fn within_deadline<T, F>(limit: StdDuration, work: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(AuthError::StorageTimeout),
    }
}
