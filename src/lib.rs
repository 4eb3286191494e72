#[macro_use]
extern crate rocket;

pub mod auth;
pub mod catchers;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::auth::{AuthConfig, AuthState};
use crate::db::SvegoDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use std::sync::Once;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

fn cors_options() -> CorsOptions {
    let origin =
        std::env::var("SVEGO_CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

    CorsOptions::default()
        .allowed_origins(AllowedOrigins::some_exact(&[origin]))
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
}

pub fn rocket() -> Rocket<Build> {
    init_logger();
    log::info!("Starting svego API server");

    let rocket = rocket::build()
        .attach(RequestLogger)
        .attach(SvegoDb::init());

    let rocket = match cors_options().to_cors() {
        Ok(cors) => rocket.attach(cors),
        Err(err) => {
            let message = err.to_string();
            rocket.attach(AdHoc::try_on_ignite("CORS", |rocket| async move {
                log::error!("invalid CORS configuration: {}", message);
                Err(rocket)
            }))
        }
    };

    rocket
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match SvegoDb::fetch(&rocket) {
                    Some(db) => match db::run_migrations(db).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    },
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // The service refuses to start without a valid signing secret.
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let pool = match SvegoDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                }
            };

            match AuthConfig::from_env().and_then(|config| AuthState::from_pool(config, pool)) {
                Ok(state) => {
                    log::info!(
                        "auth ready: access ttl {}s, refresh ttl {}s, expired session policy {:?}",
                        state.config.access_token_ttl_secs,
                        state.config.refresh_token_ttl_secs,
                        state.config.expired_session_policy
                    );
                    Ok(rocket.manage(state))
                }
                Err(err) => {
                    log::error!("refusing to start: {}", err);
                    Err(rocket)
                }
            }
        }))
        .mount(
            "/",
            routes![routes::health::root_status, routes::health::status],
        )
        .mount(
            "/v1",
            routes![auth::routes::login, auth::routes::logout, routes::users::me],
        )
        .register("/", catchers::all())
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use chrono::Utc;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, SqlitePool};

    use crate::auth::config::{ExpiredSessionPolicy, JWT_SECRET_LEN};
    use crate::auth::{AuthConfig, AuthState, PasswordService, UserStore};

    pub use database::TestDatabase;

    /// Auth configuration suitable for tests: plain-HTTP cookies, the default
    /// lifetimes and a fixed signing secret of the required length.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            issuer: "svego-api-test".into(),
            access_token_ttl_secs: 60 * 60,
            refresh_token_ttl_secs: 30 * 24 * 60 * 60,
            access_cookie_name: "token".into(),
            refresh_cookie_name: "refreshToken".into(),
            cookie_secure: false,
            expired_session_policy: ExpiredSessionPolicy::Reject,
            storage_timeout_ms: 5_000,
            jwt_secret: "s".repeat(JWT_SECRET_LEN),
        }
    }

    pub fn test_auth_state_with(config: AuthConfig, pool: SqlitePool) -> AuthState {
        AuthState::from_pool(config, pool).expect("test auth state")
    }

    pub fn test_auth_state(pool: SqlitePool) -> AuthState {
        test_auth_state_with(test_auth_config(), pool)
    }

    /// Convenience helpers for seeding auth tables in tests.
    pub struct TestFixtures<'a> {
        pool: &'a SqlitePool,
    }

    impl<'a> TestFixtures<'a> {
        /// Create a fixture helper bound to the provided pool.
        pub fn new(pool: &'a SqlitePool) -> Self {
            Self { pool }
        }

        /// Insert a user with a freshly hashed password, returning the new id.
        pub async fn insert_user(
            &self,
            username: &str,
            email: &str,
            password: &str,
            active: bool,
        ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
            let hash = PasswordService::new()?.hash_password(password)?;
            let id = UserStore::new(self.pool.clone())
                .create(username, email, &hash, active, Utc::now())
                .await?;
            Ok(id)
        }

        pub async fn count_refresh_tokens(&self, user_id: i64) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool)
                .await
        }

        /// Snapshot of every refresh record as (jwt_id, active, updated_at).
        pub async fn refresh_token_rows(&self) -> Result<Vec<(String, bool, String)>, sqlx::Error> {
            sqlx::query_as(
                "SELECT jwt_id, active, CAST(updated_at AS TEXT) FROM refresh_tokens ORDER BY created_at",
            )
            .fetch_all(self.pool)
            .await
        }

        pub async fn expire_refresh_tokens(&self, user_id: i64) -> Result<u64, sqlx::Error> {
            let past = Utc::now() - chrono::Duration::days(1);
            let result = sqlx::query("UPDATE refresh_tokens SET expires_at = ? WHERE user_id = ?")
                .bind(past)
                .bind(user_id)
                .execute(self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    pub mod database {
        use rocket_db_pools::sqlx::sqlite::SqlitePoolOptions;
        use rocket_db_pools::sqlx::{self, SqlitePool};

        use crate::db::MIGRATOR;

        /// Private in-memory SQLite database with migrations applied. One
        /// connection keeps the database alive for the lifetime of the pool.
        pub struct TestDatabase {
            pool: SqlitePool,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, sqlx::Error> {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect("sqlite::memory:")
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self { pool })
            }

            /// Database without any schema, for exercising migrations.
            pub async fn empty() -> Result<Self, sqlx::Error> {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect("sqlite::memory:")
                    .await?;
                Ok(Self { pool })
            }

            pub fn pool(&self) -> &SqlitePool {
                &self.pool
            }

            pub fn pool_clone(&self) -> SqlitePool {
                self.pool.clone()
            }

            pub async fn close(self) {
                self.pool.close().await;
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                auth_state: None,
            }
        }

        pub fn mount_root_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/".to_string(), routes));
            self
        }

        /// Mount routes under `/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/v1".to_string(), routes));
            self
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment)
                .attach(crate::request_logger::RequestLogger)
                .register("/", crate::catchers::all());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        /// Client that does not replay cookies, so each test controls exactly
        /// which credentials a request carries.
        pub async fn untracked_client(self) -> AsyncClient {
            AsyncClient::untracked(self.build())
                .await
                .expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
