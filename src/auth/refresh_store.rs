use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rocket_db_pools::sqlx::{self, Sqlite, SqlitePool, Transaction};
use sha2::{Digest, Sha512};

use crate::auth::AuthResult;
use crate::models::RefreshTokenRecord;

const TOKEN_LEN: usize = 32;

const RECORD_COLUMNS: &str = "id, jwt_id, user_id, active, expires_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct RefreshTokenIssued {
    /// The bearer value handed to the client. Only its digest is stored.
    pub token: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a fresh active record inside the caller's transaction. The
    /// token must not reach a client before that transaction commits.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
        session_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> AuthResult<RefreshTokenIssued> {
        let token = generate_token();
        let expires_at = now + ttl;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, jwt_id, user_id, active, expires_at, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(token_digest(&token))
        .bind(session_id)
        .bind(user_id)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(RefreshTokenIssued {
            token,
            session_id: session_id.to_string(),
            expires_at,
        })
    }

    pub async fn create(
        &self,
        user_id: i64,
        session_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> AuthResult<RefreshTokenIssued> {
        let mut tx = self.pool.begin().await?;
        let issued = self.create_tx(&mut tx, user_id, session_id, now, ttl).await?;
        tx.commit().await?;
        Ok(issued)
    }

    pub async fn lookup(&self, plain_token: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM refresh_tokens WHERE id = ?"
        ))
        .bind(token_digest(plain_token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Flips an active record to inactive. Returns false when there was no
    /// active record to flip; an inactive record is never touched again.
    pub async fn deactivate(&self, plain_token: &str, now: DateTime<Utc>) -> AuthResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET active = 0, updated_at = ? WHERE id = ? AND active = 1",
        )
        .bind(now)
        .bind(token_digest(plain_token))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deactivates the live record of a session, if any.
    pub async fn deactivate_session(&self, session_id: &str, now: DateTime<Utc>) -> AuthResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET active = 0, updated_at = ? WHERE jwt_id = ? AND active = 1",
        )
        .bind(now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
