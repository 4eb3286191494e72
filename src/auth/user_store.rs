use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, SqlitePool};

use crate::auth::AuthResult;
use crate::models::UserRecord;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, active, created_at, updated_at";

/// Read access to user accounts, plus the insert used for provisioning.
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(&self, username: &str) -> AuthResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, user_id: i64) -> AuthResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> AuthResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn set_active(&self, user_id: i64, active: bool, now: DateTime<Utc>) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestDatabase;

    #[tokio::test]
    async fn creates_and_finds_users() {
        let db = TestDatabase::new().await.expect("test database");
        let store = UserStore::new(db.pool_clone());
        let now = Utc::now();

        let id = store
            .create("alice", "alice@example.com", "$argon2id$stub", true, now)
            .await
            .expect("insert user");

        let by_name = store
            .find_by_username("alice")
            .await
            .expect("lookup")
            .expect("user exists");
        assert_eq!(by_name.id, id);
        assert!(by_name.active);

        let by_id = store.find_by_id(id).await.expect("lookup").expect("user exists");
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.email, "alice@example.com");

        assert!(store.find_by_username("bob").await.expect("lookup").is_none());
        assert!(store.find_by_id(id + 1).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let db = TestDatabase::new().await.expect("test database");
        let store = UserStore::new(db.pool_clone());
        let now = Utc::now();

        store
            .create("alice", "alice@example.com", "hash", true, now)
            .await
            .expect("insert user");
        let duplicate = store
            .create("alice", "other@example.com", "hash", true, now)
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn toggles_active_flag() {
        let db = TestDatabase::new().await.expect("test database");
        let store = UserStore::new(db.pool_clone());
        let now = Utc::now();

        let id = store
            .create("alice", "alice@example.com", "hash", true, now)
            .await
            .expect("insert user");
        assert!(store.set_active(id, false, now).await.expect("update"));

        let user = store.find_by_id(id).await.expect("lookup").expect("user exists");
        assert!(!user.active);
    }
}
