use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("svego_db")]
pub struct SvegoDb(sqlx::SqlitePool);

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
