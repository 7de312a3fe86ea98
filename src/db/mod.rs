pub mod cryptokey_repo;
pub mod domain_repo;
pub mod dynzone_repo;
pub mod metadata_repo;
pub mod record_repo;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type Db = SqlitePool;

/// Open (creating if needed) the SQLite database at `path` and apply
/// the schema migrations.
pub async fn init_db(path: &std::path::Path) -> anyhow::Result<Db> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
pub async fn init_memory_db() -> anyhow::Result<Db> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

/// Current time as stored in `records.change_date`.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
