//! Repository functions for the `cryptokeys` table. Key material is
//! opaque here; only its presence is used.
use sqlx::SqliteConnection;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CryptoKey {
    pub id: i64,
    pub domain_id: i64,
    pub flags: i64,
    pub active: Option<bool>,
    pub content: Option<String>,
}

pub async fn list_for_domain(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<Vec<CryptoKey>> {
    sqlx::query_as::<_, CryptoKey>(
        "SELECT id, domain_id, flags, active, content FROM cryptokeys WHERE domain_id = ? ORDER BY id",
    )
    .bind(domain_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn count_for_domain(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<i64> {
    let cnt: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cryptokeys WHERE domain_id = ?")
        .bind(domain_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(cnt.0)
}

pub async fn insert(
    conn: &mut SqliteConnection,
    domain_id: i64,
    flags: u32,
    active: bool,
    content: &str,
) -> sqlx::Result<i64> {
    let res = sqlx::query("INSERT INTO cryptokeys (domain_id, flags, active, content) VALUES (?, ?, ?, ?)")
        .bind(domain_id)
        .bind(i64::from(flags))
        .bind(active)
        .bind(content)
        .execute(&mut *conn)
        .await?;
    Ok(res.last_insert_rowid())
}
