//! Repository functions for the `dynamiczones` table, which gates the
//! dynamic-update endpoint of a zone.
use sqlx::SqliteConnection;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DynamicZone {
    pub id: i64,
    pub domain_id: i64,
    pub is_dynamic: bool,
    pub api_key: String,
}

pub async fn find(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<Option<DynamicZone>> {
    sqlx::query_as::<_, DynamicZone>(
        "SELECT id, domain_id, is_dynamic, api_key FROM dynamiczones WHERE domain_id = ?",
    )
    .bind(domain_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Write the flag and key for a zone, creating the row on first use.
pub async fn upsert(
    conn: &mut SqliteConnection,
    domain_id: i64,
    is_dynamic: bool,
    api_key: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dynamiczones (domain_id, is_dynamic, api_key) VALUES (?, ?, ?)
        ON CONFLICT (domain_id) DO UPDATE SET is_dynamic = excluded.is_dynamic, api_key = excluded.api_key
        "#,
    )
    .bind(domain_id)
    .bind(is_dynamic)
    .bind(api_key)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
