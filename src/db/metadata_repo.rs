//! Repository functions for the `domainmetadata` table.
use std::fmt;

use sqlx::SqliteConnection;

/// The per-zone metadata kinds the management layer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    AllowAxfrFrom,
    AxfrMasterTsig,
    LuaAxfrScript,
    Nsec3Narrow,
    Nsec3Param,
    Presigned,
    SoaEdit,
    TsigAllowAxfr,
}

impl MetadataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKind::AllowAxfrFrom => "ALLOW-AXFR-FROM",
            MetadataKind::AxfrMasterTsig => "AXFR-MASTER-TSIG",
            MetadataKind::LuaAxfrScript => "LUA-AXFR-SCRIPT",
            MetadataKind::Nsec3Narrow => "NSEC3NARROW",
            MetadataKind::Nsec3Param => "NSEC3PARAM",
            MetadataKind::Presigned => "PRESIGNED",
            MetadataKind::SoaEdit => "SOA-EDIT",
            MetadataKind::TsigAllowAxfr => "TSIG-ALLOW-AXFR",
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `domainmetadata` row. `kind` is kept as stored so rows written
/// by other tools are still visible.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DomainMetadata {
    pub id: i64,
    pub domain_id: i64,
    pub kind: String,
    pub content: Option<String>,
}

pub async fn list_for_domain(
    conn: &mut SqliteConnection,
    domain_id: i64,
) -> sqlx::Result<Vec<DomainMetadata>> {
    sqlx::query_as::<_, DomainMetadata>(
        "SELECT id, domain_id, kind, content FROM domainmetadata WHERE domain_id = ? ORDER BY kind, id",
    )
    .bind(domain_id)
    .fetch_all(&mut *conn)
    .await
}

/// Set the single row of `kind` for a zone, replacing any previous one.
pub async fn upsert(
    conn: &mut SqliteConnection,
    domain_id: i64,
    kind: MetadataKind,
    content: Option<&str>,
) -> sqlx::Result<()> {
    remove(conn, domain_id, kind).await?;
    sqlx::query("INSERT INTO domainmetadata (domain_id, kind, content) VALUES (?, ?, ?)")
        .bind(domain_id)
        .bind(kind.as_str())
        .bind(content)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn remove(conn: &mut SqliteConnection, domain_id: i64, kind: MetadataKind) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM domainmetadata WHERE domain_id = ? AND kind = ?")
        .bind(domain_id)
        .bind(kind.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}
