//! Repository functions for manipulating rows in the `records` table.
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::rr::RecordType;

/// Application-level representation of a stored resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i64,
    pub domain_id: i64,
    pub name: String,
    /// Raw `type` column. `None` marks an empty non-terminal row.
    pub type_name: Option<String>,
    pub content: String,
    pub ttl: Option<u32>,
    pub prio: Option<u32>,
    pub change_date: Option<i64>,
    pub ordername: Option<String>,
    pub auth: Option<bool>,
}

impl Record {
    /// The typed record type, if the row has one this crate knows.
    pub fn record_type(&self) -> Option<RecordType> {
        self.type_name.as_deref().and_then(|t| t.parse().ok())
    }

    pub fn is(&self, rtype: RecordType) -> bool {
        self.record_type() == Some(rtype)
    }
}

/// Columns written when a record is inserted or edited.
#[derive(Debug, Clone)]
pub struct RecordRow<'a> {
    pub domain_id: i64,
    pub name: &'a str,
    pub rtype: RecordType,
    pub content: &'a str,
    pub ttl: u32,
    pub prio: Option<u32>,
    pub change_date: i64,
}

fn from_row(row: &SqliteRow) -> sqlx::Result<Record> {
    let ttl: Option<i64> = row.try_get("ttl")?;
    let prio: Option<i64> = row.try_get("prio")?;
    Ok(Record {
        id: row.try_get("id")?,
        domain_id: row.try_get("domain_id")?,
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
        type_name: row.try_get("type")?,
        content: row.try_get::<Option<String>, _>("content")?.unwrap_or_default(),
        ttl: ttl.and_then(|v| u32::try_from(v).ok()),
        prio: prio.and_then(|v| u32::try_from(v).ok()),
        change_date: row.try_get("change_date")?,
        ordername: row.try_get("ordername")?,
        auth: row.try_get("auth")?,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT id, domain_id, name, type, content, ttl, prio, change_date, ordername, auth FROM records";

/// All records of a zone in insertion order.
pub async fn list_for_domain(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<Vec<Record>> {
    let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE domain_id = ? ORDER BY id"))
        .bind(domain_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Fetch one record of a zone.
pub async fn find(conn: &mut SqliteConnection, domain_id: i64, id: i64) -> sqlx::Result<Option<Record>> {
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE domain_id = ? AND id = ?"))
        .bind(domain_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// The zone's SOA record, if any.
pub async fn find_soa(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<Option<Record>> {
    let row = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE domain_id = ? AND type = 'SOA' ORDER BY id LIMIT 1"
    ))
    .bind(domain_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(from_row).transpose()
}

/// Insert a record. `auth` starts out true and `ordername` NULL until
/// the zone is rectified.
pub async fn insert(conn: &mut SqliteConnection, record: &RecordRow<'_>) -> sqlx::Result<i64> {
    let res = sqlx::query(
        r#"
        INSERT INTO records (domain_id, name, type, content, ttl, prio, change_date, ordername, auth)
        VALUES (?, ?, ?, ?, ?, ?, ?, NULL, 1)
        "#,
    )
    .bind(record.domain_id)
    .bind(record.name)
    .bind(record.rtype.as_str())
    .bind(record.content)
    .bind(i64::from(record.ttl))
    .bind(record.prio.map(i64::from))
    .bind(record.change_date)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Overwrite the user-editable columns of an existing record.
pub async fn update(conn: &mut SqliteConnection, id: i64, record: &RecordRow<'_>) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE records
        SET name = ?, type = ?, content = ?, ttl = ?, prio = ?, change_date = ?
        WHERE id = ? AND domain_id = ?
        "#,
    )
    .bind(record.name)
    .bind(record.rtype.as_str())
    .bind(record.content)
    .bind(i64::from(record.ttl))
    .bind(record.prio.map(i64::from))
    .bind(record.change_date)
    .bind(id)
    .bind(record.domain_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Replace a record's content, refreshing its change date.
pub async fn set_content(
    conn: &mut SqliteConnection,
    id: i64,
    content: &str,
    change_date: i64,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE records SET content = ?, change_date = ? WHERE id = ?")
        .bind(content)
        .bind(change_date)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Store rectification results. Leaves `change_date` alone.
pub async fn set_auth_ordername(
    conn: &mut SqliteConnection,
    id: i64,
    auth: bool,
    ordername: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE records SET auth = ?, ordername = ? WHERE id = ?")
        .bind(auth)
        .bind(ordername)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, domain_id: i64, id: i64) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM records WHERE domain_id = ? AND id = ?")
        .bind(domain_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}
