//! Repository functions for manipulating rows in the `domains` table.
use std::fmt;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Value of `domains.type`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DomainType {
    #[default]
    Native,
    Master,
    Slave,
}

impl DomainType {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainType::Native => "NATIVE",
            DomainType::Master => "MASTER",
            DomainType::Slave => "SLAVE",
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown zone type {0:?}")]
pub struct UnknownDomainType(pub String);

impl FromStr for DomainType {
    type Err = UnknownDomainType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NATIVE" => Ok(DomainType::Native),
            "MASTER" => Ok(DomainType::Master),
            "SLAVE" => Ok(DomainType::Slave),
            _ => Err(UnknownDomainType(s.to_string())),
        }
    }
}

/// Application-level representation of a stored zone.
#[derive(Debug, Clone)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    pub master: Option<String>,
    pub last_check: Option<i64>,
    pub zone_type: DomainType,
    pub notified_serial: Option<i64>,
    pub account: Option<String>,
    pub created_by: Option<i64>,
}

impl Domain {
    /// Master servers from the comma-separated `master` column. Only
    /// meaningful for slave zones.
    pub fn masters(&self) -> Vec<&str> {
        self.master
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect()
    }
}

/// Columns for a new `domains` row.
#[derive(Debug, Clone, Default)]
pub struct DomainRow<'a> {
    pub name: &'a str,
    pub zone_type: DomainType,
    pub master: Option<&'a str>,
    pub account: Option<&'a str>,
    pub created_by: Option<i64>,
}

fn from_row(row: &SqliteRow) -> sqlx::Result<Domain> {
    let zone_type: String = row.try_get("type")?;
    Ok(Domain {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        master: row.try_get("master")?,
        last_check: row.try_get("last_check")?,
        zone_type: zone_type
            .parse()
            .map_err(|e: UnknownDomainType| sqlx::Error::Decode(Box::new(e)))?,
        notified_serial: row.try_get("notified_serial")?,
        account: row.try_get("account")?,
        created_by: row.try_get("created_by")?,
    })
}

/// Fetch a zone by its exact origin name.
pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<Option<Domain>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, master, last_check, type, notified_serial, account, created_by
        FROM domains
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Origin names of every stored zone, sorted.
pub async fn list_names(conn: &mut SqliteConnection) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM domains ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Create a new zone row.
pub async fn insert(conn: &mut SqliteConnection, domain: &DomainRow<'_>) -> sqlx::Result<i64> {
    let res = sqlx::query(
        r#"
        INSERT INTO domains (name, master, last_check, type, notified_serial, account, created_by)
        VALUES (?, ?, NULL, ?, NULL, ?, ?)
        "#,
    )
    .bind(domain.name)
    .bind(domain.master)
    .bind(domain.zone_type.as_str())
    .bind(domain.account)
    .bind(domain.created_by)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Change the zone type of one zone.
pub async fn set_type(
    conn: &mut SqliteConnection,
    domain_id: i64,
    zone_type: DomainType,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE domains SET type = ? WHERE id = ?")
        .bind(zone_type.as_str())
        .bind(domain_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete a zone together with its records, metadata, keys and
/// dynamic-zone row.
pub async fn delete(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<()> {
    for table in ["records", "domainmetadata", "cryptokeys", "dynamiczones"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE domain_id = ?"))
            .bind(domain_id)
            .execute(&mut *conn)
            .await?;
    }
    sqlx::query("DELETE FROM domains WHERE id = ?")
        .bind(domain_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
