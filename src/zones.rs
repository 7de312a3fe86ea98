//! Zone-level operations over the PowerDNS tables.
//!
//! Every mutating operation takes the zone's lock, runs in one database
//! transaction and finishes with a rectification pass, so a zone is
//! never left half-written or with stale `auth`/`ordername` values.
//! Record edits also bump the SOA serial; imports keep the serial of
//! their source (see [`ZoneManager::import_zone_text`]).

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand_core::{OsRng, RngCore};
use sqlx::SqliteConnection;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::axfr;
use crate::config::AppConfig;
use crate::db::domain_repo::{self, Domain, DomainRow, DomainType};
use crate::db::dynzone_repo::{self, DynamicZone};
use crate::db::metadata_repo::{self, MetadataKind};
use crate::db::record_repo::{self, Record, RecordRow};
use crate::db::{Db, cryptokey_repo, unix_now};
use crate::error::{Result, ZoneError};
use crate::name;
use crate::rectify::{self, RectifyReport};
use crate::rr::RecordType;
use crate::rr::content::{RecordContent, Soa};
use crate::serial::{bump_soa_content, next_serial};
use crate::validation;
use crate::zone_file::{self, ParsedZone, ZoneRecord};

/// One async mutex per zone, created on first use and dropped again
/// once nobody holds or waits for it.
#[derive(Default)]
struct ZoneLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ZoneLocks {
    async fn lock(&self, origin: &str) -> ZoneGuard<'_> {
        let key = name::key(origin);
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(key.clone()).or_default().clone()
        };
        ZoneGuard {
            locks: self,
            key,
            _held: lock.lock_owned().await,
        }
    }
}

struct ZoneGuard<'a> {
    locks: &'a ZoneLocks,
    key: String,
    _held: OwnedMutexGuard<()>,
}

impl Drop for ZoneGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this guard reference an uncontended lock.
        if map.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 2) {
            map.remove(&self.key);
        }
    }
}

/// Parameters for [`ZoneManager::create_zone`].
#[derive(Debug, Clone)]
pub struct NewZone {
    pub origin: String,
    pub zone_type: Option<DomainType>,
    /// Master servers; only meaningful for slave zones.
    pub masters: Vec<String>,
    pub account: Option<String>,
    pub created_by: Option<i64>,
    pub primary_ns: String,
    pub hostmaster: String,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
    /// Apex NS targets. Empty means the primary nameserver alone.
    pub nameservers: Vec<String>,
}

impl NewZone {
    pub fn new(origin: &str, primary_ns: &str, hostmaster: &str) -> Self {
        Self {
            origin: origin.to_string(),
            zone_type: None,
            masters: Vec::new(),
            account: None,
            created_by: None,
            primary_ns: primary_ns.to_string(),
            hostmaster: hostmaster.to_string(),
            refresh: 28800,
            retry: 7200,
            expire: 604800,
            minimum: 86400,
            nameservers: Vec::new(),
        }
    }
}

/// A record to insert (`id` unset) or update.
#[derive(Debug, Clone)]
pub struct RecordInput {
    pub id: Option<i64>,
    pub name: String,
    pub rtype: RecordType,
    pub content: String,
    pub ttl: Option<u32>,
    pub prio: Option<u32>,
}

pub struct ZoneManager {
    db: Db,
    config: AppConfig,
    locks: ZoneLocks,
}

impl ZoneManager {
    pub fn new(db: Db, config: AppConfig) -> Self {
        Self {
            db,
            config,
            locks: ZoneLocks::default(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn origin(&self, origin: &str) -> String {
        self.config.normalize_name(origin)
    }

    /// Origins of every stored zone.
    pub async fn zone_names(&self) -> Result<Vec<String>> {
        let mut conn = self.db.acquire().await?;
        Ok(domain_repo::list_names(&mut conn).await?)
    }

    /// Imports zone text. The serial in the text is kept unless it is 0,
    /// in which case a fresh one is generated.
    pub async fn import_zone_text(&self, origin_hint: Option<&str>, text: &str, overwrite: bool) -> Result<Domain> {
        let mut zone = zone_file::parse_zone(origin_hint, text, &self.config)?;
        if zone.soa_fields()?.serial == 0 {
            zone.set_serial(next_serial(None))?;
        }
        self.store_zone(zone, overwrite).await
    }

    /// Imports a zone by AXFR from `nameserver`. The transferred serial
    /// is replaced by a newer one.
    pub async fn import_zone_axfr(&self, origin: &str, nameserver: &str, overwrite: bool) -> Result<Domain> {
        let mut zone = axfr::fetch(origin, nameserver, &self.config).await?;
        let source_serial = zone.soa_fields()?.serial;
        zone.set_serial(next_serial(Some(source_serial)))?;
        self.store_zone(zone, overwrite).await
    }

    async fn store_zone(&self, zone: ParsedZone, overwrite: bool) -> Result<Domain> {
        let _guard = self.locks.lock(&zone.origin).await;
        let mut tx = self.db.begin().await?;

        if let Some(existing) = domain_repo::find_by_name(&mut tx, &zone.origin).await? {
            if !overwrite {
                return Err(ZoneError::ZoneExists(zone.origin));
            }
            info!(zone = %zone.origin, "replacing existing zone");
            domain_repo::delete(&mut tx, existing.id).await?;
        }

        let domain_id = domain_repo::insert(
            &mut tx,
            &DomainRow {
                name: &zone.origin,
                zone_type: self.config.default_zone_type,
                ..DomainRow::default()
            },
        )
        .await?;

        let minimum = zone.soa_fields()?.minimum;
        let now = unix_now();
        for record in &zone.records {
            record_repo::insert(
                &mut tx,
                &RecordRow {
                    domain_id,
                    name: &record.name,
                    rtype: record.rtype,
                    content: &record.content,
                    ttl: record.ttl.unwrap_or(minimum),
                    prio: record.prio,
                    change_date: now,
                },
            )
            .await?;
        }

        let domain = load_domain(&mut tx, &zone.origin).await?;
        let report = rectify::rectify_domain(&mut tx, &domain).await?;
        tx.commit().await?;

        info!(zone = %domain.name, records = zone.records.len(), mode = %report.mode, "zone imported");
        Ok(domain)
    }

    /// Renders a stored zone as zone text.
    pub async fn export_zone_text(&self, origin: &str) -> Result<String> {
        let origin = self.origin(origin);
        let mut conn = self.db.acquire().await?;
        let domain = load_domain(&mut conn, &origin).await?;

        let records: Vec<ZoneRecord> = record_repo::list_for_domain(&mut conn, domain.id)
            .await?
            .into_iter()
            .filter_map(|record| match record.record_type() {
                Some(rtype) => Some(ZoneRecord {
                    name: record.name,
                    rtype,
                    content: record.content,
                    ttl: record.ttl,
                    prio: record.prio,
                }),
                None => {
                    if record.type_name.is_some() {
                        warn!(zone = %domain.name, id = record.id, "not exporting record of unsupported type");
                    }
                    None
                }
            })
            .collect();

        let text = zone_file::serialize(&domain.name, &records)?;
        info!(zone = %domain.name, records = records.len(), "zone exported");
        Ok(text)
    }

    /// Recomputes `auth`/`ordername` for a zone.
    pub async fn rectify_zone(&self, origin: &str) -> Result<RectifyReport> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;
        let report = rectify::rectify_domain(&mut tx, &domain).await?;
        tx.commit().await?;
        info!(zone = %origin, updated = report.updated, "zone rectified");
        Ok(report)
    }

    /// Creates an empty zone with an SOA and apex NS records.
    pub async fn create_zone(&self, new: NewZone) -> Result<Domain> {
        let origin = self.origin(&new.origin);
        let invalid = |e: validation::ValidationError| ZoneError::invalid_record(e.to_string());
        validation::validate_hostname(&origin).map_err(invalid)?;
        validation::validate_hostname(&new.primary_ns).map_err(invalid)?;
        validation::validate_hostmaster(&new.hostmaster).map_err(invalid)?;
        let nameservers: Vec<String> = if new.nameservers.is_empty() {
            vec![name::strip_root(&new.primary_ns).to_string()]
        } else {
            new.nameservers
                .iter()
                .map(|ns| name::strip_root(ns).to_string())
                .collect()
        };
        for ns in &nameservers {
            validation::validate_hostname(ns).map_err(invalid)?;
        }

        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        if domain_repo::find_by_name(&mut tx, &origin).await?.is_some() {
            return Err(ZoneError::ZoneExists(origin));
        }

        let masters = new.masters.join(",");
        let domain_id = domain_repo::insert(
            &mut tx,
            &DomainRow {
                name: &origin,
                zone_type: new.zone_type.unwrap_or(self.config.default_zone_type),
                master: (!masters.is_empty()).then_some(masters.as_str()),
                account: new.account.as_deref(),
                created_by: new.created_by,
            },
        )
        .await?;

        let soa = RecordContent::Soa(Soa {
            primary: name::strip_root(&new.primary_ns).to_string(),
            hostmaster: name::strip_root(&new.hostmaster).to_string(),
            serial: next_serial(None),
            refresh: new.refresh,
            retry: new.retry,
            expire: new.expire,
            minimum: new.minimum,
        })
        .compose();
        let now = unix_now();
        let apex = std::iter::once((RecordType::Soa, soa))
            .chain(nameservers.into_iter().map(|ns| (RecordType::Ns, ns)));
        for (rtype, content) in apex {
            record_repo::insert(
                &mut tx,
                &RecordRow {
                    domain_id,
                    name: &origin,
                    rtype,
                    content: &content,
                    ttl: new.minimum,
                    prio: None,
                    change_date: now,
                },
            )
            .await?;
        }

        let domain = load_domain(&mut tx, &origin).await?;
        rectify::rectify_domain(&mut tx, &domain).await?;
        tx.commit().await?;
        info!(zone = %origin, "zone created");
        Ok(domain)
    }

    /// Deletes a zone with its records, metadata, keys and dynamic-zone
    /// row.
    pub async fn delete_zone(&self, origin: &str) -> Result<()> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;
        domain_repo::delete(&mut tx, domain.id).await?;
        tx.commit().await?;
        info!(zone = %origin, "zone deleted");
        Ok(())
    }

    /// Inserts or updates one record, then bumps the serial and
    /// rectifies the zone.
    pub async fn save_record(&self, origin: &str, input: RecordInput) -> Result<Record> {
        let origin = self.origin(origin);
        if !self.config.is_enabled(input.rtype) {
            return Err(ZoneError::invalid_record(format!(
                "record type {} is not enabled",
                input.rtype
            )));
        }

        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;

        let existing = match input.id {
            Some(id) => Some(record_repo::find(&mut tx, domain.id, id).await?.ok_or_else(|| {
                ZoneError::invalid_record(format!("record {id} does not belong to zone {origin}"))
            })?),
            None => None,
        };
        if existing.as_ref().is_some_and(|r| r.is(RecordType::Soa)) && input.rtype != RecordType::Soa {
            return Err(ZoneError::invalid_record(format!(
                "the SOA record of {origin} cannot change its type"
            )));
        }

        let owner = if input.rtype == RecordType::Soa {
            domain.name.clone()
        } else {
            let owner = self.config.normalize_name(&input.name);
            validation::validate_owner_name(&owner)
                .map_err(|e| ZoneError::invalid_record(e.to_string()))?;
            if !name::is_in_zone(&owner, &domain.name) {
                return Err(ZoneError::invalid_record(format!(
                    "{owner} does not belong to zone {origin}"
                )));
            }
            owner
        };

        let content = RecordContent::decompose(input.rtype, &input.content)?;
        check_content(&content)?;

        let soa = record_repo::find_soa(&mut tx, domain.id).await?;
        if input.rtype == RecordType::Soa && soa.as_ref().is_some_and(|soa| Some(soa.id) != input.id) {
            return Err(ZoneError::invalid_record(format!(
                "zone {origin} already has an SOA record"
            )));
        }

        let ttl = match (input.ttl, &content) {
            (Some(ttl), _) => ttl,
            (None, RecordContent::Soa(fields)) => fields.minimum,
            (None, _) => match &soa {
                Some(soa) => soa_fields(soa)?.minimum,
                None => self.config.default_ttl,
            },
        };
        let prio = input
            .rtype
            .has_priority()
            .then(|| input.prio.unwrap_or(0));

        let content = content.compose();
        let row = RecordRow {
            domain_id: domain.id,
            name: &owner,
            rtype: input.rtype,
            content: &content,
            ttl,
            prio,
            change_date: unix_now(),
        };
        let id = match input.id {
            Some(id) => {
                record_repo::update(&mut tx, id, &row).await?;
                id
            }
            None => record_repo::insert(&mut tx, &row).await?,
        };

        bump_zone_serial(&mut tx, &domain).await?;
        rectify::rectify_domain(&mut tx, &domain).await?;
        let saved = record_repo::find(&mut tx, domain.id, id)
            .await?
            .ok_or_else(|| ZoneError::invalid_record(format!("record {id} vanished from {origin}")))?;
        tx.commit().await?;
        info!(zone = %origin, id, name = %saved.name, rtype = %input.rtype, "record saved");
        Ok(saved)
    }

    /// Deletes one non-SOA record, then bumps the serial and rectifies.
    pub async fn delete_record(&self, origin: &str, id: i64) -> Result<()> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;

        let record = record_repo::find(&mut tx, domain.id, id)
            .await?
            .ok_or_else(|| ZoneError::invalid_record(format!("record {id} does not belong to zone {origin}")))?;
        if record.is(RecordType::Soa) {
            return Err(ZoneError::invalid_record(format!(
                "the SOA record of {origin} cannot be deleted"
            )));
        }
        record_repo::delete(&mut tx, domain.id, id).await?;

        bump_zone_serial(&mut tx, &domain).await?;
        rectify::rectify_domain(&mut tx, &domain).await?;
        tx.commit().await?;
        info!(zone = %origin, id, "record deleted");
        Ok(())
    }

    /// Sets the metadata row of `kind`. The zone is re-rectified since
    /// NSEC3 metadata selects the ordering mode.
    pub async fn set_metadata(&self, origin: &str, kind: MetadataKind, content: Option<&str>) -> Result<()> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;
        metadata_repo::upsert(&mut tx, domain.id, kind, content).await?;
        rectify::rectify_domain(&mut tx, &domain).await?;
        tx.commit().await?;
        info!(zone = %origin, kind = %kind, "metadata set");
        Ok(())
    }

    pub async fn delete_metadata(&self, origin: &str, kind: MetadataKind) -> Result<bool> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;
        let removed = metadata_repo::remove(&mut tx, domain.id, kind).await?;
        rectify::rectify_domain(&mut tx, &domain).await?;
        tx.commit().await?;
        info!(zone = %origin, kind = %kind, removed, "metadata deleted");
        Ok(removed > 0)
    }

    /// Records a DNSSEC key row. Key material is stored as given.
    pub async fn add_crypto_key(&self, origin: &str, flags: u32, active: bool, content: &str) -> Result<i64> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;
        let id = cryptokey_repo::insert(&mut tx, domain.id, flags, active, content).await?;
        tx.commit().await?;
        info!(zone = %origin, id, flags, active, "crypto key added");
        Ok(id)
    }

    /// Switches dynamic updates on or off. Turning them on generates an
    /// API key unless one exists; turning them off clears it.
    pub async fn set_dynamic(&self, origin: &str, is_dynamic: bool) -> Result<DynamicZone> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;

        let current = dynzone_repo::find(&mut tx, domain.id).await?;
        let api_key = match (is_dynamic, current) {
            (false, _) => String::new(),
            (true, Some(dz)) if !dz.api_key.is_empty() => dz.api_key,
            (true, _) => generate_api_key(),
        };
        dynzone_repo::upsert(&mut tx, domain.id, is_dynamic, &api_key).await?;
        let stored = dynzone_repo::find(&mut tx, domain.id)
            .await?
            .ok_or_else(|| ZoneError::ZoneNotFound(origin.clone()))?;
        tx.commit().await?;
        info!(zone = %origin, is_dynamic, "dynamic updates configured");
        Ok(stored)
    }

    /// Sets the type of several zones, one zone at a time. Stops at the
    /// first zone that does not exist.
    pub async fn set_zone_type_bulk(&self, origins: &[&str], zone_type: DomainType) -> Result<usize> {
        let mut changed = 0;
        for origin in origins {
            let origin = self.origin(origin);
            let _guard = self.locks.lock(&origin).await;
            let mut tx = self.db.begin().await?;
            let domain = load_domain(&mut tx, &origin).await?;
            domain_repo::set_type(&mut tx, domain.id, zone_type).await?;
            tx.commit().await?;
            changed += 1;
        }
        info!(zones = changed, zone_type = %zone_type, "zone types updated");
        Ok(changed)
    }

    /// Moves the SOA serial forward and returns the new value.
    pub async fn bump_serial(&self, origin: &str) -> Result<u32> {
        let origin = self.origin(origin);
        let _guard = self.locks.lock(&origin).await;
        let mut tx = self.db.begin().await?;
        let domain = load_domain(&mut tx, &origin).await?;
        let serial = bump_zone_serial(&mut tx, &domain).await?;
        tx.commit().await?;
        info!(zone = %origin, serial, "serial bumped");
        Ok(serial)
    }
}

async fn load_domain(conn: &mut SqliteConnection, origin: &str) -> Result<Domain> {
    domain_repo::find_by_name(conn, origin)
        .await?
        .ok_or_else(|| ZoneError::ZoneNotFound(origin.to_string()))
}

fn soa_fields(record: &Record) -> Result<Soa> {
    Ok(Soa::from_content(&record.content)?)
}

async fn bump_zone_serial(conn: &mut SqliteConnection, domain: &Domain) -> Result<u32> {
    let soa = record_repo::find_soa(&mut *conn, domain.id)
        .await?
        .ok_or_else(|| ZoneError::MissingSoa(domain.name.clone()))?;
    let (content, serial) = bump_soa_content(&soa.content)?;
    record_repo::set_content(&mut *conn, soa.id, &content, unix_now()).await?;
    Ok(serial)
}

/// Checks the parts of typed content the codec leaves to its callers.
fn check_content(content: &RecordContent) -> Result<()> {
    let invalid = |e: validation::ValidationError| ZoneError::invalid_record(e.to_string());
    match content {
        RecordContent::Soa(soa) => {
            validation::validate_hostname(&soa.primary).map_err(invalid)?;
            validation::validate_hostmaster(&soa.hostmaster).map_err(invalid)
        }
        // Null MX and "no service" SRV.
        RecordContent::Mx { exchange: host } | RecordContent::Srv { target: host, .. } if host == "." => Ok(()),
        RecordContent::Ns(host)
        | RecordContent::Cname(host)
        | RecordContent::Ptr(host)
        | RecordContent::Mx { exchange: host }
        | RecordContent::Srv { target: host, .. } => validation::validate_hostname(host).map_err(invalid),
        RecordContent::A(addr) => addr
            .parse::<Ipv4Addr>()
            .map(drop)
            .map_err(|_| ZoneError::invalid_record(format!("{addr:?} is not an IPv4 address"))),
        RecordContent::Aaaa(addr) => addr
            .parse::<Ipv6Addr>()
            .map(drop)
            .map_err(|_| ZoneError::invalid_record(format!("{addr:?} is not an IPv6 address"))),
        RecordContent::Txt(words) | RecordContent::Spf(words) if words.is_empty() => {
            Err(ZoneError::invalid_record("TXT and SPF records need content"))
        }
        _ => Ok(()),
    }
}

fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
