//! Zone rectification: recomputes `auth` and `ordername` of every record
//! of a zone from its record set and DNSSEC metadata.
//!
//! The computation ([`compute`]) is pure; [`rectify_domain`] loads the
//! inputs and writes back only after the whole zone has been computed,
//! so a failed pass leaves the stored values as they were. Content,
//! TTL, `change_date` and the SOA serial are never touched.

use std::collections::HashSet;
use std::fmt;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::db::cryptokey_repo;
use crate::db::domain_repo::Domain;
use crate::db::metadata_repo::{self, DomainMetadata, MetadataKind};
use crate::db::record_repo::{self, Record};
use crate::error::{Result, ZoneError};
use crate::name;
use crate::nsec3::Nsec3Param;
use crate::rr::RecordType;

/// How ordernames are filled, selected by the zone's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderMode {
    Nsec,
    Nsec3Narrow,
    /// NSEC3 with stored hashes. Opt-out zones land here as well; the
    /// metadata does not tell the two apart.
    Nsec3(Nsec3Param),
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMode::Nsec => f.write_str("NSEC"),
            OrderMode::Nsec3Narrow => f.write_str("NSEC3 narrow"),
            OrderMode::Nsec3(param) => write!(f, "NSEC3 ({param})"),
        }
    }
}

/// Picks the ordering mode for `zone` from its metadata rows.
pub fn ordering_mode(zone: &str, metadata: &[DomainMetadata]) -> Result<OrderMode> {
    let is = |m: &DomainMetadata, kind: MetadataKind| m.kind.eq_ignore_ascii_case(kind.as_str());

    if !metadata
        .iter()
        .any(|m| m.kind.to_ascii_uppercase().starts_with("NSEC3"))
    {
        return Ok(OrderMode::Nsec);
    }
    if metadata.iter().any(|m| is(m, MetadataKind::Nsec3Narrow)) {
        return Ok(OrderMode::Nsec3Narrow);
    }

    let content = metadata
        .iter()
        .find(|m| is(m, MetadataKind::Nsec3Param))
        .and_then(|m| m.content.as_deref())
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ZoneError::configuration(zone, "NSEC3 is enabled but NSEC3PARAM metadata is missing"))?;
    content
        .parse::<Nsec3Param>()
        .map(OrderMode::Nsec3)
        .map_err(|e| ZoneError::configuration(zone, format!("NSEC3PARAM {content:?} is unusable: {e}")))
}

/// Computed values for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rectified {
    pub id: i64,
    pub auth: bool,
    pub ordername: Option<String>,
}

/// Names strictly below `origin` that own NS or DS records.
fn delegated_names(origin_depth: usize, records: &[Record]) -> HashSet<String> {
    records
        .iter()
        .filter(|r| r.is(RecordType::Ns) || r.is(RecordType::Ds))
        .filter(|r| name::label_count(&r.name) > origin_depth)
        .map(|r| name::key(&r.name))
        .collect()
}

/// Computes `auth`/`ordername` for every typed record of a zone.
/// Rows without a type are left out.
pub fn compute(origin: &str, records: &[Record], mode: &OrderMode) -> Result<Vec<Rectified>> {
    if !records.iter().any(|r| r.is(RecordType::Soa)) {
        return Err(ZoneError::MissingSoa(origin.to_string()));
    }
    let origin_depth = name::label_count(origin);
    let delegated = delegated_names(origin_depth, records);

    let mut out = Vec::with_capacity(records.len());
    for record in records.iter().filter(|r| r.type_name.is_some()) {
        let relative = name::relative_labels(&record.name, origin).ok_or_else(|| {
            ZoneError::malformed_zone(format!(
                "record {} ({}) lies outside zone {origin}",
                record.id, record.name
            ))
        })?;

        let key = name::key(&record.name);
        let at_cut = delegated.contains(&key);
        let below_cut = name::ancestors_below(&record.name, origin_depth)
            .iter()
            .any(|ancestor| delegated.contains(&name::key(ancestor)));
        let is_ns = record.is(RecordType::Ns);
        let is_glue = record.record_type().is_some_and(RecordType::is_address);
        let auth = !((at_cut || below_cut) && (is_ns || is_glue));

        let ordername = match mode {
            OrderMode::Nsec => {
                let reversed = relative
                    .iter()
                    .rev()
                    .map(|label| label.to_ascii_lowercase())
                    .collect::<Vec<_>>()
                    .join(" ");
                (auth || (at_cut && is_ns)).then_some(reversed)
            }
            OrderMode::Nsec3Narrow => Some(String::new()),
            OrderMode::Nsec3(param) if auth => Some(param.hash(&record.name).map_err(|e| {
                ZoneError::malformed_zone(format!("cannot hash {}: {e}", record.name))
            })?),
            OrderMode::Nsec3(_) => None,
        };

        out.push(Rectified {
            id: record.id,
            auth,
            ordername,
        });
    }
    Ok(out)
}

/// Outcome of one rectification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RectifyReport {
    pub zone: String,
    pub mode: OrderMode,
    pub records: usize,
    pub updated: usize,
    pub non_auth: usize,
}

/// Rectifies `domain` on `conn`. Only rows whose values change are
/// written.
pub async fn rectify_domain(conn: &mut SqliteConnection, domain: &Domain) -> Result<RectifyReport> {
    let records = record_repo::list_for_domain(&mut *conn, domain.id).await?;
    let metadata = metadata_repo::list_for_domain(&mut *conn, domain.id).await?;
    let keys = cryptokey_repo::count_for_domain(&mut *conn, domain.id).await?;

    let mode = ordering_mode(&domain.name, &metadata)?;
    debug!(zone = %domain.name, mode = %mode, dnssec_keys = keys, "rectifying zone");
    let computed = compute(&domain.name, &records, &mode)?;

    let mut updated = 0;
    for (record, new) in records
        .iter()
        .filter(|r| r.type_name.is_some())
        .zip(computed.iter())
    {
        if record.auth == Some(new.auth) && record.ordername == new.ordername {
            continue;
        }
        record_repo::set_auth_ordername(&mut *conn, new.id, new.auth, new.ordername.as_deref()).await?;
        updated += 1;
    }

    let report = RectifyReport {
        zone: domain.name.clone(),
        mode,
        records: computed.len(),
        updated,
        non_auth: computed.iter().filter(|r| !r.auth).count(),
    };
    debug!(zone = %report.zone, records = report.records, updated, non_auth = report.non_auth, "zone rectified");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::domain_repo::{self, DomainRow};
    use crate::db::record_repo::RecordRow;
    use crate::db::{init_memory_db, unix_now};

    const SOA: &str = "ns1.example.com hostmaster.example.com 1 10800 3600 604800 3600";

    fn rec(id: i64, name: &str, rtype: &str) -> Record {
        Record {
            id,
            domain_id: 1,
            name: name.into(),
            type_name: Some(rtype.into()),
            content: if rtype == "SOA" { SOA.into() } else { "x".into() },
            ttl: Some(3600),
            prio: None,
            change_date: None,
            ordername: None,
            auth: Some(true),
        }
    }

    fn meta(kind: &str, content: Option<&str>) -> DomainMetadata {
        DomainMetadata {
            id: 0,
            domain_id: 1,
            kind: kind.into(),
            content: content.map(str::to_string),
        }
    }

    fn delegation_zone() -> Vec<Record> {
        vec![
            rec(1, "example.com", "SOA"),
            rec(2, "example.com", "NS"),
            rec(3, "www.example.com", "A"),
            rec(4, "sub.example.com", "NS"),
            rec(5, "sub.example.com", "DS"),
            rec(6, "ns1.sub.example.com", "A"),
            rec(7, "foo.bar.example.com", "A"),
        ]
    }

    fn by_id(out: &[Rectified], id: i64) -> &Rectified {
        out.iter().find(|r| r.id == id).unwrap()
    }

    #[test]
    fn delegation_and_glue_are_not_authoritative() {
        let out = compute("example.com", &delegation_zone(), &OrderMode::Nsec).unwrap();
        assert!(by_id(&out, 2).auth, "apex NS");
        assert!(!by_id(&out, 4).auth, "delegation NS");
        assert!(by_id(&out, 5).auth, "DS at the cut");
        assert!(!by_id(&out, 6).auth, "glue below the cut");
        assert!(by_id(&out, 3).auth);
    }

    #[test]
    fn nsec_ordernames() {
        let out = compute("example.com", &delegation_zone(), &OrderMode::Nsec).unwrap();
        assert_eq!(by_id(&out, 1).ordername.as_deref(), Some(""));
        assert_eq!(by_id(&out, 3).ordername.as_deref(), Some("www"));
        assert_eq!(by_id(&out, 7).ordername.as_deref(), Some("bar foo"));
        assert_eq!(by_id(&out, 4).ordername.as_deref(), Some("sub"));
        assert_eq!(by_id(&out, 5).ordername.as_deref(), Some("sub"));
        assert_eq!(by_id(&out, 6).ordername, None);
    }

    #[test]
    fn nsec_ordernames_are_lowercase() {
        let records = vec![rec(1, "example.com", "SOA"), rec(2, "WWW.Example.com", "A")];
        let out = compute("example.com", &records, &OrderMode::Nsec).unwrap();
        assert_eq!(by_id(&out, 2).ordername.as_deref(), Some("www"));
    }

    #[test]
    fn narrow_mode_uses_empty_ordernames() {
        let out = compute("example.com", &delegation_zone(), &OrderMode::Nsec3Narrow).unwrap();
        assert!(out.iter().all(|r| r.ordername.as_deref() == Some("")));
        assert!(!by_id(&out, 6).auth);
    }

    #[test]
    fn nsec3_mode_hashes_authoritative_names() {
        let param: Nsec3Param = "1 0 12 aabbccdd".parse().unwrap();
        let records = vec![
            rec(1, "example", "SOA"),
            rec(2, "a.example", "A"),
            rec(3, "b.example", "NS"),
            rec(4, "ns1.b.example", "A"),
        ];
        let out = compute("example", &records, &OrderMode::Nsec3(param)).unwrap();
        assert_eq!(by_id(&out, 1).ordername.as_deref(), Some("0p9mhaveqvm6t7vbl5lop2u3t2rp3tom"));
        assert_eq!(by_id(&out, 2).ordername.as_deref(), Some("35mthgpgcu1qg68fab165klnsnk3dpvl"));
        assert_eq!(by_id(&out, 3).ordername, None);
        assert_eq!(by_id(&out, 4).ordername, None);
    }

    #[test]
    fn computing_twice_gives_the_same_result() {
        let zone = delegation_zone();
        let first = compute("example.com", &zone, &OrderMode::Nsec).unwrap();
        let applied: Vec<Record> = zone
            .into_iter()
            .zip(&first)
            .map(|(mut r, c)| {
                r.auth = Some(c.auth);
                r.ordername = c.ordername.clone();
                r
            })
            .collect();
        assert_eq!(compute("example.com", &applied, &OrderMode::Nsec).unwrap(), first);
    }

    #[test]
    fn untyped_rows_are_skipped() {
        let mut ent = rec(9, "a.b.example.com", "A");
        ent.type_name = None;
        let records = vec![rec(1, "example.com", "SOA"), ent];
        assert_eq!(compute("example.com", &records, &OrderMode::Nsec).unwrap().len(), 1);
    }

    #[test]
    fn missing_soa_is_fatal() {
        let records = vec![rec(2, "example.com", "NS")];
        assert!(matches!(
            compute("example.com", &records, &OrderMode::Nsec),
            Err(ZoneError::MissingSoa(_))
        ));
    }

    #[test]
    fn mode_selection() {
        assert_eq!(ordering_mode("z", &[]).unwrap(), OrderMode::Nsec);
        assert_eq!(ordering_mode("z", &[meta("SOA-EDIT", Some("INCEPTION"))]).unwrap(), OrderMode::Nsec);
        assert_eq!(
            ordering_mode("z", &[meta("NSEC3PARAM", Some("1 0 1 ab")), meta("NSEC3NARROW", Some("1"))]).unwrap(),
            OrderMode::Nsec3Narrow
        );
        assert!(matches!(
            ordering_mode("z", &[meta("NSEC3PARAM", Some("1 0 1 ab"))]).unwrap(),
            OrderMode::Nsec3(_)
        ));
    }

    #[test]
    fn unusable_nsec3param_is_a_configuration_error() {
        for content in [None, Some(""), Some("1 0 x ab"), Some("2 0 1 ab")] {
            let err = ordering_mode("example.com", &[meta("NSEC3PARAM", content)]).unwrap_err();
            assert!(matches!(err, ZoneError::Configuration { .. }), "{content:?}: {err}");
        }
    }

    #[tokio::test]
    async fn rectify_domain_persists_and_is_idempotent() {
        let db = init_memory_db().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let id = domain_repo::insert(
            &mut conn,
            &DomainRow {
                name: "example.com",
                ..DomainRow::default()
            },
        )
        .await
        .unwrap();
        for (name, rtype, content) in [
            ("example.com", RecordType::Soa, SOA),
            ("example.com", RecordType::Ns, "ns1.example.com"),
            ("sub.example.com", RecordType::Ns, "ns1.sub.example.com"),
            ("ns1.sub.example.com", RecordType::A, "192.0.2.1"),
        ] {
            record_repo::insert(
                &mut conn,
                &RecordRow {
                    domain_id: id,
                    name,
                    rtype,
                    content,
                    ttl: 3600,
                    prio: None,
                    change_date: unix_now(),
                },
            )
            .await
            .unwrap();
        }
        let domain = domain_repo::find_by_name(&mut conn, "example.com").await.unwrap().unwrap();

        let first = rectify_domain(&mut conn, &domain).await.unwrap();
        assert_eq!(first.records, 4);
        assert_eq!(first.non_auth, 2);
        let stored = record_repo::list_for_domain(&mut conn, id).await.unwrap();
        let glue = stored.iter().find(|r| r.name == "ns1.sub.example.com").unwrap();
        assert_eq!((glue.auth, glue.ordername.as_deref()), (Some(false), None));

        let second = rectify_domain(&mut conn, &domain).await.unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(record_repo::list_for_domain(&mut conn, id).await.unwrap(), stored);

        // A broken NSEC3 configuration fails without touching stored values.
        metadata_repo::upsert(&mut conn, id, MetadataKind::Nsec3Param, Some("1 0 1 zz"))
            .await
            .unwrap();
        assert!(rectify_domain(&mut conn, &domain).await.is_err());
        assert_eq!(record_repo::list_for_domain(&mut conn, id).await.unwrap(), stored);
    }
}
