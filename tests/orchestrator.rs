use tempfile::TempDir;
use zonekeeper::config::AppConfig;
use zonekeeper::db::{self, domain_repo, metadata_repo::MetadataKind, record_repo};
use zonekeeper::rr::RecordType;
use zonekeeper::zones::RecordInput;
use zonekeeper::{ZoneError, ZoneManager};

const ZONE: &str = "; example.com, hand written\r\n\
$ORIGIN example.com.\r\n\
$TTL 1h\r\n\
@       IN SOA ns1 hostmaster (\r\n\
            2024010100 ; serial\r\n\
            3h 1h 1w 5m )\r\n\
        IN NS  ns1\r\n\
        IN NS  ns2.example.net.\r\n\
        IN MX  10 mail\r\n\
ns1     IN A   192.0.2.1\r\n\
mail    IN A   192.0.2.25\r\n\
        IN AAAA 2001:db8::25\r\n\
_sip._tcp IN SRV 0 5 5060 sip\r\n\
sip     IN CNAME mail\r\n\
txt     IN TXT \"v=spf1 mx -all\"\r\n\
sub     IN NS  ns1.sub\r\n\
        IN DS  12345 8 2 ABCDEF0123456789\r\n\
ns1.sub IN A   192.0.2.53\r\n";

async fn manager(dir: &TempDir) -> (ZoneManager, db::Db) {
    let db = db::init_db(&dir.path().join("pdns.sqlite3")).await.unwrap();
    (ZoneManager::new(db.clone(), AppConfig::default()), db)
}

async fn records(db: &db::Db, origin: &str) -> Vec<record_repo::Record> {
    let mut conn = db.acquire().await.unwrap();
    let domain = domain_repo::find_by_name(&mut conn, origin).await.unwrap().unwrap();
    record_repo::list_for_domain(&mut conn, domain.id).await.unwrap()
}

fn find<'a>(records: &'a [record_repo::Record], name: &str, rtype: RecordType) -> &'a record_repo::Record {
    records
        .iter()
        .find(|r| r.name == name && r.is(rtype))
        .unwrap_or_else(|| panic!("no {rtype} at {name}"))
}

#[tokio::test]
async fn import_export_reimport() {
    let dir = TempDir::new().unwrap();
    let (mgr, db) = manager(&dir).await;

    mgr.import_zone_text(None, ZONE, false).await.unwrap();
    let first = records(&db, "example.com").await;
    assert_eq!(first.len(), 13);

    let soa = find(&first, "example.com", RecordType::Soa);
    assert_eq!(
        soa.content,
        "ns1.example.com hostmaster.example.com 2024010100 10800 3600 604800 300"
    );
    assert_eq!(find(&first, "_sip._tcp.example.com", RecordType::Srv).prio, Some(0));
    assert_eq!(find(&first, "txt.example.com", RecordType::Txt).content, "v=spf1 mx -all");

    assert_eq!(find(&first, "sub.example.com", RecordType::Ns).auth, Some(false));
    assert_eq!(find(&first, "sub.example.com", RecordType::Ds).auth, Some(true));
    let glue = find(&first, "ns1.sub.example.com", RecordType::A);
    assert_eq!((glue.auth, glue.ordername.as_deref()), (Some(false), None));
    assert_eq!(
        find(&first, "_sip._tcp.example.com", RecordType::Srv).ordername.as_deref(),
        Some("_tcp _sip")
    );

    let text = mgr.export_zone_text("example.com").await.unwrap();
    assert!(text.starts_with("$ORIGIN example.com.\n"));

    mgr.delete_zone("example.com").await.unwrap();
    mgr.import_zone_text(Some("example.com"), &text, false).await.unwrap();
    let second = records(&db, "example.com").await;

    let key = |r: &record_repo::Record| {
        (
            r.name.clone(),
            r.type_name.clone(),
            r.content.clone(),
            r.ttl,
            r.prio,
            r.auth,
            r.ordername.clone(),
        )
    };
    let mut a: Vec<_> = first.iter().map(key).collect();
    let mut b: Vec<_> = second.iter().map(key).collect();
    a.sort();
    b.sort();
    assert_eq!(a, b);
    assert_eq!(mgr.export_zone_text("example.com").await.unwrap(), text);
}

#[tokio::test]
async fn edits_bump_serial_and_nsec3_rectifies() {
    let dir = TempDir::new().unwrap();
    let (mgr, db) = manager(&dir).await;
    mgr.import_zone_text(None, ZONE, false).await.unwrap();

    mgr.save_record(
        "example.com",
        RecordInput {
            id: None,
            name: "new.example.com".into(),
            rtype: RecordType::A,
            content: "192.0.2.77".into(),
            ttl: None,
            prio: None,
        },
    )
    .await
    .unwrap();
    let soa = find(&records(&db, "example.com").await, "example.com", RecordType::Soa).clone();
    let serial: u32 = soa.content.split_whitespace().nth(2).unwrap().parse().unwrap();
    assert!(serial > 2024010100);

    mgr.set_metadata("example.com", MetadataKind::Nsec3Param, Some("1 0 12 aabbccdd"))
        .await
        .unwrap();
    let report = mgr.rectify_zone("example.com").await.unwrap();
    assert_eq!(report.updated, 0, "set_metadata already rectified");

    let stored = records(&db, "example.com").await;
    for record in &stored {
        match record.auth {
            Some(true) => assert_eq!(record.ordername.as_ref().map(String::len), Some(32), "{record:?}"),
            _ => assert_eq!(record.ordername, None, "{record:?}"),
        }
    }
    let apex_hash = &find(&stored, "example.com", RecordType::Soa).ordername;
    assert_eq!(apex_hash, &find(&stored, "example.com", RecordType::Mx).ordername);
    assert_eq!(find(&stored, "example.com", RecordType::Soa).content, soa.content);
}

#[tokio::test]
async fn errors_are_typed() {
    let dir = TempDir::new().unwrap();
    let (mgr, _db) = manager(&dir).await;

    assert!(matches!(
        mgr.import_zone_text(None, "@ IN A 192.0.2.1\n", false).await,
        Err(ZoneError::UnknownOrigin)
    ));
    assert!(matches!(
        mgr.import_zone_text(None, "$ORIGIN example.com.\n@ IN NS ns1\n", false).await,
        Err(ZoneError::MissingSoa(_))
    ));
    assert!(matches!(
        mgr.rectify_zone("example.com").await,
        Err(ZoneError::ZoneNotFound(_))
    ));

    mgr.import_zone_text(None, ZONE, false).await.unwrap();
    let err = mgr.import_zone_text(None, ZONE, false).await.unwrap_err();
    assert!(matches!(err, ZoneError::ZoneExists(_)));
    assert!(err.to_string().contains("example.com"));
}
