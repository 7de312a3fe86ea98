//! AXFR client: pulls a whole zone over TCP and turns the answer
//! records into the same [`ParsedZone`] a zone file import produces.
mod wire;

use std::net::{IpAddr, SocketAddr};

use rand_core::{OsRng, RngCore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use trust_dns_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{DNSClass, Name, RData, Record, RecordType as WireType};
use trust_dns_proto::serialize::binary::BinEncodable;

use crate::config::AppConfig;
use crate::error::{Result, ZoneError};
use crate::name;
use crate::rr::RecordType;
use crate::rr::content::{RecordContent, Soa};
use crate::zone_file::rdata::{self, StoredRdata};
use crate::zone_file::{ParsedZone, ZoneRecord};

const DNS_PORT: u16 = 53;

/// Transfers `origin` from `nameserver` (an IP address, `ip:port`, or a
/// host name) within the configured connect and lifetime budgets.
pub async fn fetch(origin: &str, nameserver: &str, config: &AppConfig) -> Result<ParsedZone> {
    let origin = config.normalize_name(origin);
    if origin.is_empty() {
        return Err(ZoneError::UnknownOrigin);
    }
    let qname = Name::from_ascii(format!("{origin}."))
        .map_err(|e| ZoneError::malformed_zone(format!("origin {origin:?} is not a valid name: {e}")))?;

    info!(zone = %origin, server = %nameserver, "starting zone transfer");
    let answers = timeout(config.axfr.lifetime, transfer(&origin, nameserver, qname, config))
        .await
        .map_err(|_| {
            ZoneError::transfer_failed(
                &origin,
                nameserver,
                format!("no complete answer within {:?}", config.axfr.lifetime),
            )
        })??;

    let mut records = Vec::with_capacity(answers.len());
    for answer in &answers {
        if let Some(record) = to_zone_record(answer, &origin, config)? {
            records.push(record);
        }
    }
    let zone = ParsedZone { origin, records };
    zone.validate()?;
    info!(zone = %zone.origin, records = zone.records.len(), "zone transfer complete");
    Ok(zone)
}

fn server_address(nameserver: &str) -> String {
    if let Ok(addr) = nameserver.parse::<SocketAddr>() {
        return addr.to_string();
    }
    match nameserver.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, DNS_PORT).to_string(),
        Err(_) => format!("{nameserver}:{DNS_PORT}"),
    }
}

/// Runs the query/response exchange and returns the answer records
/// between the opening and closing SOA, the opening SOA included.
async fn transfer(origin: &str, nameserver: &str, qname: Name, config: &AppConfig) -> Result<Vec<Record>> {
    let failed = |reason: String| ZoneError::transfer_failed(origin, nameserver, reason);

    let mut stream = timeout(config.axfr.connect_timeout, TcpStream::connect(server_address(nameserver)))
        .await
        .map_err(|_| failed(format!("connect timed out after {:?}", config.axfr.connect_timeout)))?
        .map_err(|e| failed(format!("connect failed: {e}")))?;

    let mut query = Message::new();
    query.set_id((OsRng.next_u32() & 0xffff) as u16);
    query.set_message_type(MessageType::Query);
    query.set_op_code(OpCode::Query);
    query.add_query(Query::query(qname, WireType::AXFR));
    let payload = query
        .to_vec()
        .map_err(|e| failed(format!("cannot encode query: {e}")))?;
    let len = u16::try_from(payload.len()).map_err(|_| failed("query too large".into()))?;

    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&payload);
    stream
        .write_all(&framed)
        .await
        .map_err(|e| failed(format!("write failed: {e}")))?;

    let mut records: Vec<Record> = Vec::new();
    let mut messages = 0usize;
    loop {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(if records.is_empty() {
                    ZoneError::malformed_zone(format!("empty transfer response for {origin}"))
                } else {
                    ZoneError::malformed_zone(format!("transfer of {origin} ended before the closing SOA"))
                });
            }
            Err(e) => return Err(failed(format!("read failed: {e}"))),
        }
        let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| failed(format!("read failed: {e}")))?;
        messages += 1;

        let response = Message::from_vec(&buf)
            .map_err(|e| ZoneError::malformed_zone(format!("undecodable transfer message: {e}")))?;
        if response.id() != query.id() {
            return Err(ZoneError::malformed_zone(format!(
                "response id {} does not match query id {}",
                response.id(),
                query.id()
            )));
        }
        if response.response_code() != ResponseCode::NoError {
            return Err(failed(format!("server answered {}", response.response_code())));
        }

        for answer in response.answers() {
            let is_soa = answer.record_type() == WireType::SOA;
            if records.is_empty() && !is_soa {
                return Err(ZoneError::malformed_zone(format!(
                    "transfer of {origin} does not start with an SOA"
                )));
            }
            if is_soa && !records.is_empty() {
                debug!(zone = %origin, messages, records = records.len(), "closing SOA received");
                return Ok(records);
            }
            records.push(answer.clone());
        }
    }
}

/// Absolute name without the trailing dot; the root stays ".".
fn name_text(name: &Name) -> String {
    match name::strip_root(&name.to_ascii()) {
        "" => ".".to_string(),
        stripped => stripped.to_string(),
    }
}

/// Builds the stored form of one transferred record. Records of types
/// that are unsupported, disabled or unrenderable come back as `None`.
fn to_zone_record(record: &Record, origin: &str, config: &AppConfig) -> Result<Option<ZoneRecord>> {
    let owner = config.normalize_name(&name_text(record.name()));
    let Some(rtype) = RecordType::from_code(u16::from(record.record_type())) else {
        warn!(owner = %owner, rtype = %record.record_type(), "skipping transferred record of unsupported type");
        return Ok(None);
    };
    if !config.is_enabled(rtype) {
        warn!(owner = %owner, rtype = %rtype, "skipping transferred record of disabled type");
        return Ok(None);
    }
    if record.dns_class() != DNSClass::IN {
        return Err(ZoneError::malformed_zone(format!(
            "{owner} {rtype} has class {}",
            record.dns_class()
        )));
    }
    let data = record
        .data()
        .ok_or_else(|| ZoneError::malformed_zone(format!("{owner} {rtype} has no data")))?;
    let stored = stored_rdata(rtype, data, origin)
        .map_err(|reason| ZoneError::malformed_zone(format!("{owner} {rtype}: {reason}")))?;
    let Some(StoredRdata { content, prio }) = stored else {
        warn!(owner = %owner, rtype = %rtype, "skipping transferred record without a text rendering");
        return Ok(None);
    };

    Ok(Some(ZoneRecord {
        name: owner,
        rtype,
        content,
        ttl: Some(record.ttl()),
        prio,
    }))
}

fn timer(value: i32, what: &str) -> std::result::Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("SOA {what} {value} is negative"))
}

fn stored_rdata(rtype: RecordType, data: &RData, origin: &str) -> std::result::Result<Option<StoredRdata>, String> {
    let typed = match (rtype, data) {
        (RecordType::Soa, RData::SOA(soa)) => RecordContent::Soa(Soa {
            primary: name_text(soa.mname()),
            hostmaster: name_text(soa.rname()),
            serial: soa.serial(),
            refresh: timer(soa.refresh(), "refresh")?,
            retry: timer(soa.retry(), "retry")?,
            expire: timer(soa.expire(), "expire")?,
            minimum: soa.minimum(),
        }),
        (RecordType::Ns, RData::NS(ns)) => RecordContent::Ns(name_text(&ns.0)),
        (RecordType::Cname, RData::CNAME(cname)) => RecordContent::Cname(name_text(&cname.0)),
        (RecordType::Ptr, RData::PTR(ptr)) => RecordContent::Ptr(name_text(&ptr.0)),
        (RecordType::Mx, RData::MX(mx)) => {
            let content = RecordContent::Mx {
                exchange: name_text(mx.exchange()),
            };
            return Ok(Some(StoredRdata {
                content: content.compose(),
                prio: Some(u32::from(mx.preference())),
            }));
        }
        (RecordType::Srv, RData::SRV(srv)) => {
            let content = RecordContent::Srv {
                weight: srv.weight(),
                port: srv.port(),
                target: name_text(srv.target()),
            };
            return Ok(Some(StoredRdata {
                content: content.compose(),
                prio: Some(u32::from(srv.priority())),
            }));
        }
        (RecordType::A, RData::A(a)) => RecordContent::A(a.0.to_string()),
        (RecordType::Aaaa, RData::AAAA(aaaa)) => RecordContent::Aaaa(aaaa.0.to_string()),
        (RecordType::Txt, RData::TXT(txt)) => RecordContent::Txt(
            txt.txt_data()
                .iter()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect(),
        ),
        (
            RecordType::Soa
            | RecordType::Ns
            | RecordType::Cname
            | RecordType::Ptr
            | RecordType::Mx
            | RecordType::Srv
            | RecordType::A
            | RecordType::Aaaa
            | RecordType::Txt,
            other,
        ) => return Err(format!("unexpected data {other}")),
        (opaque, other) => {
            let bytes = other.to_bytes().map_err(|e| format!("cannot encode data: {e}"))?;
            let Some(text) = wire::presentation(opaque, &bytes)? else {
                return Ok(None);
            };
            return rdata::build_text(opaque, &text, origin).map(Some);
        }
    };
    Ok(Some(StoredRdata {
        content: typed.compose(),
        prio: None,
    }))
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use trust_dns_proto::rr::rdata::NULL;

    use super::test_server::{name, serve, soa, zone_body};
    use super::*;
    use crate::config::AxfrConfig;

    #[tokio::test]
    async fn transfers_a_zone_split_over_messages() {
        let mut first = vec![soa()];
        first.extend(zone_body().into_iter().take(2));
        let mut second: Vec<Record> = zone_body().into_iter().skip(2).collect();
        second.push(soa());
        let addr = serve(ResponseCode::NoError, vec![first, second]).await;

        let zone = fetch("example.com", &addr.to_string(), &AppConfig::default())
            .await
            .unwrap();
        assert_eq!(zone.origin, "example.com");
        assert_eq!(zone.records.len(), 5);
        assert_eq!(zone.soa_fields().unwrap().serial, 2024010100);

        let mx = zone.records.iter().find(|r| r.rtype == RecordType::Mx).unwrap();
        assert_eq!((mx.content.as_str(), mx.prio), ("mail.example.com", Some(10)));
        let txt = zone.records.iter().find(|r| r.rtype == RecordType::Txt).unwrap();
        assert_eq!(txt.content, "v=spf1 -all");
        let glue = zone.records.iter().find(|r| r.rtype == RecordType::A).unwrap();
        assert_eq!((glue.name.as_str(), glue.ttl), ("ns1.example.com", Some(300)));
    }

    #[tokio::test]
    async fn dnssec_and_spf_data_arrive_in_presentation_form() {
        let mut ds = vec![0xec, 0x45, 5, 1];
        ds.extend([
            0x2b, 0xb1, 0x83, 0xaf, 0x5f, 0x22, 0x58, 0x81, 0x79, 0xa5, 0x3b, 0x0a, 0x98, 0x63, 0x1f, 0xad, 0x1a,
            0x29, 0x21, 0x18,
        ]);
        let mut answers = vec![soa()];
        answers.extend(zone_body().into_iter().take(1));
        answers.push(Record::from_rdata(
            name("sub.example.com."),
            3600,
            RData::Unknown {
                code: u16::from(WireType::DS),
                rdata: NULL::with(ds),
            },
        ));
        answers.push(Record::from_rdata(
            name("example.com."),
            300,
            RData::Unknown {
                code: u16::from(WireType::from(99)),
                rdata: NULL::with(b"\x09v=spf1 mx\x04-all".to_vec()),
            },
        ));
        answers.push(Record::from_rdata(
            name("example.com."),
            300,
            RData::MX(trust_dns_proto::rr::rdata::MX::new(0, Name::root())),
        ));
        answers.push(soa());
        let addr = serve(ResponseCode::NoError, vec![answers]).await;

        let zone = fetch("example.com", &addr.to_string(), &AppConfig::default())
            .await
            .unwrap();
        let ds = zone.records.iter().find(|r| r.rtype == RecordType::Ds).unwrap();
        assert_eq!(ds.name, "sub.example.com");
        assert_eq!(ds.content, "60485 5 1 2bb183af5f22588179a53b0a98631fad1a292118");
        let spf = zone.records.iter().find(|r| r.rtype == RecordType::Spf).unwrap();
        assert_eq!(spf.content, "v=spf1 mx -all");
        let mx = zone.records.iter().find(|r| r.rtype == RecordType::Mx).unwrap();
        assert_eq!((mx.content.as_str(), mx.prio), (".", Some(0)));
    }

    #[tokio::test]
    async fn refusal_is_a_transfer_failure() {
        let addr = serve(ResponseCode::Refused, vec![vec![]]).await;
        let err = fetch("example.com", &addr.to_string(), &AppConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ZoneError::TransferFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_closing_soa_is_malformed() {
        let mut only = vec![soa()];
        only.extend(zone_body());
        let addr = serve(ResponseCode::NoError, vec![only]).await;
        let err = fetch("example.com", &addr.to_string(), &AppConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ZoneError::MalformedZone(_)), "{err}");
    }

    #[tokio::test]
    async fn silent_server_hits_the_lifetime() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });
        let config = AppConfig {
            axfr: AxfrConfig {
                connect_timeout: Duration::from_millis(200),
                lifetime: Duration::from_millis(300),
            },
            ..AppConfig::default()
        };
        let err = fetch("example.com", &addr.to_string(), &config).await.unwrap_err();
        assert!(matches!(err, ZoneError::TransferFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn empty_origin_is_unknown() {
        let err = fetch(".", "127.0.0.1", &AppConfig::default()).await.unwrap_err();
        assert!(matches!(err, ZoneError::UnknownOrigin));
    }

    #[test]
    fn nameserver_forms() {
        assert_eq!(server_address("192.0.2.1"), "192.0.2.1:53");
        assert_eq!(server_address("192.0.2.1:5353"), "192.0.2.1:5353");
        assert_eq!(server_address("2001:db8::1"), "[2001:db8::1]:53");
        assert_eq!(server_address("ns1.example.net"), "ns1.example.net:53");
    }
}
