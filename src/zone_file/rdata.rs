//! Conversion of zone file RDATA fields into stored content.

use std::net::{Ipv4Addr, Ipv6Addr};

use super::lexer::{self, Field};
use crate::name;
use crate::rr::RecordType;
use crate::rr::content::{RecordContent, Soa};

/// Record data in storage form: content column plus `prio`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredRdata {
    pub content: String,
    pub prio: Option<u32>,
}

impl StoredRdata {
    fn plain(content: RecordContent) -> Self {
        Self {
            content: content.compose(),
            prio: None,
        }
    }
}

/// Turns a presentation-format name into an absolute name without the
/// trailing dot. `@` is the origin; names without a trailing dot are
/// relative to `origin`.
pub(crate) fn absolute_name(text: &str, origin: Option<&str>) -> Option<String> {
    if text == "@" {
        return origin.map(str::to_string);
    }
    let stripped = name::strip_root(text);
    if stripped.len() != text.len() || text == "." {
        return Some(stripped.to_string());
    }
    match origin {
        Some("") => Some(text.to_string()),
        Some(origin) => Some(format!("{text}.{origin}")),
        None => None,
    }
}

/// Parses a TTL in seconds or BIND unit notation (`1h30m`, `2D`).
pub(crate) fn parse_ttl(text: &str) -> Option<u32> {
    if let Ok(secs) = text.parse::<u32>() {
        return Some(secs);
    }
    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit: u64 = match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return None,
        };
        let value: u64 = digits.parse().ok()?;
        total = value.checked_mul(unit).and_then(|v| total.checked_add(v))?;
        digits.clear();
    }
    if !digits.is_empty() || text.is_empty() {
        return None;
    }
    u32::try_from(total).ok()
}

/// Builds stored content for one record from its RDATA fields.
pub(crate) fn build(
    rtype: RecordType,
    fields: &[Field],
    origin: &str,
) -> Result<StoredRdata, String> {
    let texts: Vec<&str> = fields.iter().map(|f| f.text.as_str()).collect();
    let name_at = |idx: usize, what: &str| -> Result<String, String> {
        let text = texts.get(idx).ok_or_else(|| format!("{rtype} is missing its {what}"))?;
        match absolute_name(text, Some(origin)) {
            Some(name) if name.is_empty() => Ok(".".to_string()),
            Some(name) => Ok(name),
            None => Err(format!("bad {what} {text:?}")),
        }
    };
    let number_at = |idx: usize, what: &str| -> Result<u32, String> {
        let text = texts.get(idx).ok_or_else(|| format!("{rtype} is missing its {what}"))?;
        text.parse::<u32>()
            .map_err(|_| format!("{rtype} {what} {text:?} is not a number"))
    };
    let expect_len = |n: usize| -> Result<(), String> {
        if texts.len() == n {
            Ok(())
        } else {
            Err(format!("{rtype} expects {n} fields, found {}", texts.len()))
        }
    };

    let rdata = match rtype {
        RecordType::Soa => {
            expect_len(7)?;
            let timer = |idx: usize, what: &str| {
                parse_ttl(texts[idx]).ok_or_else(|| format!("SOA {what} {:?} is not a number", texts[idx]))
            };
            StoredRdata::plain(RecordContent::Soa(Soa {
                primary: name_at(0, "primary nameserver")?,
                hostmaster: name_at(1, "hostmaster")?,
                serial: number_at(2, "serial")?,
                refresh: timer(3, "refresh")?,
                retry: timer(4, "retry")?,
                expire: timer(5, "expire")?,
                minimum: timer(6, "minimum")?,
            }))
        }
        RecordType::Ns => {
            expect_len(1)?;
            StoredRdata::plain(RecordContent::Ns(name_at(0, "nameserver")?))
        }
        RecordType::Cname => {
            expect_len(1)?;
            StoredRdata::plain(RecordContent::Cname(name_at(0, "target")?))
        }
        RecordType::Ptr => {
            expect_len(1)?;
            StoredRdata::plain(RecordContent::Ptr(name_at(0, "target")?))
        }
        RecordType::Mx => {
            expect_len(2)?;
            let preference = number_at(0, "preference")?;
            if preference > u32::from(u16::MAX) {
                return Err(format!("MX preference {preference} is out of range"));
            }
            StoredRdata {
                content: RecordContent::Mx {
                    exchange: name_at(1, "exchange")?,
                }
                .compose(),
                prio: Some(preference),
            }
        }
        RecordType::Srv => {
            expect_len(4)?;
            let port16 = |idx: usize, what: &str| -> Result<u16, String> {
                u16::try_from(number_at(idx, what)?).map_err(|_| format!("SRV {what} is out of range"))
            };
            let priority = port16(0, "priority")?;
            StoredRdata {
                content: RecordContent::Srv {
                    weight: port16(1, "weight")?,
                    port: port16(2, "port")?,
                    target: name_at(3, "target")?,
                }
                .compose(),
                prio: Some(u32::from(priority)),
            }
        }
        RecordType::A => {
            expect_len(1)?;
            let addr: Ipv4Addr = texts[0]
                .parse()
                .map_err(|_| format!("invalid IPv4 address {:?}", texts[0]))?;
            StoredRdata::plain(RecordContent::A(addr.to_string()))
        }
        RecordType::Aaaa => {
            expect_len(1)?;
            let addr: Ipv6Addr = texts[0]
                .parse()
                .map_err(|_| format!("invalid IPv6 address {:?}", texts[0]))?;
            StoredRdata::plain(RecordContent::Aaaa(addr.to_string()))
        }
        RecordType::Txt | RecordType::Spf => {
            if fields.is_empty() {
                return Err(format!("{rtype} needs at least one character-string"));
            }
            let strings = fields
                .iter()
                .map(|f| lexer::unescape(&f.text).ok_or_else(|| format!("bad escape in {:?}", f.text)))
                .collect::<Result<Vec<_>, _>>()?;
            StoredRdata::plain(if rtype == RecordType::Txt {
                RecordContent::Txt(strings)
            } else {
                RecordContent::Spf(strings)
            })
        }
        opaque => {
            if fields.is_empty() {
                return Err(format!("{opaque} record has no data"));
            }
            let name_fields = opaque.opaque_name_fields();
            let parts = fields
                .iter()
                .enumerate()
                .map(|(idx, field)| {
                    if field.quoted {
                        Ok(format!("\"{}\"", field.text))
                    } else if name_fields.contains(&idx) {
                        name_at(idx, "name field")
                    } else {
                        Ok(field.text.clone())
                    }
                })
                .collect::<Result<Vec<_>, String>>()?;
            StoredRdata::plain(RecordContent::Opaque(opaque, parts.join(" ")))
        }
    };
    Ok(rdata)
}

/// [`build`] for RDATA given as one line of presentation text.
pub(crate) fn build_text(rtype: RecordType, text: &str, origin: &str) -> Result<StoredRdata, String> {
    let lines = lexer::tokenize(text).map_err(|e| e.to_string())?;
    match lines.as_slice() {
        [] => build(rtype, &[], origin),
        [line] => build(rtype, &line.fields, origin),
        _ => Err(format!("{rtype} data spans several lines")),
    }
}
