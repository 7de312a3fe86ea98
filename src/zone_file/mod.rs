//! RFC 1035 master-file parsing and serialization.
//!
//! [`parse_zone`] turns zone text into a [`ParsedZone`] whose records
//! carry content in the stored PowerDNS layout (see
//! [`crate::rr::content`]); [`serialize`] goes the other way.

mod lexer;
pub(crate) mod rdata;
mod writer;

use tracing::warn;

use crate::config::AppConfig;
use crate::error::{Result, ZoneError};
use crate::name;
use crate::rr::RecordType;
use crate::rr::content::{RecordContent, Soa};

pub use writer::serialize;

/// One record as produced by a parser or loaded for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Fully qualified owner, no trailing dot.
    pub name: String,
    pub rtype: RecordType,
    /// Content in the stored layout; MX/SRV priority excluded.
    pub content: String,
    pub ttl: Option<u32>,
    pub prio: Option<u32>,
}

/// A zone's origin and its records, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedZone {
    pub origin: String,
    pub records: Vec<ZoneRecord>,
}

impl ParsedZone {
    pub fn soa(&self) -> Option<&ZoneRecord> {
        self.records.iter().find(|r| r.rtype == RecordType::Soa)
    }

    /// The decomposed SOA of the zone.
    pub fn soa_fields(&self) -> Result<Soa> {
        let soa = self
            .soa()
            .ok_or_else(|| ZoneError::MissingSoa(self.origin.clone()))?;
        Ok(Soa::from_content(&soa.content)?)
    }

    /// Replaces the SOA serial, leaving every other field untouched.
    pub fn set_serial(&mut self, serial: u32) -> Result<()> {
        let fields = self.soa_fields()?;
        let content = RecordContent::Soa(Soa { serial, ..fields }).compose();
        if let Some(soa) = self.records.iter_mut().find(|r| r.rtype == RecordType::Soa) {
            soa.content = content;
        }
        Ok(())
    }

    /// Checks the structural preconditions of a zone: every owner inside
    /// the origin, exactly one SOA and it sits at the apex, at least one
    /// apex NS.
    pub fn validate(&self) -> Result<()> {
        if let Some(outside) = self
            .records
            .iter()
            .find(|r| !name::is_in_zone(&r.name, &self.origin))
        {
            return Err(ZoneError::malformed_zone(format!(
                "{} {} is outside zone {}",
                outside.name, outside.rtype, self.origin
            )));
        }

        let apex = name::key(&self.origin);
        let soas: Vec<&ZoneRecord> = self
            .records
            .iter()
            .filter(|r| r.rtype == RecordType::Soa)
            .collect();
        match soas.as_slice() {
            [] => return Err(ZoneError::MissingSoa(self.origin.clone())),
            [soa] if name::key(&soa.name) != apex => {
                return Err(ZoneError::malformed_zone(format!(
                    "SOA of {} is owned by {} instead of the apex",
                    self.origin, soa.name
                )));
            }
            [_] => {}
            more => {
                return Err(ZoneError::malformed_zone(format!(
                    "zone {} has {} SOA records",
                    self.origin,
                    more.len()
                )));
            }
        }
        self.soa_fields()?;

        let has_apex_ns = self
            .records
            .iter()
            .any(|r| r.rtype == RecordType::Ns && name::key(&r.name) == apex);
        if !has_apex_ns {
            return Err(ZoneError::MissingApexNs(self.origin.clone()));
        }
        Ok(())
    }

    /// Gives every record without a TTL the SOA minimum; the SOA itself
    /// falls back to its own minimum too.
    fn fill_ttls(&mut self) -> Result<()> {
        let minimum = self.soa_fields()?.minimum;
        for record in self.records.iter_mut().filter(|r| r.ttl.is_none()) {
            record.ttl = Some(minimum);
        }
        Ok(())
    }
}

/// Parses zone text into a validated [`ParsedZone`].
///
/// The origin is `origin_hint` when given, otherwise the first
/// `$ORIGIN` directive, otherwise the first fully qualified owner name.
pub fn parse_zone(origin_hint: Option<&str>, text: &str, config: &AppConfig) -> Result<ParsedZone> {
    let text = text.replace("\r\n", "\n");
    let lines = lexer::tokenize(&text).map_err(|e| ZoneError::malformed_zone(e.to_string()))?;

    let origin = match origin_hint {
        Some(hint) => Some(config.normalize_name(hint)),
        None => discover_origin(&lines).map(|o| config.normalize_name(&o)),
    }
    .filter(|o| !o.is_empty())
    .ok_or(ZoneError::UnknownOrigin)?;

    let mut current_origin = origin.clone();
    let mut default_ttl: Option<u32> = None;
    let mut last_owner: Option<String> = None;
    let mut records = Vec::new();

    for line in &lines {
        let at = |msg: String| ZoneError::malformed_zone(format!("{msg} at line {}", line.line));
        let first = &line.fields[0];

        if !line.indented && !first.quoted && first.text.starts_with('$') {
            let arg = line.fields.get(1).map(|f| f.text.as_str());
            match first.text.to_ascii_uppercase().as_str() {
                "$ORIGIN" => {
                    let arg = arg.ok_or_else(|| at("$ORIGIN without a name".into()))?;
                    let next = rdata::absolute_name(arg, Some(&current_origin))
                        .ok_or_else(|| at(format!("bad $ORIGIN {arg:?}")))?;
                    current_origin = config.normalize_name(&next);
                }
                "$TTL" => {
                    let arg = arg.ok_or_else(|| at("$TTL without a value".into()))?;
                    default_ttl =
                        Some(rdata::parse_ttl(arg).ok_or_else(|| at(format!("bad $TTL {arg:?}")))?);
                }
                other => return Err(at(format!("unsupported directive {other}"))),
            }
            continue;
        }

        let mut fields = line.fields.as_slice();
        let owner = if line.indented {
            last_owner
                .clone()
                .ok_or_else(|| at("record without an owner name".into()))?
        } else {
            let owner = rdata::absolute_name(&first.text, Some(&current_origin))
                .ok_or_else(|| at(format!("bad owner name {:?}", first.text)))?;
            fields = &fields[1..];
            config.normalize_name(&owner)
        };
        last_owner = Some(owner.clone());

        let mut ttl = None;
        let mut class_seen = false;
        while let Some(field) = fields.first() {
            let as_ttl = ttl.is_none().then(|| rdata::parse_ttl(&field.text)).flatten();
            if as_ttl.is_some() {
                ttl = as_ttl;
            } else if !class_seen && is_class(&field.text) {
                if !field.text.eq_ignore_ascii_case("IN") {
                    return Err(at(format!("class {} is not supported", field.text)));
                }
                class_seen = true;
            } else {
                break;
            }
            fields = &fields[1..];
        }

        let Some((type_field, rdata_fields)) = fields.split_first() else {
            return Err(at(format!("record for {owner} has no type")));
        };
        let rtype = match type_field.text.parse::<RecordType>() {
            Ok(rtype) if config.is_enabled(rtype) => rtype,
            Ok(rtype) => {
                warn!(owner = %owner, rtype = %rtype, line = line.line, "skipping record of disabled type");
                continue;
            }
            Err(err) => {
                warn!(owner = %owner, line = line.line, "skipping record: {err}");
                continue;
            }
        };

        let stored = rdata::build(rtype, rdata_fields, &current_origin)
            .map_err(|msg| at(format!("{owner} {rtype}: {msg}")))?;
        records.push(ZoneRecord {
            name: owner,
            rtype,
            content: stored.content,
            ttl: ttl.or(default_ttl),
            prio: stored.prio,
        });
    }

    let mut zone = ParsedZone { origin, records };
    zone.validate()?;
    zone.fill_ttls()?;
    Ok(zone)
}

fn is_class(text: &str) -> bool {
    ["IN", "CH", "CS", "HS"]
        .iter()
        .any(|class| class.eq_ignore_ascii_case(text))
}

/// First `$ORIGIN` argument or first absolute owner, whichever comes
/// first.
fn discover_origin(lines: &[lexer::LogicalLine]) -> Option<String> {
    lines.iter().filter(|l| !l.indented).find_map(|line| {
        let first = &line.fields[0].text;
        if first.eq_ignore_ascii_case("$ORIGIN") {
            let arg = &line.fields.get(1)?.text;
            return rdata::absolute_name(arg, None);
        }
        if first.starts_with('$') || first == "@" {
            return None;
        }
        let absolute = name::strip_root(first);
        (absolute.len() != first.len()).then(|| absolute.to_string())
    })
}
