use std::cmp::Ordering;
use std::fmt::Write as _;

use super::{ZoneRecord, lexer};
use crate::error::Result;
use crate::name;
use crate::rr::RecordType;
use crate::rr::content::{ContentError, RecordContent};

/// Renders records as zone text under an explicit `$ORIGIN` header.
///
/// Lines are grouped by owner, apex first and the rest in canonical
/// order, with SOA then NS leading each group. The output depends only
/// on the set of records, not on their order in `records`.
pub fn serialize(origin: &str, records: &[ZoneRecord]) -> Result<String> {
    let mut sorted: Vec<&ZoneRecord> = records.iter().collect();
    let apex = name::key(origin);
    sorted.sort_by(|a, b| compare(&apex, a, b));

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "$ORIGIN {}", fqdn(origin));
    for record in sorted {
        let rdata = render_rdata(record)?;
        let _ = write!(out, "{}", fqdn(&record.name));
        if let Some(ttl) = record.ttl {
            let _ = write!(out, " {ttl}");
        }
        let _ = write!(out, " IN {}", record.rtype);
        if record.rtype.has_priority() {
            let _ = write!(out, " {}", record.prio.unwrap_or(0));
        }
        let _ = writeln!(out, " {rdata}");
    }
    Ok(out)
}

fn compare(apex: &str, a: &ZoneRecord, b: &ZoneRecord) -> Ordering {
    let below_apex = |r: &ZoneRecord| name::key(&r.name) != apex;
    below_apex(a)
        .cmp(&below_apex(b))
        .then_with(|| name::canonical_key(&a.name).cmp(&name::canonical_key(&b.name)))
        .then_with(|| type_rank(a.rtype).cmp(&type_rank(b.rtype)))
        .then_with(|| a.rtype.as_str().cmp(b.rtype.as_str()))
        .then_with(|| a.prio.cmp(&b.prio))
        .then_with(|| a.content.cmp(&b.content))
        .then_with(|| a.ttl.cmp(&b.ttl))
}

fn type_rank(rtype: RecordType) -> u8 {
    match rtype {
        RecordType::Soa => 0,
        RecordType::Ns => 1,
        _ => 2,
    }
}

fn fqdn(name: &str) -> String {
    if name.is_empty() || name == "." {
        ".".to_string()
    } else if name::strip_root(name).len() != name.len() {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn render_rdata(record: &ZoneRecord) -> Result<String> {
    let rendered = match RecordContent::decompose(record.rtype, &record.content)? {
        RecordContent::Soa(soa) => format!(
            "{} {} {} {} {} {} {}",
            fqdn(&soa.primary),
            fqdn(&soa.hostmaster),
            soa.serial,
            soa.refresh,
            soa.retry,
            soa.expire,
            soa.minimum
        ),
        RecordContent::Ns(target)
        | RecordContent::Cname(target)
        | RecordContent::Ptr(target)
        | RecordContent::Mx { exchange: target } => fqdn(&target),
        RecordContent::Srv {
            weight,
            port,
            target,
        } => format!("{weight} {port} {}", fqdn(&target)),
        RecordContent::A(addr) | RecordContent::Aaaa(addr) => addr,
        RecordContent::Txt(words) | RecordContent::Spf(words) if words.is_empty() => "\"\"".to_string(),
        RecordContent::Txt(words) | RecordContent::Spf(words) => {
            words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" ")
        }
        RecordContent::Opaque(rtype, raw) => {
            let name_fields = rtype.opaque_name_fields();
            if name_fields.is_empty() {
                raw
            } else {
                let fields = lexer::tokenize(&raw)
                    .map_err(|e| ContentError::new(rtype, &raw, e.to_string()))?
                    .into_iter()
                    .flat_map(|line| line.fields);
                fields
                    .enumerate()
                    .map(|(idx, field)| {
                        if field.quoted {
                            format!("\"{}\"", field.text)
                        } else if name_fields.contains(&idx) {
                            fqdn(&field.text)
                        } else {
                            field.text
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    };
    Ok(rendered)
}
