//! Helpers for domain names in the form the PowerDNS schema stores
//! them: fully qualified, presentation format, no trailing dot.
//!
//! Labels may contain `\X` and `\DDD` escapes; splitting and
//! comparison honour them, so `a\.b.example.com` has three labels.

use thiserror::Error;

use crate::config::NameCase;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("empty label in {0:?}")]
    EmptyLabel(String),
    #[error("label longer than 63 octets in {0:?}")]
    LabelTooLong(String),
    #[error("name longer than 255 octets: {0:?}")]
    NameTooLong(String),
    #[error("bad escape sequence in {0:?}")]
    BadEscape(String),
}

/// Split a name into its labels, left to right.
///
/// A single trailing dot is ignored. The root name (`""` or `"."`)
/// has no labels.
pub fn labels(name: &str) -> Vec<&str> {
    let name = strip_root(name);
    if name.is_empty() {
        return Vec::new();
    }

    let bytes = name.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'.' => {
                out.push(&name[start..i]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    out.push(&name[start.min(name.len())..]);
    out
}

pub fn label_count(name: &str) -> usize {
    labels(name).len()
}

/// Removes one unescaped trailing dot, if present.
pub fn strip_root(name: &str) -> &str {
    match name.strip_suffix('.') {
        Some(rest) if !ends_with_escape(rest) => rest,
        _ => name,
    }
}

fn ends_with_escape(s: &str) -> bool {
    s.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

/// Case-insensitive label comparison.
fn label_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Whether `name` equals `origin` or lies below it.
pub fn is_in_zone(name: &str, origin: &str) -> bool {
    relative_labels(name, origin).is_some()
}

/// The labels of `name` left of `origin`, or `None` when `name` is not
/// inside `origin`. The apex yields an empty list.
pub fn relative_labels<'a>(name: &'a str, origin: &str) -> Option<Vec<&'a str>> {
    let name_labels = labels(name);
    let origin_labels = labels(origin);
    if name_labels.len() < origin_labels.len() {
        return None;
    }
    let split = name_labels.len() - origin_labels.len();
    let matches = name_labels[split..]
        .iter()
        .zip(origin_labels.iter())
        .all(|(a, b)| label_eq(a, b));
    matches.then(|| name_labels[..split].to_vec())
}

/// Every proper ancestor of `name` that still has more labels than
/// `min_depth`, nearest first.
pub fn ancestors_below(name: &str, min_depth: usize) -> Vec<String> {
    let labels = labels(name);
    (1..labels.len())
        .filter(|skip| labels.len() - skip > min_depth)
        .map(|skip| labels[skip..].join("."))
        .collect()
}

/// Case-folded key used for set membership and equality.
pub fn key(name: &str) -> String {
    strip_root(name).to_ascii_lowercase()
}

/// Sort key in DNSSEC canonical order (RFC 4034 § 6.1): labels right to
/// left, lowercased.
pub fn canonical_key(name: &str) -> Vec<String> {
    labels(name)
        .into_iter()
        .rev()
        .map(|label| label.to_ascii_lowercase())
        .collect()
}

/// Applies the configured case policy and drops the trailing dot.
pub fn normalize(name: &str, case: NameCase) -> String {
    let trimmed = strip_root(name.trim());
    match case {
        NameCase::Lowercase => trimmed.to_ascii_lowercase(),
        NameCase::Preserve => trimmed.to_string(),
    }
}

/// Uncompressed, lowercased wire form of a fully qualified name,
/// terminated by the root label.
pub fn to_wire(name: &str) -> Result<Vec<u8>, NameError> {
    let mut wire = Vec::with_capacity(name.len() + 2);
    for label in labels(name) {
        let raw = unescape_label(label).ok_or_else(|| NameError::BadEscape(name.to_string()))?;
        if raw.is_empty() {
            return Err(NameError::EmptyLabel(name.to_string()));
        }
        if raw.len() > 63 {
            return Err(NameError::LabelTooLong(name.to_string()));
        }
        wire.push(raw.len() as u8);
        wire.extend(raw.iter().map(u8::to_ascii_lowercase));
    }
    wire.push(0);
    if wire.len() > 255 {
        return Err(NameError::NameTooLong(name.to_string()));
    }
    Ok(wire)
}

fn unescape_label(label: &str) -> Option<Vec<u8>> {
    let bytes = label.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = *bytes.get(i + 1)?;
        if next.is_ascii_digit() {
            let digits = bytes.get(i + 1..i + 4)?;
            if !digits.iter().all(u8::is_ascii_digit) {
                return None;
            }
            let value = digits
                .iter()
                .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
            out.push(u8::try_from(value).ok()?);
            i += 4;
        } else {
            out.push(next);
            i += 2;
        }
    }
    Some(out)
}
