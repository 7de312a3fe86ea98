//! Type-specific decomposition of `records.content`.
//!
//! PowerDNS keeps everything right of the type in one text column and
//! moves only the MX/SRV priority into `prio`. [`RecordContent`] is the
//! typed view of that column; [`RecordContent::decompose`] and
//! [`RecordContent::compose`] convert between the two. Both directions
//! are pure. Address syntax is not checked here.

use std::fmt;

use thiserror::Error;

use super::RecordType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed {rtype} content {content:?}: {reason}")]
pub struct ContentError {
    pub rtype: RecordType,
    pub content: String,
    pub reason: String,
}

impl ContentError {
    pub fn new(rtype: RecordType, content: &str, reason: impl Into<String>) -> Self {
        Self {
            rtype,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}

/// The seven SOA fields, in storage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub primary: String,
    pub hostmaster: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl fmt::Display for Soa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.primary,
            self.hostmaster,
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.minimum
        )
    }
}

/// Typed record content. MX and SRV priorities are not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordContent {
    Soa(Soa),
    Ns(String),
    Cname(String),
    Ptr(String),
    Mx { exchange: String },
    Srv { weight: u16, port: u16, target: String },
    A(String),
    Aaaa(String),
    Txt(Vec<String>),
    Spf(Vec<String>),
    /// Types stored and returned verbatim.
    Opaque(RecordType, String),
}

type Decoder = fn(&str) -> Result<RecordContent, String>;

/// Maps a record type to its content decoder.
fn decoder(rtype: RecordType) -> Decoder {
    match rtype {
        RecordType::Soa => decode_soa,
        RecordType::Ns => |c| single_name(c).map(RecordContent::Ns),
        RecordType::Cname => |c| single_name(c).map(RecordContent::Cname),
        RecordType::Ptr => |c| single_name(c).map(RecordContent::Ptr),
        RecordType::Mx => |c| single_name(c).map(|exchange| RecordContent::Mx { exchange }),
        RecordType::Srv => decode_srv,
        RecordType::A => |c| single_token(c).map(RecordContent::A),
        RecordType::Aaaa => |c| single_token(c).map(RecordContent::Aaaa),
        RecordType::Txt => |c| Ok(RecordContent::Txt(words(c))),
        RecordType::Spf => |c| Ok(RecordContent::Spf(words(c))),
        RecordType::Cert => |c| Ok(RecordContent::Opaque(RecordType::Cert, c.to_string())),
        RecordType::Dnskey => |c| Ok(RecordContent::Opaque(RecordType::Dnskey, c.to_string())),
        RecordType::Ds => |c| Ok(RecordContent::Opaque(RecordType::Ds, c.to_string())),
        RecordType::Key => |c| Ok(RecordContent::Opaque(RecordType::Key, c.to_string())),
        RecordType::Nsec => |c| Ok(RecordContent::Opaque(RecordType::Nsec, c.to_string())),
        RecordType::Rrsig => |c| Ok(RecordContent::Opaque(RecordType::Rrsig, c.to_string())),
        RecordType::Hinfo => |c| Ok(RecordContent::Opaque(RecordType::Hinfo, c.to_string())),
        RecordType::Loc => |c| Ok(RecordContent::Opaque(RecordType::Loc, c.to_string())),
        RecordType::Naptr => |c| Ok(RecordContent::Opaque(RecordType::Naptr, c.to_string())),
        RecordType::Rp => |c| Ok(RecordContent::Opaque(RecordType::Rp, c.to_string())),
        RecordType::Afsdb => |c| Ok(RecordContent::Opaque(RecordType::Afsdb, c.to_string())),
        RecordType::Sshfp => |c| Ok(RecordContent::Opaque(RecordType::Sshfp, c.to_string())),
    }
}

impl RecordContent {
    pub fn decompose(rtype: RecordType, content: &str) -> Result<Self, ContentError> {
        decoder(rtype)(content).map_err(|reason| ContentError::new(rtype, content, reason))
    }

    pub fn compose(&self) -> String {
        match self {
            RecordContent::Soa(soa) => soa.to_string(),
            RecordContent::Ns(name)
            | RecordContent::Cname(name)
            | RecordContent::Ptr(name)
            | RecordContent::Mx { exchange: name } => name.clone(),
            RecordContent::Srv {
                weight,
                port,
                target,
            } => format!("{weight} {port} {target}"),
            RecordContent::A(addr) | RecordContent::Aaaa(addr) => addr.clone(),
            RecordContent::Txt(strings) | RecordContent::Spf(strings) => strings.join(" "),
            RecordContent::Opaque(_, raw) => raw.clone(),
        }
    }

    pub fn rtype(&self) -> RecordType {
        match self {
            RecordContent::Soa(_) => RecordType::Soa,
            RecordContent::Ns(_) => RecordType::Ns,
            RecordContent::Cname(_) => RecordType::Cname,
            RecordContent::Ptr(_) => RecordType::Ptr,
            RecordContent::Mx { .. } => RecordType::Mx,
            RecordContent::Srv { .. } => RecordType::Srv,
            RecordContent::A(_) => RecordType::A,
            RecordContent::Aaaa(_) => RecordType::Aaaa,
            RecordContent::Txt(_) => RecordType::Txt,
            RecordContent::Spf(_) => RecordType::Spf,
            RecordContent::Opaque(rtype, _) => *rtype,
        }
    }
}

impl Soa {
    /// Parses stored SOA content.
    pub fn from_content(content: &str) -> Result<Self, ContentError> {
        parse_soa(content).map_err(|reason| ContentError::new(RecordType::Soa, content, reason))
    }
}

fn decode_soa(content: &str) -> Result<RecordContent, String> {
    parse_soa(content).map(RecordContent::Soa)
}

fn parse_soa(content: &str) -> Result<Soa, String> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() != 7 {
        return Err(format!("expected 7 fields, found {}", fields.len()));
    }
    let number = |idx: usize, what: &str| {
        fields[idx]
            .parse::<u32>()
            .map_err(|_| format!("{what} {:?} is not an unsigned 32-bit integer", fields[idx]))
    };
    Ok(Soa {
        primary: fields[0].to_string(),
        hostmaster: fields[1].to_string(),
        serial: number(2, "serial")?,
        refresh: number(3, "refresh")?,
        retry: number(4, "retry")?,
        expire: number(5, "expire")?,
        minimum: number(6, "minimum")?,
    })
}

fn decode_srv(content: &str) -> Result<RecordContent, String> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    let [weight, port, target] = fields.as_slice() else {
        return Err(format!("expected weight, port and target, found {} fields", fields.len()));
    };
    Ok(RecordContent::Srv {
        weight: weight
            .parse()
            .map_err(|_| format!("weight {weight:?} is not a 16-bit integer"))?,
        port: port
            .parse()
            .map_err(|_| format!("port {port:?} is not a 16-bit integer"))?,
        target: target_name(target),
    })
}

fn single_token(content: &str) -> Result<String, String> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    match fields.as_slice() {
        [one] => Ok(one.to_string()),
        [] => Err("content is empty".into()),
        more => Err(format!("expected a single field, found {}", more.len())),
    }
}

fn single_name(content: &str) -> Result<String, String> {
    single_token(content).map(|name| target_name(&name))
}

/// Stored form of a name: no trailing dot, except the root itself
/// (null MX, "no service" SRV) which stays `.`.
fn target_name(name: &str) -> String {
    match crate::name::strip_root(name) {
        "" => ".".to_string(),
        stripped => stripped.to_string(),
    }
}

fn words(content: &str) -> Vec<String> {
    content.split_whitespace().map(str::to_string).collect()
}
