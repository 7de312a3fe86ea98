//! Resource record types known to the management layer and the
//! per-type content codec.

pub mod content;

use std::fmt;
use std::str::FromStr;

/// The closed set of record types that may be stored in `records.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    Soa,
    Ns,
    Mx,
    A,
    Aaaa,
    Cname,
    Ptr,
    Txt,
    Spf,
    Srv,
    Cert,
    Dnskey,
    Ds,
    Key,
    Nsec,
    Rrsig,
    Hinfo,
    Loc,
    Naptr,
    Rp,
    Afsdb,
    Sshfp,
}

impl RecordType {
    pub const ALL: [RecordType; 22] = [
        RecordType::Soa,
        RecordType::Ns,
        RecordType::Mx,
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Ptr,
        RecordType::Txt,
        RecordType::Spf,
        RecordType::Srv,
        RecordType::Cert,
        RecordType::Dnskey,
        RecordType::Ds,
        RecordType::Key,
        RecordType::Nsec,
        RecordType::Rrsig,
        RecordType::Hinfo,
        RecordType::Loc,
        RecordType::Naptr,
        RecordType::Rp,
        RecordType::Afsdb,
        RecordType::Sshfp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Soa => "SOA",
            RecordType::Ns => "NS",
            RecordType::Mx => "MX",
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Ptr => "PTR",
            RecordType::Txt => "TXT",
            RecordType::Spf => "SPF",
            RecordType::Srv => "SRV",
            RecordType::Cert => "CERT",
            RecordType::Dnskey => "DNSKEY",
            RecordType::Ds => "DS",
            RecordType::Key => "KEY",
            RecordType::Nsec => "NSEC",
            RecordType::Rrsig => "RRSIG",
            RecordType::Hinfo => "HINFO",
            RecordType::Loc => "LOC",
            RecordType::Naptr => "NAPTR",
            RecordType::Rp => "RP",
            RecordType::Afsdb => "AFSDB",
            RecordType::Sshfp => "SSHFP",
        }
    }

    /// The IANA type code used on the wire.
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Hinfo => 13,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Rp => 17,
            RecordType::Afsdb => 18,
            RecordType::Key => 25,
            RecordType::Aaaa => 28,
            RecordType::Loc => 29,
            RecordType::Srv => 33,
            RecordType::Naptr => 35,
            RecordType::Cert => 37,
            RecordType::Ds => 43,
            RecordType::Sshfp => 44,
            RecordType::Rrsig => 46,
            RecordType::Nsec => 47,
            RecordType::Dnskey => 48,
            RecordType::Spf => 99,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        RecordType::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Types whose priority lives in the `prio` column.
    pub fn has_priority(self) -> bool {
        matches!(self, RecordType::Mx | RecordType::Srv)
    }

    /// Address types that become glue below a delegation.
    pub fn is_address(self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }

    /// Zero-based positions of domain-name fields inside the content of
    /// types that are otherwise stored opaquely.
    pub(crate) fn opaque_name_fields(self) -> &'static [usize] {
        match self {
            RecordType::Rp => &[0, 1],
            RecordType::Afsdb => &[1],
            RecordType::Naptr => &[5],
            _ => &[],
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported record type {0:?}")]
pub struct UnknownRecordType(pub String);

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRecordType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for t in RecordType::ALL {
            assert_eq!(t.as_str().parse::<RecordType>().unwrap(), t);
        }
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert!("CAA".parse::<RecordType>().is_err());
    }

    #[test]
    fn wire_codes_are_distinct() {
        for t in RecordType::ALL {
            assert_eq!(RecordType::from_code(t.code()), Some(t));
        }
        assert_eq!(RecordType::Ds.code(), 43);
        assert_eq!(RecordType::from_code(257), None);
    }
}
