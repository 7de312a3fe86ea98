//! NSEC3 owner-name hashing ([RFC 5155 § 5]).
//!
//! [RFC 5155 § 5]: https://datatracker.ietf.org/doc/html/rfc5155#section-5

use std::fmt;
use std::str::FromStr;

use data_encoding::{BASE32_DNSSEC, HEXLOWER_PERMISSIVE};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::name::{self, NameError};

/// The only hash algorithm defined for NSEC3.
pub const SHA1_ALGORITHM: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nsec3Error {
    #[error("NSEC3PARAM must have 4 fields (algorithm flags iterations salt), found {0}")]
    FieldCount(usize),
    #[error("NSEC3PARAM {field} {value:?} is not a valid number")]
    Number { field: &'static str, value: String },
    #[error("NSEC3 hash algorithm {0} is not supported")]
    Algorithm(u8),
    #[error("NSEC3PARAM salt {0:?} is not hexadecimal")]
    Salt(String),
    #[error(transparent)]
    Name(#[from] NameError),
}

/// Parameters from a zone's `NSEC3PARAM` metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec3Param {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

impl FromStr for Nsec3Param {
    type Err = Nsec3Error;

    /// Parses `algorithm flags iterations salt`, where a salt of `-` is
    /// the empty salt.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [algorithm, flags, iterations, salt] = fields.as_slice() else {
            return Err(Nsec3Error::FieldCount(fields.len()));
        };

        let algorithm: u8 = number("algorithm", algorithm)?;
        if algorithm != SHA1_ALGORITHM {
            return Err(Nsec3Error::Algorithm(algorithm));
        }
        let salt = if *salt == "-" {
            Vec::new()
        } else {
            HEXLOWER_PERMISSIVE
                .decode(salt.as_bytes())
                .map_err(|_| Nsec3Error::Salt(salt.to_string()))?
        };

        Ok(Nsec3Param {
            algorithm,
            flags: number("flags", flags)?,
            iterations: number("iterations", iterations)?,
            salt,
        })
    }
}

impl fmt::Display for Nsec3Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let salt = if self.salt.is_empty() {
            "-".to_string()
        } else {
            HEXLOWER_PERMISSIVE.encode(&self.salt)
        };
        write!(f, "{} {} {} {}", self.algorithm, self.flags, self.iterations, salt)
    }
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, Nsec3Error> {
    value.parse().map_err(|_| Nsec3Error::Number {
        field,
        value: value.to_string(),
    })
}

impl Nsec3Param {
    /// Hashes `owner` and returns the lowercase base32hex digest.
    pub fn hash(&self, owner: &str) -> Result<String, Nsec3Error> {
        let wire = name::to_wire(owner)?;
        Ok(BASE32_DNSSEC.encode(&iterated_sha1(&wire, &self.salt, self.iterations)))
    }
}

/// `H(x) = SHA1(x || salt)` applied `iterations + 1` times.
fn iterated_sha1(data: &[u8], salt: &[u8], iterations: u16) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.update(salt);
    let mut digest = [0u8; 20];
    digest.copy_from_slice(&hasher.finalize());

    for _ in 0..iterations {
        let mut hasher = Sha1::new();
        hasher.update(digest);
        hasher.update(salt);
        digest.copy_from_slice(&hasher.finalize());
    }
    digest
}
