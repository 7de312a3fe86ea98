// src/error.rs
use thiserror::Error;

use crate::rr::content::ContentError;

/// Errors surfaced by every zone-level operation.
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("the zone's origin is unknown")]
    UnknownOrigin,

    #[error("zone {0} has no SOA record at its origin")]
    MissingSoa(String),

    #[error("zone {0} has no NS records at its origin")]
    MissingApexNs(String),

    #[error("the zone is malformed: {0}")]
    MalformedZone(String),

    #[error("malformed {rtype} content {content:?}: {reason}")]
    MalformedContent {
        rtype: String,
        content: String,
        reason: String,
    },

    #[error("zone {0} already exists; enable overwrite to replace it with the imported one")]
    ZoneExists(String),

    #[error("zone {0} not found")]
    ZoneNotFound(String),

    #[error("zone transfer of {zone} from {server} failed: {reason}")]
    TransferFailed {
        zone: String,
        server: String,
        reason: String,
    },

    #[error("zone {zone} is misconfigured: {reason}")]
    Configuration { zone: String, reason: String },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ZoneError {
    pub fn malformed_zone(msg: impl Into<String>) -> Self {
        ZoneError::MalformedZone(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        ZoneError::InvalidRecord(msg.into())
    }

    pub fn configuration(zone: &str, reason: impl Into<String>) -> Self {
        ZoneError::Configuration {
            zone: zone.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transfer_failed(zone: &str, server: &str, reason: impl std::fmt::Display) -> Self {
        ZoneError::TransferFailed {
            zone: zone.to_string(),
            server: server.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ContentError> for ZoneError {
    fn from(err: ContentError) -> Self {
        ZoneError::MalformedContent {
            rtype: err.rtype.to_string(),
            content: err.content,
            reason: err.reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, ZoneError>;
