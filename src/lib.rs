//! Zone management core for a PowerDNS SQL backend: zone text and AXFR
//! import, export, record edits and DNSSEC rectification.

pub mod axfr;
pub mod config;
pub mod db;
pub mod error;
pub mod name;
pub mod nsec3;
pub mod rectify;
pub mod rr;
pub mod serial;
pub mod validation;
pub mod zone_file;
pub mod zones;

pub use error::{Result, ZoneError};
pub use zones::ZoneManager;

use std::sync::Arc;

/// Arc-wrapped manager shared between tasks.
pub type SharedState = Arc<ZoneManager>;
