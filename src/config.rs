use std::time::Duration;

use crate::db::domain_repo::DomainType;
use crate::rr::RecordType;

/// How owner names and origins are cased before they are stored or
/// compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameCase {
    /// Lowercase on every ingress.
    #[default]
    Lowercase,
    /// Store and compare byte-exact.
    Preserve,
}

#[derive(Clone, Debug)]
pub struct AxfrConfig {
    pub connect_timeout: Duration,
    /// Budget for the whole transfer, connect included.
    pub lifetime: Duration,
}

impl Default for AxfrConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            lifetime: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub default_zone_type: DomainType,
    /// TTL for records of a zone that has no SOA to take a minimum from.
    pub default_ttl: u32,
    pub enabled_types: Vec<RecordType>,
    pub name_case: NameCase,
    pub axfr: AxfrConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_zone_type: DomainType::Native,
            default_ttl: 3600,
            enabled_types: RecordType::ALL.to_vec(),
            name_case: NameCase::default(),
            axfr: AxfrConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn is_enabled(&self, rtype: RecordType) -> bool {
        self.enabled_types.contains(&rtype)
    }

    /// Canonical form of a zone or owner name under the case policy.
    pub fn normalize_name(&self, name: &str) -> String {
        crate::name::normalize(name, self.name_case)
    }
}
