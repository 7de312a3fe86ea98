//! SOA serial generation.
//!
//! Serials are Unix timestamps. When the clock has not moved past the
//! current serial (several changes in one second, or a zone imported
//! with a date-style serial such as `2024010100`), the previous serial
//! is incremented instead, so secondaries always see an increase.

use chrono::Utc;

use crate::rr::content::{ContentError, RecordContent, Soa};

/// Next serial for a zone whose current serial is `current`.
pub fn next_serial(current: Option<u32>) -> u32 {
    next_serial_at(unix_now(), current)
}

/// [`next_serial`] with an explicit clock reading.
pub fn next_serial_at(now: u32, current: Option<u32>) -> u32 {
    match current {
        Some(prior) if now <= prior => prior.wrapping_add(1),
        _ => now,
    }
}

/// `a > b` in RFC 1982 serial number arithmetic.
pub fn serial_gt(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < (1 << 31)
}

/// Rewrites the serial of stored SOA content in place, keeping every
/// other field.
pub fn bump_soa_content(content: &str) -> Result<(String, u32), ContentError> {
    let soa = Soa::from_content(content)?;
    let serial = next_serial(Some(soa.serial));
    Ok((RecordContent::Soa(Soa { serial, ..soa }).compose(), serial))
}

fn unix_now() -> u32 {
    // Truncation to 32 bits matches the width of the SOA serial field.
    Utc::now().timestamp() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_zone_gets_the_clock() {
        assert_eq!(next_serial_at(1_700_000_000, None), 1_700_000_000);
    }

    #[test]
    fn older_serial_is_replaced_by_the_clock() {
        assert_eq!(next_serial_at(1_700_000_000, Some(1_600_000_000)), 1_700_000_000);
    }

    #[test]
    fn same_second_falls_back_to_increment() {
        let first = next_serial_at(1_700_000_000, None);
        let second = next_serial_at(1_700_000_000, Some(first));
        let third = next_serial_at(1_700_000_000, Some(second));
        assert!(serial_gt(second, first));
        assert!(serial_gt(third, second));
        assert_eq!(third, first + 2);
    }

    #[test]
    fn date_style_serial_ahead_of_clock_increments() {
        // 2024010100 is numerically greater than a 2023 timestamp.
        assert_eq!(next_serial_at(1_700_000_000, Some(2_024_010_100)), 2_024_010_101);
    }

    #[test]
    fn monotonic_over_increasing_clock() {
        let mut prior = next_serial_at(1_700_000_000, None);
        for now in [1_700_000_000, 1_700_000_000, 1_700_000_001, 1_700_000_001, 1_700_000_500] {
            let next = next_serial_at(now, Some(prior));
            assert!(serial_gt(next, prior), "{next} should follow {prior}");
            prior = next;
        }
    }

    #[test]
    fn wraps_at_the_top_of_serial_space() {
        let next = next_serial_at(5, Some(u32::MAX));
        assert_eq!(next, 0);
        assert!(serial_gt(next, u32::MAX));
    }

    #[test]
    fn bump_keeps_other_soa_fields() {
        let (content, serial) =
            bump_soa_content("ns1.example.com hostmaster.example.com 1 10800 3600 604800 3600").unwrap();
        assert!(serial > 1);
        assert_eq!(
            content,
            format!("ns1.example.com hostmaster.example.com {serial} 10800 3600 604800 3600")
        );
        assert!(bump_soa_content("ns1 hostmaster").is_err());
    }
}
