//! Invoice number generation.
//!
//! Numbers follow `INV-YYYYMM-NNN`: the issuance month and a per-month
//! sequence starting at 001. The pure functions here format, parse, and
//! advance numbers; atomic allocation against concurrent creators lives in
//! the database layer, which serializes on a per-user/per-month counter row
//! seeded with [`seed_sequence`].

use chrono::{DateTime, Datelike, NaiveDate, Utc};

pub const PREFIX: &str = "INV";
const SEQ_WIDTH: usize = 3;

/// `YYYYMM` period key for a date.
pub fn period_key(date: NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}

/// Format a number for a period and sequence. The sequence is zero-padded
/// to three digits; wider sequences print at their natural width, so the
/// 1000th invoice of a month is `INV-YYYYMM-1000` rather than an error.
pub fn format_number(period: &str, seq: i64) -> String {
    format!("{}-{}-{:0width$}", PREFIX, period, seq, width = SEQ_WIDTH)
}

/// Parse `INV-YYYYMM-NNN` into period and sequence. Returns `None` for
/// anything that does not match the scheme exactly.
pub fn parse_number(number: &str) -> Option<(&str, i64)> {
    let rest = number.strip_prefix("INV-")?;
    let (period, seq) = rest.split_once('-')?;
    if period.len() != 6 || !period.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if seq.len() != SEQ_WIDTH || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((period, seq.parse().ok()?))
}

/// Next number after `previous` for an invoice issued on `today`.
///
/// A previous number in the current month continues its sequence; a prior
/// month, a missing predecessor, or an unrecognized format starts the
/// current month at 001.
pub fn next_number(previous: Option<&str>, today: NaiveDate) -> String {
    let current = period_key(today);
    match previous.and_then(parse_number) {
        Some((period, seq)) if period == current => format_number(&current, seq + 1),
        _ => format_number(&current, 1),
    }
}

/// Sequence to seed a month's counter row with, continuing the most recent
/// invoice's sequence when it belongs to the same period.
pub fn seed_sequence(previous: Option<&str>, period: &str) -> i64 {
    match previous.and_then(parse_number) {
        Some((prev_period, seq)) if prev_period == period => seq + 1,
        _ => 1,
    }
}

/// Schema-conforming fallback when the store cannot be consulted for a
/// sequence: the last six digits of the current epoch second.
pub fn fallback_number(now: DateTime<Utc>) -> String {
    format!("{}-{:06}", PREFIX, now.timestamp().rem_euclid(1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_month_increments_sequence() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(next_number(Some("INV-202406-004"), today), "INV-202406-005");
    }

    #[test]
    fn month_rollover_resets_sequence() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(next_number(Some("INV-202405-999"), today), "INV-202406-001");
    }

    #[test]
    fn first_invoice_starts_at_one() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(next_number(None, today), "INV-202503-001");
    }

    #[test]
    fn unparseable_predecessor_starts_a_new_sequence() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        assert_eq!(next_number(Some("LEGACY-1"), today), "INV-202406-001");
        assert_eq!(next_number(Some("INV-24-001"), today), "INV-202406-001");
        assert_eq!(next_number(Some(""), today), "INV-202406-001");
    }

    #[test]
    fn sequence_widens_past_three_digits() {
        assert_eq!(format_number("202406", 999), "INV-202406-999");
        assert_eq!(format_number("202406", 1000), "INV-202406-1000");
    }

    #[test]
    fn parse_rejects_widened_and_malformed_numbers() {
        assert_eq!(parse_number("INV-202406-042"), Some(("202406", 42)));
        assert_eq!(parse_number("INV-202406-1000"), None);
        assert_eq!(parse_number("INV-2024-001"), None);
        assert_eq!(parse_number("REC-202406-001"), None);
        assert_eq!(parse_number("INV-2024ab-001"), None);
    }

    #[test]
    fn seed_continues_same_period_only() {
        assert_eq!(seed_sequence(Some("INV-202406-007"), "202406"), 8);
        assert_eq!(seed_sequence(Some("INV-202405-007"), "202406"), 1);
        assert_eq!(seed_sequence(Some("LEGACY-1"), "202406"), 1);
        assert_eq!(seed_sequence(None, "202406"), 1);
    }

    #[test]
    fn fallback_uses_last_six_epoch_digits() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let number = fallback_number(now);
        assert_eq!(number, format!("INV-{:06}", now.timestamp() % 1_000_000));
        assert!(number.starts_with("INV-"));
    }
}
