//! Invoice numbering behavior across whole months.

use billcraft_api::numbering;
use chrono::NaiveDate;

#[test]
fn a_month_of_invoices_is_sequential() {
    let today = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

    let mut latest: Option<String> = None;
    for expected_seq in 1..=25 {
        let number = numbering::next_number(latest.as_deref(), today);
        assert_eq!(number, format!("INV-202406-{:03}", expected_seq));
        latest = Some(number);
    }
}

#[test]
fn sequence_does_not_leak_across_months() {
    let may = NaiveDate::from_ymd_opt(2024, 5, 30).unwrap();
    let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let mut latest: Option<String> = None;
    for _ in 0..7 {
        latest = Some(numbering::next_number(latest.as_deref(), may));
    }
    assert_eq!(latest.as_deref(), Some("INV-202405-007"));

    let first_of_june = numbering::next_number(latest.as_deref(), june);
    assert_eq!(first_of_june, "INV-202406-001");
}

#[test]
fn year_rollover_also_resets() {
    let december = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
    let january = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    let last_of_year = numbering::next_number(Some("INV-202412-041"), december);
    assert_eq!(last_of_year, "INV-202412-042");

    let first_of_year = numbering::next_number(Some(last_of_year.as_str()), january);
    assert_eq!(first_of_year, "INV-202501-001");
}

#[test]
fn counter_seed_matches_the_pure_sequence() {
    // The store seeds a month's counter row from the latest number; the
    // resulting allocation must agree with the pure computation.
    let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
    let period = numbering::period_key(today);

    for previous in [Some("INV-202406-004"), Some("INV-202405-999"), None] {
        let seed = numbering::seed_sequence(previous, &period);
        assert_eq!(
            numbering::format_number(&period, seed),
            numbering::next_number(previous, today)
        );
    }
}

#[test]
fn legacy_numbers_restart_the_month() {
    let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();

    for legacy in ["LEGACY-1", "2024-001", "INV-202406", "INV-ABCDEF-001"] {
        assert_eq!(
            numbering::next_number(Some(legacy), today),
            "INV-202608-001",
            "{legacy} should restart the sequence"
        );
    }
}
