//! Timestamp parsing and window normalization

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use sms_spam_report::error::ReportError;
use sms_spam_report::time_range::{parse_optional, parse_timestamp, TimeRangeNormalizer};

fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 10, h, m, s).unwrap()
}

fn hour() -> TimeRangeNormalizer {
    TimeRangeNormalizer::new(Duration::hours(1))
}

#[test]
fn zulu_and_zero_offset_are_the_same_instant() {
    let z = parse_timestamp("2025-09-10T15:15:00Z").unwrap();
    let offset = parse_timestamp("2025-09-10T15:15:00+00:00").unwrap();
    assert_eq!(z, offset);
    assert_eq!(z, t(15, 15, 0));
}

#[test]
fn offsets_are_converted_to_utc() {
    assert_eq!(parse_timestamp("2025-09-10T15:15:00+07:00").unwrap(), t(8, 15, 0));
    assert_eq!(parse_timestamp("2025-09-10T05:15:00-03:00").unwrap(), t(8, 15, 0));
}

#[test]
fn fractional_seconds_and_minute_precision_are_accepted() {
    let ts = parse_timestamp("2025-09-10T15:15:00.250+07:00").unwrap();
    assert_eq!(ts, t(8, 15, 0) + Duration::milliseconds(250));
    assert_eq!(parse_timestamp("2025-09-10T15:15+07:00").unwrap(), t(8, 15, 0));
}

#[test]
fn url_decoded_plus_is_repaired() {
    // "+07:00" arrives as " 07:00" when the client forgot to encode '+'
    assert_eq!(parse_timestamp("2025-09-10T15:15:00 07:00").unwrap(), t(8, 15, 0));
}

#[test]
fn epoch_seconds_and_milliseconds() {
    let expected = t(8, 15, 0);
    let secs = expected.timestamp();
    assert_eq!(parse_timestamp(&secs.to_string()).unwrap(), expected);
    assert_eq!(parse_timestamp(&(secs * 1000).to_string()).unwrap(), expected);
    assert_eq!(parse_timestamp(&format!("{secs}.5")).unwrap(), expected + Duration::milliseconds(500));
}

#[test]
fn missing_timezone_is_rejected() {
    for raw in ["2025-09-10T15:15:00", "2025-09-10 15:15:00", "2025-09-10T15:15"] {
        match parse_timestamp(raw) {
            Err(ReportError::InvalidTimestamp(msg)) => assert!(msg.contains(raw), "{msg}"),
            other => panic!("expected InvalidTimestamp for {raw}, got {other:?}"),
        }
    }
}

#[test]
fn garbage_is_rejected() {
    for raw in ["yesterday", "2025-13-40T00:00:00Z", "1.2.3", "-", ""] {
        assert!(
            matches!(parse_timestamp(raw), Err(ReportError::InvalidTimestamp(_))),
            "accepted {raw:?}"
        );
    }
}

#[test]
fn invalid_format_message_shows_an_example() {
    let err = parse_timestamp("nonsense").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid datetime format: nonsense. Use ISO 8601, e.g., 2025-09-10T15:15:00+07:00"
    );
}

#[test]
fn optional_blank_means_absent() {
    assert_eq!(parse_optional(None).unwrap(), None);
    assert_eq!(parse_optional(Some("   ")).unwrap(), None);
    assert_eq!(parse_optional(Some("2025-09-10T08:15:00Z")).unwrap(), Some(t(8, 15, 0)));
}

#[test]
fn no_bounds_end_at_latest() {
    let window = hour().normalize(None, None, Some(t(9, 30, 0))).unwrap();
    assert_eq!(window.to, t(9, 30, 0));
    assert_eq!(window.from, t(8, 30, 0));
}

#[test]
fn no_bounds_and_empty_store_use_wall_clock() {
    let before = Utc::now();
    let window = hour().normalize(None, None, None).unwrap();
    let after = Utc::now();
    assert!(window.to >= before && window.to <= after);
    assert_eq!(window.to - window.from, Duration::hours(1));
}

#[test]
fn only_from_extends_forward() {
    let window = hour().normalize(Some(t(8, 0, 0)), None, None).unwrap();
    assert_eq!(window.to, t(9, 0, 0));
}

#[test]
fn only_to_extends_backward() {
    let window = hour().normalize(None, Some(t(9, 0, 0)), None).unwrap();
    assert_eq!(window.from, t(8, 0, 0));
}

#[test]
fn latest_is_ignored_when_a_bound_is_given() {
    let window = hour().normalize(Some(t(8, 0, 0)), None, Some(t(23, 0, 0))).unwrap();
    assert_eq!(window.to, t(9, 0, 0));
}

#[test]
fn reversed_range_is_rejected() {
    let err = hour().normalize(Some(t(9, 0, 0)), Some(t(8, 0, 0)), None).unwrap_err();
    assert!(matches!(err, ReportError::InvalidRange(_)));
    assert_eq!(err.to_string(), "'to_datetime' cannot be earlier than 'from_datetime'.");
}

#[test]
fn span_over_the_cap_is_rejected_not_clamped() {
    let err = hour()
        .normalize(Some(t(8, 0, 0)), Some(t(9, 0, 1)), None)
        .unwrap_err();
    assert!(matches!(err, ReportError::InvalidRange(_)));
    assert_eq!(err.to_string(), "Time range cannot exceed 1 hour.");
}

#[test]
fn exactly_one_hour_and_empty_span_are_allowed() {
    assert!(hour().normalize(Some(t(8, 0, 0)), Some(t(9, 0, 0)), None).is_ok());
    assert!(hour().normalize(Some(t(8, 0, 0)), Some(t(8, 0, 0)), None).is_ok());
}

#[test]
fn window_past_the_calendar_edge_is_rejected() {
    // Earliest instant the epoch parser accepts
    let earliest = parse_timestamp("-8334601228800000").unwrap();
    let err = hour().normalize(None, Some(earliest), None).unwrap_err();
    assert!(matches!(err, ReportError::InvalidRange(_)), "{err:?}");

    let err = hour().normalize(Some(DateTime::<Utc>::MAX_UTC), None, None).unwrap_err();
    assert!(matches!(err, ReportError::InvalidRange(_)), "{err:?}");

    let err = hour().normalize(None, None, Some(DateTime::<Utc>::MIN_UTC)).unwrap_err();
    assert!(matches!(err, ReportError::InvalidRange(_)), "{err:?}");
}

#[test]
fn window_at_the_calendar_edge_with_room_is_accepted() {
    let near_end = DateTime::<Utc>::MAX_UTC - Duration::hours(2);
    let window = hour().normalize(Some(near_end), None, None).unwrap();
    assert_eq!(window.to, near_end + Duration::hours(1));
}

proptest! {
    #[test]
    fn spans_within_cap_pass_through(start in 0i64..4_000_000_000, span in 0i64..=3600) {
        let from = Utc.timestamp_opt(start, 0).unwrap();
        let to = from + Duration::seconds(span);
        let window = hour().normalize(Some(from), Some(to), None).unwrap();
        prop_assert_eq!(window.from, from);
        prop_assert_eq!(window.to, to);
    }

    #[test]
    fn spans_over_cap_always_fail(start in 0i64..4_000_000_000, extra in 1i64..1_000_000) {
        let from = Utc.timestamp_opt(start, 0).unwrap();
        let to = from + Duration::seconds(3600 + extra);
        let rejected = matches!(
            hour().normalize(Some(from), Some(to), None),
            Err(ReportError::InvalidRange(_))
        );
        prop_assert!(rejected);
    }

    #[test]
    fn single_bound_yields_exact_default_span(start in 0i64..4_000_000_000) {
        let anchor = Utc.timestamp_opt(start, 0).unwrap();
        let forward = hour().normalize(Some(anchor), None, None).unwrap();
        let backward = hour().normalize(None, Some(anchor), None).unwrap();
        prop_assert_eq!(forward.to - forward.from, Duration::hours(1));
        prop_assert_eq!(backward.to, anchor);
        prop_assert_eq!(backward.from, anchor - Duration::hours(1));
    }

    #[test]
    fn epoch_seconds_and_millis_agree(secs in 100_000_000i64..10_000_000_000) {
        let from_secs = parse_timestamp(&secs.to_string()).unwrap();
        let from_millis = parse_timestamp(&(secs * 1000).to_string()).unwrap();
        prop_assert_eq!(from_secs, from_millis);
    }
}
