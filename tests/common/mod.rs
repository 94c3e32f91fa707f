//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use sms_spam_report::config::AppConfig;
use sms_spam_report::db::Database;
use sms_spam_report::models::{MessageRecord, ReportFilter, TimeWindow};

/// A database in a temp directory; the directory lives as long as this value
pub struct TestDb {
    pub dir: TempDir,
    pub db: Arc<Database>,
    pub config: AppConfig,
}

pub fn test_db() -> TestDb {
    test_db_with(AppConfig::default())
}

pub fn test_db_with(mut config: AppConfig) -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("sms.db");
    config.database.max_connections = 4;
    config.database.connection_timeout_secs = 5;

    let db = Database::new(path.to_str().expect("utf-8 temp path"), &config.database).expect("Failed to create database");
    TestDb {
        dir,
        db: Arc::new(db),
        config,
    }
}

/// 2025-09-10 08:00:00 UTC, start of the default test window
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap()
}

/// `[base_time, base_time + 1h]`
pub fn hour_window() -> TimeWindow {
    TimeWindow {
        from: base_time(),
        to: base_time() + Duration::hours(1),
    }
}

pub fn hour_filter() -> ReportFilter {
    ReportFilter::window(hour_window())
}

pub fn message(id: &str, ts: DateTime<Utc>, group_id: &str, sdt_in: &str, text: Option<&str>, label: Option<&str>) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        ts,
        sdt_in: sdt_in.to_string(),
        group_id: group_id.to_string(),
        sdt_out: Some("0999000111".to_string()),
        text_sms: text.map(str::to_string),
        predicted_label: label.map(str::to_string),
        llm_label: None,
        confidence: Some("0.9".to_string()),
        feedback: None,
    }
}

/// Rows for one (group, sender) pair, one second apart, starting `offset_min`
/// minutes after [`base_time`].
///
/// The first row reads `first <group>/<sender>`; the rest alternate between
/// `promo offer` (odd positions) and `hello there` (even positions). Labels:
/// `spam` rows first, then `not_spam`, then unlabeled.
pub fn group_rows(group_id: &str, sdt_in: &str, offset_min: i64, spam: usize, not_spam: usize, unlabeled: usize) -> Vec<MessageRecord> {
    let start = base_time() + Duration::minutes(offset_min);
    let total = spam + not_spam + unlabeled;

    (0..total)
        .map(|i| {
            let text = match i {
                0 => format!("first {group_id}/{sdt_in}"),
                i if i % 2 == 1 => "promo offer".to_string(),
                _ => "hello there".to_string(),
            };
            let label = if i < spam {
                Some("spam")
            } else if i < spam + not_spam {
                Some("not_spam")
            } else {
                None
            };
            message(
                &format!("{group_id}-{sdt_in}-{i:04}"),
                start + Duration::seconds(i as i64),
                group_id,
                sdt_in,
                Some(&text),
                label,
            )
        })
        .collect()
}

/// Insert a group and return its rows
pub fn seed_group(db: &Database, group_id: &str, sdt_in: &str, offset_min: i64, spam: usize, not_spam: usize, unlabeled: usize) -> Vec<MessageRecord> {
    let rows = group_rows(group_id, sdt_in, offset_min, spam, not_spam, unlabeled);
    db.insert_messages(&rows).expect("Failed to seed group");
    rows
}

/// Expected `(text, count)` breakdown for [`group_rows`] with `total` rows
pub fn expected_breakdown(group_id: &str, sdt_in: &str, total: usize) -> Vec<(String, u64)> {
    let rest = total.saturating_sub(1) as u64;
    let promo = rest.div_ceil(2);
    let hello = rest / 2;

    let mut counts = vec![(format!("first {group_id}/{sdt_in}"), 1)];
    if promo > 0 {
        counts.push(("promo offer".to_string(), promo));
    }
    if hello > 0 {
        counts.push(("hello there".to_string(), hello));
    }
    // Most frequent first, then text
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
