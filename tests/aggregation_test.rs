//! Integration tests for the aggregation engine against a real SQLite file

mod common;

use chrono::Duration;
use proptest::prelude::*;

use common::{base_time, hour_filter, message, seed_group, test_db};
use sms_spam_report::aggregation::{AggregationEngine, LabelPolicy};
use sms_spam_report::models::{GroupKey, Label, ReportFilter, ReportView};

fn engine() -> AggregationEngine {
    AggregationEngine::new("sms_data", LabelPolicy::default())
}

#[test]
fn test_spam_majority_above_spam_threshold_is_spam() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901", 0, 15, 10, 0);

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();

    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.key, GroupKey::sender("g1", "0901"));
    assert_eq!(group.frequency, 25);
    assert_eq!(group.spam_count, 15);
    assert_eq!(group.not_spam_count, 10);
    assert_eq!(group.label, Label::Spam);
    assert_eq!(group.first_ts, base_time());
    assert_eq!(group.agg_message.as_deref(), Some("first g1/0901"));
}

#[test]
fn test_not_spam_majority_above_threshold_is_not_spam() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901", 0, 10, 25, 0);

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].frequency, 35);
    assert_eq!(groups[0].label, Label::NotSpam);
}

#[test]
fn test_not_spam_majority_below_higher_threshold_is_excluded() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901", 0, 10, 15, 0);

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();
    assert!(groups.is_empty());
}

#[test]
fn test_small_groups_are_excluded() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901", 0, 19, 0, 0);
    seed_group(&t.db, "g2", "0902", 0, 0, 0, 29);

    let conn = t.db.get_connection().unwrap();
    assert!(engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap().is_empty());
    assert_eq!(engine().count(&conn, ReportView::Content, &hour_filter()).unwrap(), 0);
}

#[test]
fn test_unlabeled_rows_count_toward_frequency() {
    let t = test_db();
    // 21 rows, spam 2 vs not_spam 1: spam majority over the spam threshold
    seed_group(&t.db, "g1", "0901", 0, 2, 1, 18);

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].frequency, 21);
    assert_eq!(groups[0].label, Label::Spam);
}

#[test]
fn test_equal_counts_label_spam_at_higher_threshold() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901", 0, 15, 15, 0);
    seed_group(&t.db, "g2", "0902", 5, 12, 12, 0);

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key.group_id, "g1");
    assert_eq!(groups[0].label, Label::Spam);
}

#[test]
fn test_ordering_by_first_ts_then_keys() {
    let t = test_db();
    seed_group(&t.db, "g3", "0901", 10, 20, 0, 0);
    seed_group(&t.db, "g2", "0902", 0, 20, 0, 0);
    seed_group(&t.db, "g1", "0909", 0, 20, 0, 0);
    seed_group(&t.db, "g1", "0903", 0, 20, 0, 0);

    let conn = t.db.get_connection().unwrap();
    let keys: Vec<_> = engine()
        .aggregate(&conn, ReportView::Content, &hour_filter())
        .unwrap()
        .into_iter()
        .map(|group| group.key)
        .collect();

    assert_eq!(
        keys,
        vec![
            GroupKey::sender("g1", "0903"),
            GroupKey::sender("g1", "0909"),
            GroupKey::sender("g2", "0902"),
            GroupKey::sender("g3", "0901"),
        ]
    );
}

#[test]
fn test_window_bounds_are_inclusive() {
    let t = test_db();
    let from = base_time();
    let to = base_time() + Duration::hours(1);

    let mut rows = Vec::new();
    for i in 0..10 {
        rows.push(message(&format!("start-{i}"), from, "g1", "0901", Some("edge"), Some("spam")));
        rows.push(message(&format!("end-{i}"), to, "g1", "0901", Some("edge"), Some("spam")));
    }
    // Just outside on both sides
    rows.push(message("before", from - Duration::seconds(1), "g1", "0901", Some("out"), Some("spam")));
    rows.push(message("after", to + Duration::milliseconds(1), "g1", "0901", Some("out"), Some("spam")));
    t.db.insert_messages(&rows).unwrap();

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].frequency, 20);
    assert_eq!(groups[0].first_ts, from);
}

#[test]
fn test_representative_message_ties_break_on_lowest_id() {
    let t = test_db();
    let mut rows: Vec<_> = (0..19)
        .map(|i| {
            message(
                &format!("m-{i:02}"),
                base_time() + Duration::seconds(5 + i),
                "g1",
                "0901",
                Some("later"),
                Some("spam"),
            )
        })
        .collect();
    rows.push(message("b-tied", base_time(), "g1", "0901", Some("from b"), Some("spam")));
    rows.push(message("a-tied", base_time(), "g1", "0901", Some("from a"), Some("spam")));
    t.db.insert_messages(&rows).unwrap();

    let conn = t.db.get_connection().unwrap();
    let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].agg_message.as_deref(), Some("from a"));
}

#[test]
fn test_keyword_filter_is_case_insensitive_and_narrows_counts() {
    let t = test_db();
    // 41 rows: 20 "promo offer" + 20 "hello there" + the first row
    seed_group(&t.db, "g1", "0901", 0, 41, 0, 0);

    let conn = t.db.get_connection().unwrap();
    let filter = ReportFilter {
        text_keyword: Some("PROMO".to_string()),
        ..hour_filter()
    };
    let groups = engine().aggregate(&conn, ReportView::Content, &filter).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].frequency, 20);
    assert_eq!(groups[0].agg_message.as_deref(), Some("promo offer"));
}

#[test]
fn test_keyword_spaces_are_part_of_the_match() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901", 0, 41, 0, 0);
    let conn = t.db.get_connection().unwrap();

    let leading = ReportFilter {
        text_keyword: Some(" offer".to_string()),
        ..hour_filter()
    };
    let groups = engine().aggregate(&conn, ReportView::Content, &leading).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].frequency, 20);

    // "promo offer" never has a trailing space
    let trailing = ReportFilter {
        text_keyword: Some("offer ".to_string()),
        ..hour_filter()
    };
    assert!(engine().aggregate(&conn, ReportView::Content, &trailing).unwrap().is_empty());
}

#[test]
fn test_keyword_wildcards_match_literally() {
    let t = test_db();
    let rows: Vec<_> = (0..20)
        .map(|i| {
            let text = if i % 2 == 0 { "50% off today" } else { "500 points" };
            message(&format!("m-{i:02}"), base_time() + Duration::seconds(i), "g1", "0901", Some(text), Some("spam"))
        })
        .collect();
    t.db.insert_messages(&rows).unwrap();

    let conn = t.db.get_connection().unwrap();
    let filter = ReportFilter {
        text_keyword: Some("50%".to_string()),
        ..hour_filter()
    };
    // Only the 10 literal matches: below the spam threshold
    assert!(engine().aggregate(&conn, ReportView::Content, &filter).unwrap().is_empty());

    let relaxed = AggregationEngine::new("sms_data", LabelPolicy {
        spam_min_frequency: 10,
        not_spam_min_frequency: 10,
    });
    let groups = relaxed.aggregate(&conn, ReportView::Content, &filter).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].frequency, 10);
}

#[test]
fn test_phone_filter_matches_sender_substring() {
    let t = test_db();
    seed_group(&t.db, "g1", "0901234567", 0, 20, 0, 0);
    seed_group(&t.db, "g2", "0987654321", 0, 20, 0, 0);

    let conn = t.db.get_connection().unwrap();
    let filter = ReportFilter {
        phone_num: Some("1234".to_string()),
        ..hour_filter()
    };
    let groups = engine().aggregate(&conn, ReportView::Content, &filter).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key, GroupKey::sender("g1", "0901234567"));
}

#[test]
fn test_frequency_view_merges_senders() {
    let t = test_db();
    // Neither sender reaches a threshold alone; together they make 24 spam-majority rows
    seed_group(&t.db, "g1", "0901", 2, 12, 0, 0);
    seed_group(&t.db, "g1", "0902", 0, 8, 4, 0);

    let conn = t.db.get_connection().unwrap();
    assert!(engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap().is_empty());

    let groups = engine().aggregate(&conn, ReportView::Frequency, &hour_filter()).unwrap();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.key, GroupKey::group("g1"));
    assert_eq!(group.frequency, 24);
    assert_eq!(group.spam_count, 20);
    assert_eq!(group.not_spam_count, 4);
    assert_eq!(group.first_ts, base_time());
    assert_eq!(group.agg_message.as_deref(), Some("first g1/0902"));
}

#[test]
fn test_for_each_group_stops_on_break() {
    let t = test_db();
    for g in 0..5 {
        seed_group(&t.db, &format!("g{g}"), "0901", g, 20, 0, 0);
    }

    let conn = t.db.get_connection().unwrap();
    let mut seen = Vec::new();
    let visited = engine()
        .for_each_group(&conn, ReportView::Content, &hour_filter(), |group| {
            seen.push(group.key.group_id);
            Ok(if seen.len() == 2 {
                std::ops::ControlFlow::Break(())
            } else {
                std::ops::ControlFlow::Continue(())
            })
        })
        .unwrap();

    assert_eq!(visited, 2);
    assert_eq!(seen, vec!["g0", "g1"]);
    assert_eq!(engine().count(&conn, ReportView::Content, &hour_filter()).unwrap(), 5);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stored_groups_follow_the_label_policy(spam in 0usize..40, not_spam in 0usize..40, unlabeled in 0usize..15) {
        prop_assume!(spam + not_spam + unlabeled > 0);
        let t = test_db();
        seed_group(&t.db, "g1", "0901", 0, spam, not_spam, unlabeled);

        let conn = t.db.get_connection().unwrap();
        let groups = engine().aggregate(&conn, ReportView::Content, &hour_filter()).unwrap();
        let expected = LabelPolicy::default().classify(
            (spam + not_spam + unlabeled) as u64,
            spam as u64,
            not_spam as u64,
        );

        prop_assert_eq!(groups.first().map(|group| group.label), expected);
        prop_assert!(groups.len() <= 1);
    }
}
