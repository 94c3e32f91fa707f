//! SQL builders for the report queries.
//!
//! Every builder returns the statement text together with its positional
//! parameters. Only the table name and the schema column constants are
//! interpolated; every client-supplied value is bound.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::aggregation::LabelPolicy;
use crate::models::{FeedbackCorrection, GroupKey, Label, ReportFilter, ReportView};
use crate::schema::sms;

/// Storage format of the `ts` column: UTC, lexically ordered
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A statement and the values bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Render a timestamp the way the `ts` column stores it
#[must_use]
pub fn ts_param(ts: &DateTime<Utc>) -> Value {
    Value::Text(ts.naive_utc().format(TS_FORMAT).to_string())
}

fn key_list(view: ReportView) -> String {
    view.key_columns().join(", ")
}

/// `WHERE` body shared by aggregation, details and export.
///
/// The window is inclusive on both ends. Text filters use `instr` on
/// lowercased values so `%` and `_` in user input match literally.
#[must_use]
pub fn base_filter(filter: &ReportFilter) -> (String, Vec<Value>) {
    let mut clause = format!("{} BETWEEN ? AND ?", sms::TS);
    let mut params = vec![ts_param(&filter.window.from), ts_param(&filter.window.to)];

    if let Some(keyword) = &filter.text_keyword {
        clause.push_str(&format!(" AND instr(lower({}), lower(?)) > 0", sms::TEXT_SMS));
        params.push(Value::Text(keyword.clone()));
    }

    if let Some(phone) = &filter.phone_num {
        clause.push_str(&format!(" AND instr(lower({}), lower(?)) > 0", sms::SDT_IN));
        params.push(Value::Text(phone.clone()));
    }

    (clause, params)
}

/// The `filtered`, `grouped` and `labeled` CTEs.
///
/// `labeled` holds exactly the groups that pass the inclusion rule, each
/// with its first timestamp, frequency, representative message (earliest
/// row, lowest id on ties), spam / not-spam counts and derived label.
fn labeled_cte(table: &str, view: ReportView, filter: &ReportFilter, policy: LabelPolicy) -> (String, Vec<Value>) {
    let keys = key_list(view);
    let (where_clause, mut params) = base_filter(filter);

    let sql = format!(
        "WITH filtered AS (
            SELECT {keys}, {ts}, {text}, {predicted},
                   ROW_NUMBER() OVER (PARTITION BY {keys} ORDER BY {ts}, {id}) AS rn
            FROM {table}
            WHERE {where_clause}
        ),
        grouped AS (
            SELECT {keys},
                   MIN({ts}) AS first_ts,
                   COUNT(*) AS frequency,
                   MAX(CASE WHEN rn = 1 THEN {text} END) AS agg_message,
                   SUM(CASE WHEN {predicted} = '{spam}' THEN 1 ELSE 0 END) AS spam_count,
                   SUM(CASE WHEN {predicted} = '{not_spam}' THEN 1 ELSE 0 END) AS not_spam_count
            FROM filtered
            GROUP BY {keys}
        ),
        labeled AS (
            SELECT *,
                   CASE WHEN spam_count >= not_spam_count THEN '{spam}' ELSE '{not_spam}' END AS label
            FROM grouped
            WHERE (frequency >= ? AND spam_count > not_spam_count)
               OR (frequency >= ? AND spam_count <= not_spam_count)
        )",
        ts = sms::TS,
        id = sms::ID,
        text = sms::TEXT_SMS,
        predicted = sms::PREDICTED_LABEL,
        spam = Label::Spam.as_str(),
        not_spam = Label::NotSpam.as_str(),
    );

    params.push(count_param(policy.spam_min_frequency));
    params.push(count_param(policy.not_spam_min_frequency));
    (sql, params)
}

fn count_param(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn order_by(view: ReportView) -> String {
    format!("ORDER BY first_ts, {}", key_list(view))
}

fn projection(view: ReportView) -> String {
    format!(
        "{}, first_ts, frequency, agg_message, spam_count, not_spam_count, label",
        key_list(view)
    )
}

/// Every included group in report order, no pagination
#[must_use]
pub fn aggregate_query(table: &str, view: ReportView, filter: &ReportFilter, policy: LabelPolicy) -> SqlQuery {
    let (cte, params) = labeled_cte(table, view, filter, policy);
    SqlQuery {
        sql: format!("{cte}\nSELECT {} FROM labeled {}", projection(view), order_by(view)),
        params,
    }
}

/// One page of groups, each row carrying the total group count.
///
/// `COUNT(*) OVER ()` is evaluated over the full labeled set before
/// `LIMIT`, so slice and total come from the same statement.
#[must_use]
pub fn page_query(
    table: &str,
    view: ReportView,
    filter: &ReportFilter,
    policy: LabelPolicy,
    limit: u64,
    offset: u64,
) -> SqlQuery {
    let (cte, mut params) = labeled_cte(table, view, filter, policy);
    params.push(count_param(limit));
    params.push(count_param(offset));
    SqlQuery {
        sql: format!(
            "{cte}\nSELECT {}, COUNT(*) OVER () AS total_records FROM labeled {} LIMIT ? OFFSET ?",
            projection(view),
            order_by(view)
        ),
        params,
    }
}

/// Number of included groups
#[must_use]
pub fn count_query(table: &str, view: ReportView, filter: &ReportFilter, policy: LabelPolicy) -> SqlQuery {
    let (cte, params) = labeled_cte(table, view, filter, policy);
    SqlQuery {
        sql: format!("{cte}\nSELECT COUNT(*) FROM labeled"),
        params,
    }
}

/// Distinct texts and their counts for the given keys, under the base filter
#[must_use]
pub fn details_query(table: &str, view: ReportView, filter: &ReportFilter, keys: &[GroupKey]) -> SqlQuery {
    let key_cols = key_list(view);
    let (where_clause, mut params) = base_filter(filter);

    let membership = match view {
        ReportView::Content => {
            let tuples = vec!["(?, ?)"; keys.len()].join(", ");
            for key in keys {
                params.push(Value::Text(key.group_id.clone()));
                params.push(key.sdt_in.clone().map_or(Value::Null, Value::Text));
            }
            format!("({key_cols}) IN (VALUES {tuples})")
        }
        ReportView::Frequency => {
            let placeholders = vec!["?"; keys.len()].join(", ");
            params.extend(keys.iter().map(|key| Value::Text(key.group_id.clone())));
            format!("{} IN ({placeholders})", sms::GROUP_ID)
        }
    };

    SqlQuery {
        sql: format!(
            "SELECT {key_cols}, {text}, COUNT(*) AS message_count
             FROM {table}
             WHERE {where_clause} AND {membership}
             GROUP BY {key_cols}, {text}
             ORDER BY {key_cols}, message_count DESC, {text}",
            text = sms::TEXT_SMS,
        ),
        params,
    }
}

/// One conditional `UPDATE` applying every correction at once.
///
/// Keys are bound once as numbered parameters and reused by both the
/// `CASE` and the `WHERE`. Callers deduplicate keys beforehand.
#[must_use]
pub fn feedback_update(table: &str, view: ReportView, corrections: &[FeedbackCorrection]) -> SqlQuery {
    let mut params = Vec::new();
    let mut arms = Vec::with_capacity(corrections.len());
    let mut matches = Vec::with_capacity(corrections.len());

    for correction in corrections {
        let group = push_numbered(&mut params, Value::Text(correction.key.group_id.clone()));
        let condition = match (view, &correction.key.sdt_in) {
            (ReportView::Content, Some(sender)) => {
                let sender = push_numbered(&mut params, Value::Text(sender.clone()));
                format!("({} = ?{group} AND {} = ?{sender})", sms::GROUP_ID, sms::SDT_IN)
            }
            _ => format!("{} = ?{group}", sms::GROUP_ID),
        };
        let value = push_numbered(&mut params, Value::Integer(i64::from(correction.feedback)));
        arms.push(format!("WHEN {condition} THEN ?{value}"));
        matches.push(condition);
    }

    SqlQuery {
        sql: format!(
            "UPDATE {table} SET {feedback} = CASE {} END WHERE {}",
            arms.join(" "),
            matches.join(" OR "),
            feedback = sms::FEEDBACK,
        ),
        params,
    }
}

fn push_numbered(params: &mut Vec<Value>, value: Value) -> usize {
    params.push(value);
    params.len()
}
