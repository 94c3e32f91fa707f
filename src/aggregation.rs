//! Aggregation Engine: groups message rows by view key and labels them.
//!
//! All of the grouping and counting runs inside SQLite (see
//! [`crate::query`]); this module owns the labeling thresholds and turns
//! result rows back into [`AggregateGroup`] values.

use std::ops::ControlFlow;

use chrono::NaiveDateTime;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::debug;

use crate::error::Result;
use crate::models::{AggregateGroup, GroupKey, Label, ReportFilter, ReportView};
use crate::query;
use crate::schema::sms;

/// Frequency thresholds deciding which groups are reported and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPolicy {
    /// Minimum frequency for a group with more spam than not-spam rows
    pub spam_min_frequency: u64,
    /// Minimum frequency for every other group
    pub not_spam_min_frequency: u64,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            spam_min_frequency: 20,
            not_spam_min_frequency: 30,
        }
    }
}

impl LabelPolicy {
    /// Label for a group, or `None` when it is excluded from reports.
    ///
    /// Mirrors the SQL in `query::labeled_cte`: inclusion is decided by the
    /// threshold matching the count comparison, the label by
    /// `spam_count >= not_spam_count`.
    #[must_use]
    pub const fn classify(&self, frequency: u64, spam_count: u64, not_spam_count: u64) -> Option<Label> {
        let included = if spam_count > not_spam_count {
            frequency >= self.spam_min_frequency
        } else {
            frequency >= self.not_spam_min_frequency
        };

        if !included {
            return None;
        }

        if spam_count >= not_spam_count {
            Some(Label::Spam)
        } else {
            Some(Label::NotSpam)
        }
    }
}

/// Builds and runs the grouped, labeled result set for one view.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    table: String,
    policy: LabelPolicy,
}

impl AggregationEngine {
    #[must_use]
    pub fn new(table: impl Into<String>, policy: LabelPolicy) -> Self {
        Self {
            table: table.into(),
            policy,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn policy(&self) -> LabelPolicy {
        self.policy
    }

    /// All included groups in report order
    pub fn aggregate(&self, conn: &Connection, view: ReportView, filter: &ReportFilter) -> Result<Vec<AggregateGroup>> {
        let mut groups = Vec::new();
        self.for_each_group(conn, view, filter, |group| {
            groups.push(group);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(groups)
    }

    /// Walk included groups in report order without materializing them.
    ///
    /// Stops early when `visit` breaks; returns the number of groups visited.
    pub fn for_each_group<F>(&self, conn: &Connection, view: ReportView, filter: &ReportFilter, mut visit: F) -> Result<u64>
    where
        F: FnMut(AggregateGroup) -> Result<ControlFlow<()>>,
    {
        let q = query::aggregate_query(&self.table, view, filter, self.policy);
        debug!(sql = %q.sql, view = %view, "Running aggregate query");

        let mut stmt = conn.prepare(&q.sql)?;
        let mut rows = stmt.query(params_from_iter(q.params.iter()))?;

        let mut visited = 0;
        while let Some(row) = rows.next()? {
            visited += 1;
            if visit(map_group(row, view)?)?.is_break() {
                break;
            }
        }

        Ok(visited)
    }

    /// Number of included groups
    pub fn count(&self, conn: &Connection, view: ReportView, filter: &ReportFilter) -> Result<u64> {
        let q = query::count_query(&self.table, view, filter, self.policy);
        let total: i64 = conn.query_row(&q.sql, params_from_iter(q.params.iter()), |row| row.get(0))?;
        Ok(to_count(total))
    }
}

/// Map an aggregate result row; columns are looked up by name
pub(crate) fn map_group(row: &Row<'_>, view: ReportView) -> rusqlite::Result<AggregateGroup> {
    let group_id: String = row.get(sms::GROUP_ID)?;
    let key = match view {
        ReportView::Content => GroupKey::sender(group_id, row.get::<_, String>(sms::SDT_IN)?),
        ReportView::Frequency => GroupKey::group(group_id),
    };
    let first_ts: NaiveDateTime = row.get("first_ts")?;

    Ok(AggregateGroup {
        key,
        first_ts: first_ts.and_utc(),
        frequency: to_count(row.get("frequency")?),
        agg_message: row.get("agg_message")?,
        spam_count: to_count(row.get("spam_count")?),
        not_spam_count: to_count(row.get("not_spam_count")?),
        label: row.get("label")?,
    })
}

/// SQLite counts are never negative
pub(crate) fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}
