//! Message Detail Resolver: per-group breakdown of distinct message texts.

use std::collections::HashMap;

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::aggregation::to_count;
use crate::error::Result;
use crate::models::{GroupKey, MessageCount, ReportFilter, ReportView};
use crate::query;
use crate::schema::sms;

#[derive(Debug, Clone)]
pub struct MessageDetailResolver {
    table: String,
}

impl MessageDetailResolver {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    /// Distinct texts and counts for `keys` only, most frequent first.
    ///
    /// Keys that match no rows are absent from the map; callers treat a
    /// missing entry as an empty list.
    pub fn resolve(
        &self,
        conn: &Connection,
        view: ReportView,
        filter: &ReportFilter,
        keys: &[GroupKey],
    ) -> Result<HashMap<GroupKey, Vec<MessageCount>>> {
        let mut details: HashMap<GroupKey, Vec<MessageCount>> = HashMap::with_capacity(keys.len());
        if keys.is_empty() {
            return Ok(details);
        }

        let q = query::details_query(&self.table, view, filter, keys);
        debug!(sql = %q.sql, keys = keys.len(), "Resolving message details");

        let mut stmt = conn.prepare(&q.sql)?;
        let rows = stmt.query_map(params_from_iter(q.params.iter()), |row| {
            let group_id: String = row.get(sms::GROUP_ID)?;
            let key = match view {
                ReportView::Content => GroupKey::sender(group_id, row.get::<_, String>(sms::SDT_IN)?),
                ReportView::Frequency => GroupKey::group(group_id),
            };
            let count = MessageCount {
                text_sms: row.get(sms::TEXT_SMS)?,
                count: to_count(row.get("message_count")?),
            };
            Ok((key, count))
        })?;

        for row in rows {
            let (key, count) = row?;
            details.entry(key).or_default().push(count);
        }

        Ok(details)
    }
}
