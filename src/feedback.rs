//! Feedback Updater: bulk conditional write of human corrections.

use std::collections::HashMap;

use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{ReportError, Result};
use crate::models::{FeedbackCorrection, GroupKey, ReportView};
use crate::query;

#[derive(Debug, Clone)]
pub struct FeedbackUpdater {
    table: String,
}

impl FeedbackUpdater {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    /// Set `feedback` on every row matching one of the corrections.
    ///
    /// Runs a single `UPDATE` inside an immediate transaction and returns
    /// the number of rows changed. A repeated key keeps its last value.
    pub fn apply(&self, conn: &mut Connection, view: ReportView, corrections: &[FeedbackCorrection]) -> Result<usize> {
        if corrections.is_empty() {
            return Err(ReportError::EmptyInput);
        }

        let corrections = dedupe_last_wins(view, corrections)?;
        let q = query::feedback_update(&self.table, view, &corrections);
        debug!(sql = %q.sql, keys = corrections.len(), "Applying feedback");

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(&q.sql, params_from_iter(q.params.iter()))?;
        if updated == 0 {
            return Err(ReportError::NoMatch);
        }
        tx.commit()?;

        info!(view = %view, keys = corrections.len(), rows = updated, "Feedback applied");
        Ok(updated)
    }
}

/// Collapse repeated keys, keeping first-seen order and the last value.
fn dedupe_last_wins(view: ReportView, corrections: &[FeedbackCorrection]) -> Result<Vec<FeedbackCorrection>> {
    let mut positions: HashMap<GroupKey, usize> = HashMap::with_capacity(corrections.len());
    let mut unique: Vec<FeedbackCorrection> = Vec::with_capacity(corrections.len());

    for correction in corrections {
        let key = match view {
            ReportView::Content => match &correction.key.sdt_in {
                Some(_) => correction.key.clone(),
                None => {
                    return Err(ReportError::InvalidParameter(format!(
                        "sdt_in is required for content feedback (group_id {})",
                        correction.key.group_id
                    )))
                }
            },
            ReportView::Frequency => GroupKey::group(correction.key.group_id.clone()),
        };

        if let Some(&idx) = positions.get(&key) {
            unique[idx].feedback = correction.feedback;
        } else {
            positions.insert(key.clone(), unique.len());
            unique.push(FeedbackCorrection {
                key,
                feedback: correction.feedback,
            });
        }
    }

    Ok(unique)
}
