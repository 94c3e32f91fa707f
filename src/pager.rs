//! Pager: one page of the aggregate result plus the total group count.

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::aggregation::{map_group, to_count, AggregationEngine};
use crate::error::Result;
use crate::models::{AggregateGroup, Page, ReportFilter, ReportView};
use crate::query;
use crate::validation::InputValidator;

/// Validated 1-based page number and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: crate::validation::DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Parse raw query values; absent values fall back to page 1 / default size
    pub fn parse(page: Option<&str>, page_size: Option<&str>) -> Result<Self> {
        Ok(Self {
            page: InputValidator::validate_page(page)?,
            page_size: InputValidator::validate_page_size(page_size)?,
        })
    }

    /// Rows skipped before this page
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }

    /// `stt` of the first item on this page
    #[must_use]
    pub const fn first_ordinal(&self) -> u64 {
        self.offset() + 1
    }
}

/// Slices the engine's ordered result.
#[derive(Debug, Clone)]
pub struct Pager {
    engine: AggregationEngine,
}

impl Pager {
    #[must_use]
    pub const fn new(engine: AggregationEngine) -> Self {
        Self { engine }
    }

    /// Fetch one page and the total in a single statement.
    ///
    /// A page past the end returns no rows and therefore no window count;
    /// the total is then recounted on the same connection, so callers that
    /// hold a read transaction still see one snapshot.
    pub fn page(
        &self,
        conn: &Connection,
        view: ReportView,
        filter: &ReportFilter,
        request: PageRequest,
    ) -> Result<Page<AggregateGroup>> {
        let q = query::page_query(
            self.engine.table(),
            view,
            filter,
            self.engine.policy(),
            u64::from(request.page_size),
            request.offset(),
        );
        debug!(sql = %q.sql, page = request.page, page_size = request.page_size, "Running page query");

        let mut stmt = conn.prepare(&q.sql)?;
        let mut rows = stmt.query(params_from_iter(q.params.iter()))?;

        let mut items = Vec::with_capacity(request.page_size as usize);
        let mut total = None;
        while let Some(row) = rows.next()? {
            if total.is_none() {
                total = Some(to_count(row.get("total_records")?));
            }
            items.push(map_group(row, view)?);
        }

        let total = match total {
            Some(total) => total,
            None if request.page > 1 => self.engine.count(conn, view, filter)?,
            None => 0,
        };

        Ok(Page {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        })
    }
}
