use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use tokio::task;
use tracing::{debug, info};

use crate::aggregation::AggregationEngine;
use crate::config::AppConfig;
use crate::db::Database;
use crate::details::MessageDetailResolver;
use crate::error::Result;
use crate::export::{self, CsvExporter, ExportStream};
use crate::feedback::FeedbackUpdater;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::{AggregateGroup, FeedbackCorrection, GroupReport, Page, ReportFilter, ReportView};
use crate::pager::{PageRequest, Pager};

/// Storage seam for the report service.
///
/// Inputs arrive validated; implementations only talk to the store.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Latest message timestamp, `None` when the store is empty
    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// One page of groups with their message breakdown and the total count
    async fn page_report(&self, view: ReportView, filter: ReportFilter, request: PageRequest) -> Result<Page<GroupReport>>;

    /// Every included group, unpaginated
    async fn export_groups(&self, view: ReportView, filter: ReportFilter) -> Result<Vec<AggregateGroup>>;

    /// Start a streamed CSV export; fails early if no connection is available
    async fn open_export_stream(&self, view: ReportView, filter: ReportFilter, empty_sentinel: bool) -> Result<ExportStream>;

    /// Apply feedback corrections, returning rows updated
    async fn apply_feedback(&self, view: ReportView, corrections: Vec<FeedbackCorrection>) -> Result<usize>;
}

/// Export channel settings
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub channel_capacity: usize,
    pub timeout: Duration,
}

/// SQLite-backed repository; every store call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteReportRepository {
    db: Arc<Database>,
    engine: AggregationEngine,
    pager: Pager,
    details: MessageDetailResolver,
    feedback: FeedbackUpdater,
    stream: StreamSettings,
    metrics: MetricsCollector,
}

impl SqliteReportRepository {
    #[must_use]
    pub fn new(db: Arc<Database>, config: &AppConfig) -> Self {
        let table = db.table().to_string();
        let engine = AggregationEngine::new(table.clone(), config.label_policy());
        Self {
            pager: Pager::new(engine.clone()),
            details: MessageDetailResolver::new(table.clone()),
            feedback: FeedbackUpdater::new(table),
            engine,
            stream: StreamSettings {
                channel_capacity: config.export.channel_capacity,
                timeout: config.export_timeout(),
            },
            metrics: MetricsCollector::default(),
            db,
        }
    }

    /// Run `f` on the blocking pool and time it
    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let timer = MetricsTimer::new(self.metrics, operation);
        let this = self.clone();
        let result = task::spawn_blocking(move || f(this)).await?;
        let elapsed = timer.finish(result.is_ok());
        debug!(operation, duration_ms = elapsed.as_millis() as u64, "Store operation finished");
        result
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        self.blocking("latest_timestamp", |repo| repo.db.max_timestamp()).await
    }

    async fn page_report(&self, view: ReportView, filter: ReportFilter, request: PageRequest) -> Result<Page<GroupReport>> {
        self.blocking("page_report", move |repo| {
            let mut conn = repo.db.get_connection()?;
            // Slice, total and details read one snapshot
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

            let page = repo.pager.page(&tx, view, &filter, request)?;
            let keys: Vec<_> = page.items.iter().map(|group| group.key.clone()).collect();
            let mut details = repo.details.resolve(&tx, view, &filter, &keys)?;
            drop(tx);

            let first = request.first_ordinal();
            let items = page
                .items
                .into_iter()
                .zip(first..)
                .map(|(group, stt)| {
                    let messages = details.remove(&group.key).unwrap_or_default();
                    GroupReport::new(stt, group, messages)
                })
                .collect();

            Ok(Page {
                items,
                total: page.total,
                page: page.page,
                page_size: page.page_size,
            })
        })
        .await
    }

    async fn export_groups(&self, view: ReportView, filter: ReportFilter) -> Result<Vec<AggregateGroup>> {
        let groups = self
            .blocking("export_groups", move |repo| {
                let conn = repo.db.get_connection()?;
                repo.engine.aggregate(&conn, view, &filter)
            })
            .await?;
        self.metrics.record_export_rows(view, groups.len() as u64);
        Ok(groups)
    }

    async fn open_export_stream(&self, view: ReportView, filter: ReportFilter, empty_sentinel: bool) -> Result<ExportStream> {
        // Acquire the connection first so pool errors surface before any bytes are sent
        let mut conn = self.blocking("export_connect", |repo| repo.db.get_connection()).await?;

        let (sink, stream) = export::export_channel(self.stream.channel_capacity, self.stream.timeout)?;
        let exporter = CsvExporter::new(view, empty_sentinel);
        let engine = self.engine.clone();
        let metrics = self.metrics;

        task::spawn_blocking(move || {
            let timer = MetricsTimer::new(metrics, "export_stream");
            let rows = export::stream_groups(&mut conn, &engine, exporter, &filter, sink);
            timer.finish(true);
            metrics.record_export_rows(view, rows);
            info!(view = %view, rows, "Export stream finished");
        });

        Ok(stream)
    }

    async fn apply_feedback(&self, view: ReportView, corrections: Vec<FeedbackCorrection>) -> Result<usize> {
        let updated = self
            .blocking("apply_feedback", move |repo| {
                let mut conn = repo.db.get_connection()?;
                repo.feedback.apply(&mut conn, view, &corrections)
            })
            .await?;
        self.metrics.record_feedback_rows(view, updated);
        Ok(updated)
    }
}
