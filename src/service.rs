use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::Result;
use crate::export::{CsvExporter, ExportStream};
use crate::logging::OperationTimer;
use crate::models::{FeedbackCorrection, FeedbackItem, GroupKey, GroupReport, Page, ReportFilter, ReportView};
use crate::pager::PageRequest;
use crate::repository::ReportRepository;
use crate::time_range::{parse_optional, TimeRangeNormalizer};
use crate::validation::InputValidator;

/// Raw report query parameters, exactly as clients send them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportParams {
    pub from_datetime: Option<String>,
    pub to_datetime: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub text_keyword: Option<String>,
    pub phone_num: Option<String>,
}

/// Orchestrates validation, window resolution and repository calls.
///
/// Every input check runs before the repository is touched.
pub struct ReportService {
    repository: Arc<dyn ReportRepository>,
    normalizer: TimeRangeNormalizer,
    default_to_latest: bool,
    empty_sentinel: bool,
    max_feedback_items: usize,
}

impl ReportService {
    #[must_use]
    pub fn new(repository: Arc<dyn ReportRepository>, config: &AppConfig) -> Self {
        Self {
            repository,
            normalizer: TimeRangeNormalizer::new(config.window()),
            default_to_latest: config.reporting.default_to_latest,
            empty_sentinel: config.export.empty_sentinel,
            max_feedback_items: config.feedback.max_items,
        }
    }

    /// Resolve the window and text filters for `view`.
    ///
    /// The frequency view has no sender filter; `phone_num` is ignored there.
    pub async fn resolve_filter(&self, view: ReportView, params: &ReportParams) -> Result<ReportFilter> {
        let from = parse_optional(params.from_datetime.as_deref())?;
        let to = parse_optional(params.to_datetime.as_deref())?;
        let text_keyword = InputValidator::validate_keyword(params.text_keyword.as_deref())?;
        let phone_num = match view {
            ReportView::Content => InputValidator::validate_phone_pattern(params.phone_num.as_deref())?,
            ReportView::Frequency => None,
        };

        let latest = if self.default_to_latest && TimeRangeNormalizer::needs_anchor(from.as_ref(), to.as_ref()) {
            self.repository.latest_timestamp().await?
        } else {
            None
        };

        let window = self.normalizer.normalize(from, to, latest)?;
        debug!(view = %view, from = %window.from, to = %window.to, "Resolved report window");

        Ok(ReportFilter {
            window,
            text_keyword,
            phone_num,
        })
    }

    /// Paginated report with per-group message breakdown
    pub async fn report(&self, view: ReportView, params: &ReportParams) -> Result<Page<GroupReport>> {
        let timer = OperationTimer::new(&format!("{view}_report"));
        let request = PageRequest::parse(params.page.as_deref(), params.page_size.as_deref())?;
        let filter = self.resolve_filter(view, params).await?;

        info!(
            view = %view,
            from = %filter.window.from,
            to = %filter.window.to,
            page = request.page,
            page_size = request.page_size,
            "Serving report"
        );

        let page = self.repository.page_report(view, filter, request).await?;
        timer.finish();
        Ok(page)
    }

    /// Streamed CSV export of every included group
    pub async fn export(&self, view: ReportView, params: &ReportParams) -> Result<ExportStream> {
        let filter = self.resolve_filter(view, params).await?;
        info!(view = %view, from = %filter.window.from, to = %filter.window.to, "Starting export stream");
        self.repository
            .open_export_stream(view, filter, self.empty_sentinel)
            .await
    }

    /// Buffered CSV export, used by the CLI
    pub async fn export_buffered(&self, view: ReportView, params: &ReportParams) -> Result<Vec<u8>> {
        let timer = OperationTimer::new(&format!("{view}_export"));
        let filter = self.resolve_filter(view, params).await?;
        let groups = self.repository.export_groups(view, filter).await?;

        let mut body = Vec::new();
        let rows = CsvExporter::new(view, self.empty_sentinel).write_all(&groups, &mut body)?;
        info!(view = %view, rows, "Buffered export finished");
        timer.finish();
        Ok(body)
    }

    /// Validate and apply a feedback batch, returning rows updated
    pub async fn apply_feedback(&self, view: ReportView, items: Vec<FeedbackItem>) -> Result<usize> {
        InputValidator::validate_feedback_batch(items.len(), self.max_feedback_items)?;

        let mut corrections = Vec::with_capacity(items.len());
        for item in items {
            InputValidator::validate_key_part("group_id", &item.group_id)?;
            let key = match view {
                ReportView::Content => {
                    let sdt_in = item.sdt_in.unwrap_or_default();
                    InputValidator::validate_key_part("sdt_in", &sdt_in)?;
                    GroupKey::sender(item.group_id, sdt_in)
                }
                ReportView::Frequency => GroupKey::group(item.group_id),
            };
            corrections.push(FeedbackCorrection {
                key,
                feedback: item.feedback,
            });
        }

        let updated = self.repository.apply_feedback(view, corrections).await?;
        info!(view = %view, rows = updated, "Feedback updated");
        Ok(updated)
    }
}
