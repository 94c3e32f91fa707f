//! HTTP surface: axum router and handlers.
//!
//! Routes:
//!   GET /                       liveness
//!   GET /content/               paginated report grouped by (group_id, sdt_in)
//!   GET /content/export         CSV stream of the same report
//!   PUT /content/               bulk feedback by (group_id, sdt_in)
//!   GET|PUT /frequency/...      the same, grouped by group_id

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{self, ReportError};
use crate::export::CsvExporter;
use crate::metrics::MetricsCollector;
use crate::models::{FeedbackItem, ReportView};
use crate::repository::SqliteReportRepository;
use crate::response::{ApiError, Envelope};
use crate::service::{ReportParams, ReportService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReportService>,
    pub metrics: MetricsCollector,
}

impl AppState {
    /// Wire the SQLite repository and service from configuration
    #[must_use]
    pub fn from_database(db: Arc<Database>, config: &AppConfig) -> Self {
        let repository = Arc::new(SqliteReportRepository::new(db, config));
        Self {
            service: Arc::new(ReportService::new(repository, config)),
            metrics: MetricsCollector::default(),
        }
    }
}

/// Build the application router
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/content", get(content_report).put(content_feedback))
        .route("/content/", get(content_report).put(content_feedback))
        .route("/content/export", get(content_export))
        .route("/frequency", get(frequency_report).put(frequency_feedback))
        .route("/frequency/", get(frequency_report).put(frequency_feedback))
        .route("/frequency/export", get(frequency_export))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello World!" }))
}

// ============================================================================
// Handlers
// ============================================================================

async fn content_report(State(state): State<AppState>, params: std::result::Result<Query<ReportParams>, QueryRejection>) -> Response {
    report(&state, ReportView::Content, "content_report", params).await
}

async fn frequency_report(State(state): State<AppState>, params: std::result::Result<Query<ReportParams>, QueryRejection>) -> Response {
    report(&state, ReportView::Frequency, "frequency_report", params).await
}

async fn content_export(State(state): State<AppState>, params: std::result::Result<Query<ReportParams>, QueryRejection>) -> Response {
    export(&state, ReportView::Content, "content_export", params).await
}

async fn frequency_export(State(state): State<AppState>, params: std::result::Result<Query<ReportParams>, QueryRejection>) -> Response {
    export(&state, ReportView::Frequency, "frequency_export", params).await
}

async fn content_feedback(State(state): State<AppState>, body: std::result::Result<Json<Vec<FeedbackItem>>, JsonRejection>) -> Response {
    feedback(&state, ReportView::Content, "content_feedback", body).await
}

async fn frequency_feedback(State(state): State<AppState>, body: std::result::Result<Json<Vec<FeedbackItem>>, JsonRejection>) -> Response {
    feedback(&state, ReportView::Frequency, "frequency_feedback", body).await
}

async fn report(
    state: &AppState,
    view: ReportView,
    endpoint: &'static str,
    params: std::result::Result<Query<ReportParams>, QueryRejection>,
) -> Response {
    let result = async {
        let Query(params) = params.map_err(|e| ReportError::InvalidParameter(e.body_text()))?;
        state.service.report(view, &params).await
    }
    .await;

    finish(state, endpoint, result.map(Envelope::page))
}

async fn export(
    state: &AppState,
    view: ReportView,
    endpoint: &'static str,
    params: std::result::Result<Query<ReportParams>, QueryRejection>,
) -> Response {
    let result = async {
        let Query(params) = params.map_err(|e| ReportError::InvalidParameter(e.body_text()))?;
        state.service.export(view, &params).await
    }
    .await;

    let result = result.map(|stream| {
        let disposition = format!("attachment; filename=\"{}\"", CsvExporter::new(view, false).file_name());
        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
                (
                    header::CONTENT_DISPOSITION,
                    HeaderValue::from_str(&disposition).unwrap_or_else(|_| HeaderValue::from_static("attachment")),
                ),
            ],
            Body::from_stream(stream.into_stream()),
        )
    });

    finish(state, endpoint, result)
}

async fn feedback(
    state: &AppState,
    view: ReportView,
    endpoint: &'static str,
    body: std::result::Result<Json<Vec<FeedbackItem>>, JsonRejection>,
) -> Response {
    let result = async {
        let Json(items) = body.map_err(|e| ReportError::InvalidParameter(e.body_text()))?;
        state.service.apply_feedback(view, items).await
    }
    .await;

    finish(state, endpoint, result.map(Envelope::updated))
}

/// Render the handler outcome and count it
fn finish<T: IntoResponse>(state: &AppState, endpoint: &'static str, result: error::Result<T>) -> Response {
    let response = match result {
        Ok(body) => body.into_response(),
        Err(err) => ApiError(err).into_response(),
    };
    state.metrics.record_request(endpoint, response.status().as_u16());
    response
}
