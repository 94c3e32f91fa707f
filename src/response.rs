//! JSON response envelope and error-to-status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::ReportError;
use crate::models::Page;

pub const SUCCESS: &str = "Success";
pub const NO_DATA: &str = "No data found";
pub const FAILURE: &str = "Failure";

/// Success envelope; `page` / `limit` / `total` appear only on paginated reads
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub status_code: u16,
    pub message: String,
    pub data: T,
    pub error: bool,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            message: message.into(),
            data,
            error: false,
            error_message: None,
            page: None,
            limit: None,
            total: None,
        }
    }
}

impl<T: Serialize> Envelope<Vec<T>> {
    /// Paginated envelope; an empty page reads "No data found"
    pub fn page(page: Page<T>) -> Self {
        let message = if page.items.is_empty() { NO_DATA } else { SUCCESS };
        Self {
            page: Some(page.page),
            limit: Some(page.page_size),
            total: Some(page.total),
            ..Self::ok(message, page.items)
        }
    }
}

impl Envelope<()> {
    /// Feedback acknowledgement with a null `data`
    #[must_use]
    pub fn updated(rows: usize) -> Self {
        Self::ok(format!("Updated {rows} records"), ())
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Failure envelope; every field is always present
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub message: &'static str,
    pub data: Option<()>,
    pub error: bool,
    pub error_message: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub total: Option<u64>,
}

/// HTTP status for each error kind
#[must_use]
pub fn status_for(err: &ReportError) -> StatusCode {
    match err {
        ReportError::InvalidTimestamp(_) | ReportError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReportError::InvalidRange(_) | ReportError::EmptyInput => StatusCode::BAD_REQUEST,
        ReportError::NoMatch => StatusCode::NOT_FOUND,
        ReportError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
        ReportError::ExportTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ReportError::Database(_) | ReportError::Csv(_) | ReportError::Io(_) | ReportError::Task(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Handler error: a [`ReportError`] rendered as a failure envelope
#[derive(Debug)]
pub struct ApiError(pub ReportError);

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        Self(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }

    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        let status = self.status();
        // Store details stay in the log
        let error_message = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.0.to_string()
        };

        ErrorEnvelope {
            status_code: status.as_u16(),
            message: FAILURE,
            data: None,
            error: true,
            error_message,
            page: None,
            limit: None,
            total: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_client_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (status, Json(self.envelope())).into_response()
    }
}
