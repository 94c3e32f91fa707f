//! SMS Spam Report - aggregate reporting over an SMS message table
//!
//! A Rust library and HTTP service that groups stored SMS messages by
//! conversation (and optionally sender), labels each group spam / not-spam
//! from count thresholds, and serves paginated reports, CSV exports and bulk
//! feedback corrections.
//!
//! # Features
//!
//! - Time-window normalization for ISO 8601 and epoch inputs
//! - Grouping, labeling and pagination computed in one SQL pass
//! - Per-group message breakdowns for the returned page only
//! - Buffered and streamed CSV export
//! - Atomic bulk feedback updates

/// Grouping, counting and labeling
pub mod aggregation;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Per-group message breakdowns
pub mod details;
/// Error types
pub mod error;
/// CSV export, buffered and streamed
pub mod export;
/// Feedback corrections
pub mod feedback;
/// Export and seed files
pub mod file_writer;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Pagination over aggregate results
pub mod pager;
/// SQL statement builders
pub mod query;
/// Repository pattern for data access
pub mod repository;
/// JSON envelope and error mapping
pub mod response;
/// Database schema definitions
pub mod schema;
/// HTTP router and handlers
pub mod server;
/// Report orchestration
pub mod service;
/// Timestamp parsing and window normalization
pub mod time_range;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use aggregation::{AggregationEngine, LabelPolicy};
pub use config::AppConfig;
pub use db::Database;
pub use error::{ReportError, Result};
pub use models::{AggregateGroup, GroupKey, GroupReport, Label, MessageRecord, ReportFilter, ReportView, TimeWindow};
pub use repository::{ReportRepository, SqliteReportRepository};
pub use service::{ReportParams, ReportService};
pub use time_range::TimeRangeNormalizer;
