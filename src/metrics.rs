use metrics::{counter, histogram};
use std::time::{Duration, Instant};

use crate::models::ReportView;

/// Metric names recorded by the service.
///
/// Only the `metrics` facade is used; without an installed recorder every
/// call is a no-op, so embedding the library costs nothing.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    pub requests_total: &'static str,
    pub query_duration: &'static str,
    pub feedback_rows_updated: &'static str,
    pub export_rows: &'static str,
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: "sms_report_requests_total",
            query_duration: "sms_report_query_duration_seconds",
            feedback_rows_updated: "sms_report_feedback_rows_updated_total",
            export_rows: "sms_report_export_rows_total",
            errors_total: "sms_report_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Count one HTTP request by route and response status
    pub fn record_request(&self, endpoint: &'static str, status: u16) {
        counter!(self.requests_total, "endpoint" => endpoint, "status" => status.to_string()).increment(1);
    }

    /// Record a store operation's latency
    pub fn record_query(&self, operation: &'static str, duration: Duration, success: bool) {
        histogram!(
            self.query_duration,
            "operation" => operation,
            "status" => if success { "success" } else { "error" }
        )
        .record(duration.as_secs_f64());

        if !success {
            counter!(self.errors_total, "operation" => operation).increment(1);
        }
    }

    pub fn record_feedback_rows(&self, view: ReportView, rows: usize) {
        counter!(self.feedback_rows_updated, "view" => view.as_str()).increment(rows as u64);
    }

    pub fn record_export_rows(&self, view: ReportView, rows: u64) {
        counter!(self.export_rows, "view" => view.as_str()).increment(rows);
    }
}

/// Performance timing wrapper for metrics
pub struct MetricsTimer {
    collector: MetricsCollector,
    operation: &'static str,
    start: Instant,
}

impl MetricsTimer {
    #[must_use]
    pub fn new(collector: MetricsCollector, operation: &'static str) -> Self {
        Self {
            collector,
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        self.collector.record_query(self.operation, duration, success);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_names() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.requests_total, "sms_report_requests_total");
        assert!(collector.query_duration.ends_with("_seconds"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::default();
        collector.record_request("content", 200);
        collector.record_feedback_rows(ReportView::Frequency, 3);
        let elapsed = MetricsTimer::new(collector, "page_report").finish(true);
        assert!(elapsed < Duration::from_secs(5));
    }
}
