//! Timestamp parsing and query-window normalization.
//!
//! Clients send `from_datetime` / `to_datetime` either as ISO 8601 strings with
//! an explicit offset (or `Z`) or as Unix epoch numbers. Every accepted value is
//! converted to UTC here, so nothing downstream deals with offsets.
//!
//! Window policy:
//! - neither bound: `to` = latest stored timestamp (wall clock if none), `from = to - span`
//! - only `from`: `to = from + span`
//! - only `to`: `from = to - span`
//! - `to < from` or `to - from > span`: rejected with `InvalidRange`, never clamped

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};

use crate::error::{ReportError, Result};
use crate::models::TimeWindow;

/// Epoch magnitudes above this are milliseconds, below are seconds
const EPOCH_MILLIS_THRESHOLD: f64 = 2e10;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a client timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(invalid_format(raw));
    }

    if looks_numeric(value) {
        return parse_epoch(raw, value);
    }

    if let Some(dt) = parse_with_offset(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    // A literal '+' in a query string decodes to a space: "15:15:00 07:00"
    if let Some(idx) = value.rfind(' ') {
        let repaired = format!("{}+{}", &value[..idx], &value[idx + 1..]);
        if let Some(dt) = parse_with_offset(&repaired) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    if NAIVE_FORMATS
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
    {
        return Err(ReportError::InvalidTimestamp(format!(
            "Invalid datetime format: {raw}. Missing timezone info, use e.g. 2025-09-10T15:15:00+07:00"
        )));
    }

    Err(invalid_format(raw))
}

/// Parse an optional client timestamp.
pub fn parse_optional(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_timestamp)
        .transpose()
}

fn parse_with_offset(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .or_else(|| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z").ok())
        .or_else(|| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z").ok())
}

fn looks_numeric(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
}

fn parse_epoch(raw: &str, value: &str) -> Result<DateTime<Utc>> {
    let number: f64 = value.parse().map_err(|_| invalid_format(raw))?;
    if !number.is_finite() {
        return Err(invalid_format(raw));
    }

    let millis = if number.abs() > EPOCH_MILLIS_THRESHOLD {
        number
    } else {
        number * 1000.0
    };

    #[allow(clippy::cast_possible_truncation)]
    let millis = millis.round() as i64;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        ReportError::InvalidTimestamp(format!("Epoch timestamp out of range: {raw}"))
    })
}

fn invalid_format(raw: &str) -> ReportError {
    ReportError::InvalidTimestamp(format!(
        "Invalid datetime format: {raw}. Use ISO 8601, e.g., 2025-09-10T15:15:00+07:00"
    ))
}

/// Resolves optional `[from, to]` bounds into a concrete window.
#[derive(Debug, Clone, Copy)]
pub struct TimeRangeNormalizer {
    span: Duration,
}

impl TimeRangeNormalizer {
    /// Create a normalizer whose default window and maximum span are `span`
    #[must_use]
    pub const fn new(span: Duration) -> Self {
        Self { span }
    }

    /// Default and maximum window width
    #[must_use]
    pub const fn span(&self) -> Duration {
        self.span
    }

    /// True when the store has to be asked for its latest timestamp
    #[must_use]
    pub const fn needs_anchor(from: Option<&DateTime<Utc>>, to: Option<&DateTime<Utc>>) -> bool {
        from.is_none() && to.is_none()
    }

    /// Apply the window policy.
    ///
    /// `latest` is only consulted when both bounds are absent; `None` there
    /// means the store is empty and the wall clock is used instead.
    pub fn normalize(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> Result<TimeWindow> {
        let (from, to) = match (from, to) {
            (None, None) => {
                let to = latest.unwrap_or_else(Utc::now);
                (self.back_from(to)?, to)
            }
            (Some(from), None) => (from, self.forward_from(from)?),
            (None, Some(to)) => (self.back_from(to)?, to),
            (Some(from), Some(to)) => (from, to),
        };

        if to < from {
            return Err(ReportError::InvalidRange(
                "'to_datetime' cannot be earlier than 'from_datetime'.".to_string(),
            ));
        }

        if to - from > self.span {
            return Err(ReportError::InvalidRange(format!(
                "Time range cannot exceed {}.",
                describe_span(self.span)
            )));
        }

        Ok(TimeWindow { from, to })
    }

    fn back_from(&self, to: DateTime<Utc>) -> Result<DateTime<Utc>> {
        to.checked_sub_signed(self.span).ok_or_else(|| out_of_range(to))
    }

    fn forward_from(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        from.checked_add_signed(self.span).ok_or_else(|| out_of_range(from))
    }
}

fn out_of_range(anchor: DateTime<Utc>) -> ReportError {
    ReportError::InvalidRange(format!(
        "Time range around {} is outside the supported calendar.",
        anchor.to_rfc3339()
    ))
}

fn describe_span(span: Duration) -> String {
    let minutes = span.num_minutes();
    match (minutes / 60, minutes % 60) {
        (1, 0) => "1 hour".to_string(),
        (hours, 0) => format!("{hours} hours"),
        _ => format!("{minutes} minutes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_whole_hours_and_minutes() {
        assert_eq!(describe_span(Duration::minutes(60)), "1 hour");
        assert_eq!(describe_span(Duration::minutes(120)), "2 hours");
        assert_eq!(describe_span(Duration::minutes(90)), "90 minutes");
    }

    #[test]
    fn numeric_detection_rejects_dates() {
        assert!(looks_numeric("1757517300"));
        assert!(looks_numeric("1757517300.5"));
        assert!(!looks_numeric("2025-09-10"));
        assert!(!looks_numeric("1.2.3"));
    }
}
