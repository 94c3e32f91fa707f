//! Data models for message rows and report results
//!
//! This module contains the raw SMS row, the two report views and their
//! grouping keys, the derived aggregate group, and the feedback correction
//! payload. Aggregates are request-scoped: nothing here is cached.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::schema::sms;

/// One SMS event as stored in the message table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message identifier (unique together with `ts`)
    pub id: String,
    /// Event timestamp
    pub ts: DateTime<Utc>,
    /// Sender phone number
    pub sdt_in: String,
    /// Conversation identifier
    pub group_id: String,
    /// Recipient phone number
    pub sdt_out: Option<String>,
    /// Message body
    pub text_sms: Option<String>,
    /// Upstream classifier label
    pub predicted_label: Option<String>,
    /// External override label
    pub llm_label: Option<String>,
    /// Classifier confidence, string encoded
    pub confidence: Option<String>,
    /// Human correction flag
    pub feedback: Option<bool>,
}

/// Which grouping a report is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportView {
    /// Grouped by conversation and sender
    Content,
    /// Grouped by conversation only
    Frequency,
}

impl ReportView {
    /// Columns forming the aggregation key, in ordering priority
    #[must_use]
    pub const fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::Content => &[sms::GROUP_ID, sms::SDT_IN],
            Self::Frequency => &[sms::GROUP_ID],
        }
    }

    /// Route / file-name stem for this view
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Frequency => "frequency",
        }
    }
}

impl fmt::Display for ReportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportView {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "content" => Ok(Self::Content),
            "frequency" => Ok(Self::Frequency),
            other => Err(ReportError::InvalidParameter(format!(
                "Unknown report view: {other}. Must be one of: content, frequency"
            ))),
        }
    }
}

/// Derived spam classification of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// At least as many spam as not-spam predictions
    Spam,
    /// Strictly more not-spam than spam predictions
    NotSpam,
}

impl Label {
    /// Stored / rendered representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::NotSpam => "not_spam",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(Self::Spam),
            "not_spam" => Ok(Self::NotSpam),
            other => Err(ReportError::InvalidParameter(format!("Unknown label: {other}"))),
        }
    }
}

impl FromSql for Label {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: ReportError| FromSqlError::Other(Box::new(e)))
    }
}

/// Aggregation key: `group_id` alone, or `group_id` + sender
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    /// Conversation identifier
    pub group_id: String,
    /// Sender phone number, present for the content view only
    pub sdt_in: Option<String>,
}

impl GroupKey {
    /// Key for the frequency view
    #[must_use]
    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            sdt_in: None,
        }
    }

    /// Key for the content view
    #[must_use]
    pub fn sender(group_id: impl Into<String>, sdt_in: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            sdt_in: Some(sdt_in.into()),
        }
    }
}

/// Inclusive `[from, to]` query window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start (inclusive)
    pub from: DateTime<Utc>,
    /// Window end (inclusive)
    pub to: DateTime<Utc>,
}

/// Base predicate shared by aggregation, details and export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilter {
    /// Timestamp window
    pub window: TimeWindow,
    /// Case-insensitive substring of the message text
    pub text_keyword: Option<String>,
    /// Case-insensitive substring of the sender phone
    pub phone_num: Option<String>,
}

impl ReportFilter {
    /// Filter on the window alone
    #[must_use]
    pub const fn window(window: TimeWindow) -> Self {
        Self {
            window,
            text_keyword: None,
            phone_num: None,
        }
    }
}

/// Per-group summary computed by the aggregation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateGroup {
    /// Aggregation key
    pub key: GroupKey,
    /// Earliest timestamp in the window
    pub first_ts: DateTime<Utc>,
    /// Row count in the window
    pub frequency: u64,
    /// Text of the earliest row (lowest id on ties)
    pub agg_message: Option<String>,
    /// Rows predicted `spam`
    pub spam_count: u64,
    /// Rows predicted `not_spam`
    pub not_spam_count: u64,
    /// Derived label
    pub label: Label,
}

/// Occurrences of one distinct text inside a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCount {
    /// Message body (null bodies are counted together)
    pub text_sms: Option<String>,
    /// Occurrences within the window
    pub count: u64,
}

/// One row of a paginated report, as rendered to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    /// 1-based ordinal across all pages
    pub stt: u64,
    /// Conversation identifier
    pub group_id: String,
    /// Sender phone, content view only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdt_in: Option<String>,
    /// Row count in the window
    pub frequency: u64,
    /// Earliest timestamp in the window
    pub ts: DateTime<Utc>,
    /// Representative message
    pub agg_message: Option<String>,
    /// Derived label
    pub label: Label,
    /// Distinct texts and their counts
    pub messages: Vec<MessageCount>,
}

impl GroupReport {
    /// Combine an aggregate with its message breakdown
    #[must_use]
    pub fn new(stt: u64, group: AggregateGroup, messages: Vec<MessageCount>) -> Self {
        Self {
            stt,
            group_id: group.key.group_id,
            sdt_in: group.key.sdt_in,
            frequency: group.frequency,
            ts: group.first_ts,
            agg_message: group.agg_message,
            label: group.label,
            messages,
        }
    }
}

/// A slice of an ordered result plus the total number of matching groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Groups matching the filter across all pages
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
}

/// Human-supplied correction for every row sharing a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCorrection {
    /// Rows to update
    pub key: GroupKey,
    /// New feedback value
    pub feedback: bool,
}

/// Feedback item as it arrives in a request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Conversation identifier
    pub group_id: String,
    /// Sender phone, required for the content view
    #[serde(default)]
    pub sdt_in: Option<String>,
    /// New feedback value
    pub feedback: bool,
}
