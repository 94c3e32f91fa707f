//! Database schema definitions
//!
//! Column names for the SMS message table used with rusqlite. The table name
//! itself is deployment configuration (`database.table_name`) and is passed to
//! every query builder instead of living here.

/// SMS message table schema
pub mod sms {
    /// Message identifier, first half of the primary key
    pub const ID: &str = "id";
    /// Event timestamp, second half of the primary key (UTC text)
    pub const TS: &str = "ts";
    /// Sender phone number
    pub const SDT_IN: &str = "sdt_in";
    /// Conversation / group identifier
    pub const GROUP_ID: &str = "group_id";
    /// Recipient phone number
    pub const SDT_OUT: &str = "sdt_out";
    /// Message body
    pub const TEXT_SMS: &str = "text_sms";
    /// Upstream classifier label (`spam` | `not_spam`)
    pub const PREDICTED_LABEL: &str = "predicted_label";
    /// External override label
    pub const LLM_LABEL: &str = "llm_label";
    /// Classifier confidence, string encoded
    pub const CONFIDENCE: &str = "confidence";
    /// Human correction flag
    pub const FEEDBACK: &str = "feedback";
}

/// DDL for the message table and its lookup indexes.
///
/// Only used when `database.create_if_missing` is set; the service never
/// alters an existing table.
#[must_use]
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            {id} TEXT NOT NULL,
            {ts} TEXT NOT NULL,
            {sdt_in} TEXT NOT NULL,
            {group_id} TEXT NOT NULL,
            {sdt_out} TEXT,
            {text_sms} TEXT,
            {predicted_label} TEXT,
            {llm_label} TEXT,
            {confidence} TEXT,
            {feedback} INTEGER,
            PRIMARY KEY ({id}, {ts})
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_ts ON {table} ({ts});
        CREATE INDEX IF NOT EXISTS idx_{table}_group ON {table} ({group_id}, {sdt_in});",
        id = sms::ID,
        ts = sms::TS,
        sdt_in = sms::SDT_IN,
        group_id = sms::GROUP_ID,
        sdt_out = sms::SDT_OUT,
        text_sms = sms::TEXT_SMS,
        predicted_label = sms::PREDICTED_LABEL,
        llm_label = sms::LLM_LABEL,
        confidence = sms::CONFIDENCE,
        feedback = sms::FEEDBACK,
    )
}
