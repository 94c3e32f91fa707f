use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::MessageRecord;
use crate::query::ts_param;
use crate::schema::{create_table_sql, sms};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    table: String,
}

impl Database {
    /// Open (or create) the SQLite file at `path` and build the pool
    pub fn new(path: &str, config: &DatabaseConfig) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // WAL lets readers keep a snapshot while feedback writes land
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        let database = Self {
            pool,
            table: config.table_name.clone(),
        };

        if config.create_if_missing {
            database.ensure_schema()?;
        }

        info!(path, table = %database.table, "Database pool ready");
        Ok(database)
    }

    /// Name of the message table
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Create the message table and indexes if they don't exist
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(&create_table_sql(&self.table))?;
        debug!(table = %self.table, "Schema ensured");
        Ok(())
    }

    /// Latest stored timestamp, `None` for an empty table
    pub fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.get_connection()?;
        let latest: Option<NaiveDateTime> = conn.query_row(
            &format!("SELECT MAX({}) FROM {}", sms::TS, self.table),
            params![],
            |row| row.get(0),
        )?;
        Ok(latest.map(|ts| ts.and_utc()))
    }

    /// Insert rows in one transaction; existing `(id, ts)` pairs are skipped.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_messages(&self, records: &[MessageRecord]) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                self.table,
                sms::ID,
                sms::TS,
                sms::SDT_IN,
                sms::GROUP_ID,
                sms::SDT_OUT,
                sms::TEXT_SMS,
                sms::PREDICTED_LABEL,
                sms::LLM_LABEL,
                sms::CONFIDENCE,
                sms::FEEDBACK
            ))?;

            for record in records {
                inserted += stmt.execute(params![
                    record.id,
                    ts_param(&record.ts),
                    record.sdt_in,
                    record.group_id,
                    record.sdt_out,
                    record.text_sms,
                    record.predicted_label,
                    record.llm_label,
                    record.confidence,
                    record.feedback
                ])?;
            }
        }

        tx.commit()?;
        info!(requested = records.len(), inserted, "Messages inserted");
        Ok(inserted)
    }

    /// Every row of one conversation, oldest first; optionally one sender only
    pub fn messages_for_group(&self, group_id: &str, sdt_in: Option<&str>) -> Result<Vec<MessageRecord>> {
        let conn = self.get_connection()?;

        let mut query = format!("SELECT * FROM {} WHERE {} = ?", self.table, sms::GROUP_ID);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(group_id.to_string())];

        if let Some(sender) = sdt_in {
            query.push_str(&format!(" AND {} = ?", sms::SDT_IN));
            params.push(Box::new(sender.to_string()));
        }

        query.push_str(&format!(" ORDER BY {}, {}", sms::TS, sms::ID));

        let mut stmt = conn.prepare(&query)?;
        let message_iter = stmt.query_map(params_from_iter(params.iter()), map_message)?;

        let mut results = Vec::new();
        for message in message_iter {
            results.push(message?);
        }

        Ok(results)
    }

    /// Look up one row by its composite key
    pub fn get_message(&self, id: &str, ts: &DateTime<Utc>) -> Result<Option<MessageRecord>> {
        let conn = self.get_connection()?;
        let message = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ? AND {} = ?", self.table, sms::ID, sms::TS),
                params![id, ts_param(ts)],
                map_message,
            )
            .optional()?;
        Ok(message)
    }
}

/// Map a database row to a `MessageRecord`
fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let ts: NaiveDateTime = row.get(sms::TS)?;
    Ok(MessageRecord {
        id: row.get(sms::ID)?,
        ts: ts.and_utc(),
        sdt_in: row.get(sms::SDT_IN)?,
        group_id: row.get(sms::GROUP_ID)?,
        sdt_out: row.get(sms::SDT_OUT)?,
        text_sms: row.get(sms::TEXT_SMS)?,
        predicted_label: row.get(sms::PREDICTED_LABEL)?,
        llm_label: row.get(sms::LLM_LABEL)?,
        confidence: row.get(sms::CONFIDENCE)?,
        feedback: row.get(sms::FEEDBACK)?,
    })
}
