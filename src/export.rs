//! Export Streamer: CSV rendering of every included group.
//!
//! Two shapes share one encoder. The buffered path renders a slice of
//! groups into a writer. The streamed path runs the aggregate cursor on a
//! blocking thread inside a read transaction and hands CSV chunks to the
//! async side through a bounded channel, so a slow client applies
//! backpressure to the cursor. Dropping the [`ExportStream`] stops the
//! cursor at its next row.

use std::io::Write;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use chrono::SecondsFormat;
use csv::{QuoteStyle, WriterBuilder};
use futures::stream::{self, Stream};
use rusqlite::{Connection, TransactionBehavior};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::aggregation::AggregationEngine;
use crate::error::{ReportError, Result};
use crate::models::{AggregateGroup, ReportFilter, ReportView};

/// Line emitted instead of data rows when `empty_sentinel` is enabled
pub const EMPTY_SENTINEL: &str = "No data found";

const CONTENT_HEADER: [&str; 6] = ["group_id", "sdt_in", "frequency", "ts", "agg_message", "label"];
const FREQUENCY_HEADER: [&str; 5] = ["group_id", "frequency", "ts", "agg_message", "label"];

/// CSV encoder for one report view; every field is quoted.
#[derive(Debug, Clone, Copy)]
pub struct CsvExporter {
    view: ReportView,
    empty_sentinel: bool,
}

impl CsvExporter {
    #[must_use]
    pub const fn new(view: ReportView, empty_sentinel: bool) -> Self {
        Self { view, empty_sentinel }
    }

    #[must_use]
    pub const fn view(&self) -> ReportView {
        self.view
    }

    /// Column names for this view
    #[must_use]
    pub const fn header(&self) -> &'static [&'static str] {
        match self.view {
            ReportView::Content => &CONTENT_HEADER,
            ReportView::Frequency => &FREQUENCY_HEADER,
        }
    }

    /// Suggested download name, e.g. `content_export.csv`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_export.csv", self.view)
    }

    pub fn encode_header(&self) -> Result<Vec<u8>> {
        encode_record(self.header())
    }

    pub fn encode_row(&self, group: &AggregateGroup) -> Result<Vec<u8>> {
        encode_record(self.fields(group))
    }

    /// Bytes to emit after the header when nothing matched
    pub fn encode_empty(&self) -> Result<Option<Vec<u8>>> {
        if self.empty_sentinel {
            encode_record([EMPTY_SENTINEL]).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Buffered export: header, one row per group, sentinel if configured.
    ///
    /// Returns the number of data rows written.
    pub fn write_all<W: Write>(&self, groups: &[AggregateGroup], out: W) -> Result<u64> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(out);

        writer.write_record(self.header())?;
        for group in groups {
            writer.write_record(self.fields(group))?;
        }
        if groups.is_empty() && self.empty_sentinel {
            writer.write_record([EMPTY_SENTINEL])?;
        }

        writer.flush()?;
        Ok(groups.len() as u64)
    }

    fn fields(&self, group: &AggregateGroup) -> Vec<String> {
        let mut fields = Vec::with_capacity(6);
        fields.push(group.key.group_id.clone());
        if self.view == ReportView::Content {
            fields.push(group.key.sdt_in.clone().unwrap_or_default());
        }
        fields.push(group.frequency.to_string());
        fields.push(group.first_ts.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        fields.push(group.agg_message.clone().unwrap_or_default());
        fields.push(group.label.to_string());
        fields
    }
}

fn encode_record<I, T>(record: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(record)?;
    writer.into_inner().map_err(|e| ReportError::Io(e.into_error()))
}

/// Create a connected producer / consumer pair.
///
/// Must be called from within a Tokio runtime; the sink blocks on that
/// runtime's handle when the channel is full.
pub fn export_channel(capacity: usize, timeout: Duration) -> Result<(ExportSink, ExportStream)> {
    let handle = Handle::try_current().map_err(|e| ReportError::Task(e.to_string()))?;
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let sink = ExportSink {
        tx,
        outcome: outcome_tx,
        handle,
        deadline: Instant::now() + timeout,
        timeout,
    };
    let stream = ExportStream { rx, outcome: outcome_rx };
    Ok((sink, stream))
}

/// Producer half, used from a blocking thread.
#[derive(Debug)]
pub struct ExportSink {
    tx: mpsc::Sender<Vec<u8>>,
    outcome: oneshot::Sender<Result<u64>>,
    handle: Handle,
    deadline: Instant,
    timeout: Duration,
}

impl ExportSink {
    /// Deliver one chunk. `Ok(false)` means the consumer went away.
    pub fn send(&self, chunk: Vec<u8>) -> Result<bool> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ReportError::ExportTimeout(self.timeout.as_secs()));
        }

        match self
            .handle
            .block_on(tokio::time::timeout(remaining, self.tx.send(chunk)))
        {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) => Ok(false),
            Err(_) => Err(ReportError::ExportTimeout(self.timeout.as_secs())),
        }
    }

    /// Close the data channel and report how the export ended.
    pub fn finish(self, outcome: Result<u64>) {
        let Self { tx, outcome: outcome_tx, .. } = self;
        drop(tx);
        // The consumer may already be gone
        let _ = outcome_tx.send(outcome);
    }
}

/// Consumer half: CSV chunks in report order.
#[derive(Debug)]
pub struct ExportStream {
    rx: mpsc::Receiver<Vec<u8>>,
    outcome: oneshot::Receiver<Result<u64>>,
}

impl ExportStream {
    /// Chunks followed by at most one trailing error.
    ///
    /// A failure after the header has gone out can only be signalled by
    /// ending the stream with an error; HTTP clients see a truncated body.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
        stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            if let Some(chunk) = this.rx.recv().await {
                return Some((Ok(chunk), Some(this)));
            }
            match this.outcome.await {
                Ok(Ok(_)) => None,
                Ok(Err(err)) => Some((Err(err), None)),
                Err(_) => Some((Err(ReportError::Task("export producer stopped unexpectedly".to_string())), None)),
            }
        })
    }

    /// Drain the stream into one buffer
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            body.extend_from_slice(&chunk);
        }
        match self.outcome.await {
            Ok(outcome) => outcome.map(|_| body),
            Err(_) => Err(ReportError::Task("export producer stopped unexpectedly".to_string())),
        }
    }
}

/// Producer body: run the aggregate cursor and push CSV through `sink`.
///
/// Holds one deferred read transaction for the whole cursor so the export
/// reflects a single snapshot. Returns rows delivered.
pub fn stream_groups(
    conn: &mut Connection,
    engine: &AggregationEngine,
    exporter: CsvExporter,
    filter: &ReportFilter,
    sink: ExportSink,
) -> u64 {
    let outcome = produce(conn, engine, exporter, filter, &sink);
    let rows = *outcome.as_ref().unwrap_or(&0);
    if let Err(err) = &outcome {
        warn!(view = %exporter.view(), error = %err, "Export stream aborted");
    }
    sink.finish(outcome);
    rows
}

fn produce(
    conn: &mut Connection,
    engine: &AggregationEngine,
    exporter: CsvExporter,
    filter: &ReportFilter,
    sink: &ExportSink,
) -> Result<u64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

    if !sink.send(exporter.encode_header()?)? {
        debug!("Export consumer dropped before header");
        return Ok(0);
    }

    let mut delivered = 0;
    let mut disconnected = false;
    engine.for_each_group(&tx, exporter.view(), filter, |group| {
        if sink.send(exporter.encode_row(&group)?)? {
            delivered += 1;
            Ok(ControlFlow::Continue(()))
        } else {
            disconnected = true;
            Ok(ControlFlow::Break(()))
        }
    })?;

    if disconnected {
        debug!(rows = delivered, "Export consumer disconnected, stopping cursor");
        return Ok(delivered);
    }

    if delivered == 0 {
        if let Some(sentinel) = exporter.encode_empty()? {
            sink.send(sentinel)?;
        }
    }

    // Read-only; dropping the transaction rolls back
    drop(tx);
    Ok(delivered)
}
