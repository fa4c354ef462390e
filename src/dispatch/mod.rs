//! One pass over the sheet: find pending rows, send receipts, mark them sent.
//!
//! [`Dispatcher::run_iteration`] reads a snapshot, provisions the tracking
//! column if needed, then walks data rows strictly in order. For each pending
//! row with a contact it sends the receipt and, only after the transport
//! accepts it, writes the sent marker back to that row. A failure on one row
//! is logged and the scan moves on.

pub mod runner;

pub use runner::PollLoop;

use crate::config::{ColumnNames, NotifyConfig, SheetConfig};
use crate::error::NotifyError;
use crate::notification::{RowCandidate, SENT_MARKER, evaluate_row};
use crate::observer::SentMessages;
use crate::rate_limit::{RateLimitError, RateLimiter};
use crate::schema::{ColumnIndex, SchemaResolution, resolve};
use crate::sheet::range::{cell_range, column_letters, header_range, last_column, table_range};
use crate::sheet::{RecordSource, Table, ValueInputMode};
use crate::transport::{MessageHandle, Transport};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How an iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Every data row was considered.
    Completed,
    /// The sheet has no rows at all.
    EmptyTable,
    /// The tracking column was added; rows are scanned next iteration.
    SchemaMigrated,
    /// Another iteration was still running.
    Skipped,
}

/// What happened to one data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    NotPending,
    MissingContact,
    /// Over the outbound rate limit; left pending.
    Deferred { retry_after_secs: u64 },
    /// Sent and marked.
    Marked { handle: MessageHandle },
    /// Send failed; the row stays pending.
    SendFailed { error: String },
    /// Sent, but the marker write failed; the row will be sent again.
    MarkFailed { handle: MessageHandle, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowReport {
    /// 1-based sheet row.
    pub row_number: usize,
    pub outcome: RowOutcome,
}

/// Tallies for one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationCounts {
    /// Accepted by the transport.
    pub sent: usize,
    /// Marker written after a send.
    pub marked: usize,
    pub skipped_not_pending: usize,
    pub skipped_missing_contact: usize,
    pub deferred: usize,
    /// Send failures plus marker-write failures.
    pub failed: usize,
}

/// Summary of one [`Dispatcher::run_iteration`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub outcome: IterationOutcome,
    pub counts: IterationCounts,
    pub rows: Vec<RowReport>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl IterationReport {
    fn new(outcome: IterationOutcome, started_at: DateTime<Utc>) -> Self {
        Self {
            outcome,
            counts: IterationCounts::default(),
            rows: Vec::new(),
            started_at,
            elapsed: Duration::ZERO,
        }
    }

    fn push(&mut self, row_number: usize, outcome: RowOutcome) {
        let counts = &mut self.counts;
        match &outcome {
            RowOutcome::NotPending => counts.skipped_not_pending += 1,
            RowOutcome::MissingContact => counts.skipped_missing_contact += 1,
            RowOutcome::Deferred { .. } => counts.deferred += 1,
            RowOutcome::Marked { .. } => {
                counts.sent += 1;
                counts.marked += 1;
            }
            RowOutcome::SendFailed { .. } => counts.failed += 1,
            RowOutcome::MarkFailed { .. } => {
                counts.sent += 1;
                counts.failed += 1;
            }
        }
        self.rows.push(RowReport {
            row_number,
            outcome,
        });
    }
}

/// Runs iterations against an injected source and transport.
pub struct Dispatcher {
    source: Arc<dyn RecordSource>,
    transport: Arc<dyn Transport>,
    sheet: SheetConfig,
    columns: ColumnNames,
    chat_domain: String,
    request_timeout: Duration,
    limiter: Option<Mutex<RateLimiter>>,
    sent: Arc<SentMessages>,
    busy: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        config: &NotifyConfig,
        source: Arc<dyn RecordSource>,
        transport: Arc<dyn Transport>,
        sent: Arc<SentMessages>,
    ) -> Self {
        Self {
            source,
            transport,
            sheet: config.sheet.clone(),
            columns: config.columns.clone(),
            chat_domain: config.transport.chat_domain.trim().to_owned(),
            request_timeout: Duration::from_secs(config.poll.request_timeout_secs.max(1)),
            limiter: RateLimiter::from_limit(config.transport.max_messages_per_minute)
                .map(Mutex::new),
            sent,
            busy: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn sent_messages(&self) -> &Arc<SentMessages> {
        &self.sent
    }

    /// Run one pass over the sheet.
    ///
    /// # Errors
    ///
    /// `Config` when the sheet id is unset or the tracking column would fall
    /// outside `sheet.read_columns`; `SourceUnavailable` or `Timeout`
    /// when the snapshot cannot be read; any error from the header write
    /// during a migration. Per-row failures are reported, not returned.
    pub async fn run_iteration(&self) -> crate::Result<IterationReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        if self.sheet.sheet_id_is_unset() {
            return Err(NotifyError::Config(
                "sheet id is not configured; set sheet.sheet_id".to_owned(),
            ));
        }

        let Ok(_busy) = self.busy.try_lock() else {
            debug!("previous iteration still running; skipping");
            return Ok(IterationReport::new(IterationOutcome::Skipped, started_at));
        };

        let range = table_range(&self.sheet.tab_name, &self.sheet.read_columns);
        let table = self
            .bounded("fetch_table", self.source.fetch_table(&range))
            .await?;

        let mut report = match table.header() {
            None => {
                info!(source = self.source.id(), %range, "sheet is empty; nothing to do");
                IterationReport::new(IterationOutcome::EmptyTable, started_at)
            }
            Some(header) => match resolve(header, &self.columns) {
                SchemaResolution::NeedsTrackingColumn { header } => {
                    self.add_tracking_column(header).await?;
                    IterationReport::new(IterationOutcome::SchemaMigrated, started_at)
                }
                SchemaResolution::Ready(index) => self.scan(&table, &index, started_at).await,
            },
        };

        report.elapsed = clock.elapsed();
        Ok(report)
    }

    async fn add_tracking_column(&self, header: Vec<String>) -> crate::Result<()> {
        // A column outside the read span would never be seen again.
        let column = header.len().saturating_sub(1);
        if let Some(last) = last_column(&self.sheet.read_columns) {
            if column > last {
                return Err(NotifyError::Config(format!(
                    "header is wider than sheet.read_columns ({}); {} would land in column {}, \
                     widen read_columns or add the column by hand",
                    self.sheet.read_columns,
                    self.columns.notification_sent,
                    column_letters(column)
                )));
            }
        }

        let range = header_range(&self.sheet.tab_name);
        self.bounded(
            "write_header",
            self.source
                .write_cells(&range, ValueInputMode::Raw, vec![header]),
        )
        .await?;
        info!(
            column = %self.columns.notification_sent,
            "added tracking column; rows will be scanned next iteration"
        );
        Ok(())
    }

    async fn scan(
        &self,
        table: &Table,
        index: &ColumnIndex,
        started_at: DateTime<Utc>,
    ) -> IterationReport {
        let missing = index.missing_fields();
        if !missing.is_empty() {
            warn!(?missing, "header is missing columns; blank values will be used");
        }

        let mut report = IterationReport::new(IterationOutcome::Completed, started_at);
        for (row_number, row) in table.data_rows() {
            let outcome = match evaluate_row(row_number, row, index) {
                RowCandidate::NotPending => {
                    trace!(row = row_number, "already notified");
                    RowOutcome::NotPending
                }
                RowCandidate::MissingContact => {
                    info!(row = row_number, "no contact number; skipping row");
                    RowOutcome::MissingContact
                }
                RowCandidate::Ready(record) => {
                    let destination = record.destination(&self.chat_domain);
                    if let Err(RateLimitError::Exceeded { retry_after_secs }) = self.admit() {
                        debug!(
                            row = row_number,
                            retry_after_secs, "outbound rate limit reached; deferring row"
                        );
                        RowOutcome::Deferred { retry_after_secs }
                    } else {
                        self.notify(
                            row_number,
                            &destination,
                            &record.message(),
                            index.notification_sent,
                        )
                        .await
                    }
                }
            };
            report.push(row_number, outcome);
        }

        let c = report.counts;
        info!(
            sent = c.sent,
            marked = c.marked,
            skipped = c.skipped_not_pending,
            no_contact = c.skipped_missing_contact,
            deferred = c.deferred,
            failed = c.failed,
            "iteration complete"
        );
        report
    }

    /// Send then mark. The marker is only written after the transport accepts.
    async fn notify(
        &self,
        row_number: usize,
        destination: &str,
        text: &str,
        tracking_column: usize,
    ) -> RowOutcome {
        let handle = match self
            .bounded("send", self.transport.send(destination, text))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(row = row_number, %destination, error = %e, "failed to send receipt");
                return RowOutcome::SendFailed {
                    error: e.to_string(),
                };
            }
        };
        info!(row = row_number, %destination, %handle, "receipt sent");
        self.sent.record(handle.clone(), row_number, destination);

        let range = cell_range(&self.sheet.tab_name, row_number, tracking_column);
        let mark = self.source.write_cells(
            &range,
            ValueInputMode::Raw,
            vec![vec![SENT_MARKER.to_owned()]],
        );
        match self.bounded("write_marker", mark).await {
            Ok(()) => {
                debug!(row = row_number, %range, "row marked as notified");
                RowOutcome::Marked { handle }
            }
            Err(e) => {
                warn!(
                    row = row_number,
                    %destination,
                    error = %e,
                    "receipt sent but row could not be marked; it will be sent again"
                );
                RowOutcome::MarkFailed {
                    handle,
                    error: e.to_string(),
                }
            }
        }
    }

    fn admit(&self) -> Result<(), RateLimitError> {
        match &self.limiter {
            Some(limiter) => match limiter.lock() {
                Ok(mut limiter) => {
                    limiter.try_acquire()?;
                    trace!(remaining = limiter.remaining(), "outbound slot taken");
                    Ok(())
                }
                Err(_) => Ok(()),
            },
            None => Ok(()),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = crate::Result<T>>,
    ) -> crate::Result<T> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout {
                operation,
                secs: self.request_timeout.as_secs(),
            }),
        }
    }
}
