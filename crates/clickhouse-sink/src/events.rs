//! Structured insert events
//!
//! The executor does not log on its own. It emits [`InsertEvent`]s into an
//! [`EventSink`] handed to it by the caller; [`TracingEventSink`] turns them
//! into `tracing` records and `metrics` updates.
//!
//! # Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `clickhouse.batches.success` | Counter | Batches inserted |
//! | `clickhouse.batches.failed` | Counter | Batches that failed |
//! | `clickhouse.records.written` | Counter | Records in inserted batches |
//! | `clickhouse.records.failed` | Counter | Records in failed batches |
//! | `clickhouse.batch.size` | Gauge | Size of the last batch |
//! | `clickhouse.batch.format_ms` | Histogram | Statement build time |
//! | `clickhouse.batch.send_ms` | Histogram | Round trip time |

use crate::error::InsertError;
use crate::executor::InsertOutcome;
use metrics::{counter, gauge, histogram};
use tracing::{debug, error, info};

/// One step of a batch insert.
#[derive(Debug)]
pub enum InsertEvent<'a> {
    /// A non-empty batch was handed to the executor.
    BatchStarted { table: &'a str, batch_size: usize },

    /// The statement text is ready to send.
    StatementBuilt {
        table: &'a str,
        columns: &'a [String],
        rows: usize,
        bytes: usize,
        elapsed_format_ms: u64,
    },

    /// The server accepted the statement.
    BatchInserted {
        table: &'a str,
        outcome: &'a InsertOutcome,
    },

    /// The batch failed as a whole.
    BatchFailed {
        table: &'a str,
        batch_size: usize,
        error: &'a InsertError,
    },
}

/// Receiver for [`InsertEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &InsertEvent<'_>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &InsertEvent<'_>) {}
}

/// Forwards events to `tracing` and the `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &InsertEvent<'_>) {
        match event {
            InsertEvent::BatchStarted { table, batch_size } => {
                gauge!("clickhouse.batch.size").set(*batch_size as f64);
                info!(table, batch_size, "Inserting batch into ClickHouse");
            }
            InsertEvent::StatementBuilt {
                table,
                columns,
                rows,
                bytes,
                elapsed_format_ms,
            } => {
                histogram!("clickhouse.batch.format_ms").record(*elapsed_format_ms as f64);
                debug!(
                    table,
                    columns = %columns.join(","),
                    rows,
                    bytes,
                    elapsed_format_ms,
                    "INSERT statement built"
                );
            }
            InsertEvent::BatchInserted { table, outcome } => {
                histogram!("clickhouse.batch.send_ms").record(outcome.elapsed_send_ms as f64);
                counter!("clickhouse.batches.success").increment(1);
                counter!("clickhouse.records.written").increment(outcome.batch_size as u64);
                info!(
                    table,
                    batch_size = outcome.batch_size,
                    rows_reported = outcome.rows_reported,
                    format_ms = outcome.elapsed_format_ms,
                    send_ms = outcome.elapsed_send_ms,
                    "Batch inserted"
                );
            }
            InsertEvent::BatchFailed {
                table,
                batch_size,
                error: err,
            } => {
                counter!("clickhouse.batches.failed").increment(1);
                counter!("clickhouse.records.failed").increment(*batch_size as u64);
                match err.statement() {
                    Some(statement) => error!(
                        table,
                        batch_size,
                        statement,
                        "Failed to insert batch into ClickHouse: {}", err
                    ),
                    None => error!(
                        table,
                        batch_size, "Failed to insert batch into ClickHouse: {}", err
                    ),
                }
            }
        }
    }
}
