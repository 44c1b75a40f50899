//! Batch insert executor
//!
//! Turns one batch of records into one INSERT statement, sends it through a
//! [`Transport`] and reports what the server said. The executor keeps no
//! state between calls: every collaborator it holds is immutable, so one
//! executor may serve concurrent callers.
//!
//! # Flow
//!
//! ```text
//! batch ──► InsertStatement::build ──► Transport::execute ──► InsertOutcome
//!              (format timer)             (send timer)
//! ```
//!
//! Failures are returned as-is. There is no retry, no splitting of the batch
//! and no timeout on the send: a hung server blocks the caller.

use crate::error::InsertError;
use crate::events::{EventSink, InsertEvent, TracingEventSink};
use crate::gate::Endpoint;
use crate::record::Record;
use crate::statement::{InsertStatement, LiteralRenderer, LiteralRendering};
use crate::transport::{ExecutionSummary, Transport, TransportError};
use std::sync::Arc;
use std::time::Instant;

/// Result of a successful insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Records in the batch
    pub batch_size: usize,
    /// Rows the server reports as written
    pub rows_reported: u64,
    /// Time spent building the statement
    pub elapsed_format_ms: u64,
    /// Time spent on the round trip
    pub elapsed_send_ms: u64,
    /// Raw server counters
    pub summary: ExecutionSummary,
}

impl InsertOutcome {
    /// Outcome of an empty batch: nothing built, nothing sent.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Builds and submits one INSERT per batch.
pub struct BatchInsertExecutor {
    transport: Arc<dyn Transport>,
    renderer: &'static dyn LiteralRenderer,
    events: Arc<dyn EventSink>,
}

impl BatchInsertExecutor {
    /// Executor with the escaping renderer and tracing events.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            renderer: LiteralRendering::default().renderer(),
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_rendering(mut self, rendering: LiteralRendering) -> Self {
        self.renderer = rendering.renderer();
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Insert `batch` into `table` as a single statement.
    ///
    /// An empty batch returns [`InsertOutcome::empty`] without touching the
    /// network.
    pub async fn insert(
        &self,
        endpoint: &Endpoint,
        table: &str,
        batch: &[Record],
    ) -> Result<InsertOutcome, InsertError> {
        if batch.is_empty() {
            return Ok(InsertOutcome::empty());
        }

        let batch_size = batch.len();
        self.events.emit(&InsertEvent::BatchStarted { table, batch_size });

        let t0 = Instant::now();
        let statement = match InsertStatement::build(table, batch, self.renderer) {
            Ok(Some(statement)) => statement,
            Ok(None) => return Ok(InsertOutcome::empty()),
            Err(e) => return Err(self.fail(table, batch_size, e)),
        };
        let elapsed_format_ms = t0.elapsed().as_millis() as u64;

        self.events.emit(&InsertEvent::StatementBuilt {
            table,
            columns: statement.columns(),
            rows: statement.rows(),
            bytes: statement.as_str().len(),
            elapsed_format_ms,
        });

        let t1 = Instant::now();
        let summary = match self.transport.execute(endpoint, statement.as_str()).await {
            Ok(summary) => summary,
            Err(e) => {
                let err = match e {
                    TransportError::Connectivity(message) => InsertError::Connectivity {
                        statement: statement.into_string(),
                        message,
                    },
                    TransportError::Server { code, message, .. } => InsertError::Execution {
                        statement: statement.into_string(),
                        code,
                        message,
                    },
                };
                return Err(self.fail(table, batch_size, err));
            }
        };
        let elapsed_send_ms = t1.elapsed().as_millis() as u64;

        let outcome = InsertOutcome {
            batch_size,
            rows_reported: summary.written_rows,
            elapsed_format_ms,
            elapsed_send_ms,
            summary,
        };
        self.events.emit(&InsertEvent::BatchInserted {
            table,
            outcome: &outcome,
        });
        Ok(outcome)
    }

    fn fail(&self, table: &str, batch_size: usize, error: InsertError) -> InsertError {
        self.events.emit(&InsertEvent::BatchFailed {
            table,
            batch_size,
            error: &error,
        });
        error
    }
}
