//! Testing utilities
//!
//! In-memory stand-ins for the server and the event sink, so the executor,
//! the writer and the sink can be exercised without a ClickHouse instance.
//!
//! ```rust,ignore
//! use clickhouse_sink::testing::MockTransport;
//!
//! let transport = Arc::new(MockTransport::new());
//! let executor = BatchInsertExecutor::new(transport.clone());
//! executor.insert(&endpoint, "t", &batch).await?;
//! assert_eq!(transport.statements().len(), 1);
//! ```

use crate::events::{EventSink, InsertEvent};
use crate::gate::Endpoint;
use crate::transport::{ExecutionSummary, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A transport that records statements instead of sending them.
///
/// By default every ping succeeds and every statement is accepted with
/// `written_rows` equal to its number of value tuples.
#[derive(Debug, Default)]
pub struct MockTransport {
    statements: Mutex<Vec<String>>,
    pings: AtomicUsize,
    unreachable: bool,
    written_rows: Option<u64>,
    server_error: Option<(u32, String)>,
    fail_from_call: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ping and statement fails with a connectivity error.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Report a fixed `written_rows` for every accepted statement.
    pub fn with_written_rows(mut self, rows: u64) -> Self {
        self.written_rows = Some(rows);
        self
    }

    /// Reject statements with a server exception.
    pub fn fail_with_server(mut self, code: u32, message: impl Into<String>) -> Self {
        self.server_error = Some((code, message.into()));
        self
    }

    /// Only start rejecting from the `n`-th statement (0-based).
    pub fn fail_from_call(mut self, n: usize) -> Self {
        self.fail_from_call = n;
        self
    }

    /// Statements received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Number of probes received.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn ping(
        &self,
        _endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(TransportError::Connectivity(format!(
                "ping timed out after {}ms",
                timeout.as_millis()
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        _endpoint: &Endpoint,
        statement: &str,
    ) -> Result<ExecutionSummary, TransportError> {
        if self.unreachable {
            return Err(TransportError::Connectivity("connection refused".to_string()));
        }

        let call = {
            let mut statements = self.statements.lock();
            statements.push(statement.to_string());
            statements.len() - 1
        };

        if let Some((code, message)) = &self.server_error {
            if call >= self.fail_from_call {
                return Err(TransportError::Server {
                    status: 500,
                    code: Some(*code),
                    message: message.clone(),
                });
            }
        }

        let rows = self.written_rows.unwrap_or_else(|| count_tuples(statement));
        Ok(ExecutionSummary {
            read_rows: rows,
            written_rows: rows,
            result_rows: rows,
            ..Default::default()
        })
    }
}

/// Number of value tuples after `VALUES`, skipping over quoted literals.
///
/// Assumes backslash-escaped literals; statements from the unsafe renderer
/// with a stray `'` may be miscounted.
fn count_tuples(statement: &str) -> u64 {
    let Some((_, values)) = statement.split_once(" VALUES ") else {
        return 0;
    };

    let mut tuples = 0;
    let mut depth = 0u32;
    let mut in_quote = false;
    let mut escaped = false;
    for c in values.chars() {
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' => in_quote = true,
            '(' => {
                if depth == 0 {
                    tuples += 1;
                }
                depth += 1;
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    tuples
}

/// An event sink that remembers which events it saw.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    names: Mutex<Vec<&'static str>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snake-case names of the received events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.names.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &InsertEvent<'_>) {
        let name = match event {
            InsertEvent::BatchStarted { .. } => "batch_started",
            InsertEvent::StatementBuilt { .. } => "statement_built",
            InsertEvent::BatchInserted { .. } => "batch_inserted",
            InsertEvent::BatchFailed { .. } => "batch_failed",
        };
        self.names.lock().push(name);
    }
}
