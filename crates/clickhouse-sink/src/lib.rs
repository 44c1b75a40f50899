//! clickhouse-sink - Batched ClickHouse writer for a streaming connector host
//!
//! Records delivered by the host are grouped into batches and each batch is
//! written with a single `INSERT INTO <table> (<columns>) VALUES ...`
//! statement over the ClickHouse HTTP interface. Before a writer goes live, a
//! short `/ping` probe checks that the server answers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Connector surface                                              │
//! │  ClickHouseSink (Sink: spec/check/write)  ClickHouseWriter      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Core                                                           │
//! │  ConnectionGate ── Endpoint          BatchInsertExecutor        │
//! │                                      ├── InsertStatement        │
//! │                                      ├── LiteralRenderer        │
//! │                                      └── EventSink              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Transport (HttpTransport over reqwest, MockTransport in tests) │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use clickhouse_sink::prelude::*;
//!
//! let mut writer = ClickHouseWriter::new(
//!     Arc::new(HttpTransport::new()?),
//!     Arc::new(TracingEventSink),
//! );
//! if !writer.start(&props).await? {
//!     return Err(ConnectorError::connection("ClickHouse unreachable"));
//! }
//! let outcome = writer.insert(&batch).await?;
//! info!(rows = outcome.rows_reported, "batch written");
//! ```
//!
//! # Value rendering
//!
//! Values are embedded as quoted literals, not bound as parameters. The
//! default [`EscapingLiteralRenderer`] backslash-escapes `'` and `\`;
//! [`UnsafeLiteralRenderer`] only wraps values in quotes and must only be
//! used with trusted data.

// Connector framework contract
pub mod traits;

// Common types (SensitiveString, Credentials)
pub mod types;

// Error types
pub mod error;

pub mod config;
pub mod events;
pub mod executor;
pub mod gate;
pub mod record;
pub mod sink;
pub mod statement;
pub mod transport;
pub mod writer;

// Testing utilities
pub mod testing;

pub use config::ClickHouseSinkConfig;
pub use error::{ConnectorError, InsertError, Result};
pub use events::{EventSink, InsertEvent, NoopEventSink, TracingEventSink};
pub use executor::{BatchInsertExecutor, InsertOutcome};
pub use gate::{ConnectionGate, Endpoint, Scheme, DEFAULT_PING_TIMEOUT};
pub use record::{Field, FieldType, Record};
pub use sink::ClickHouseSink;
pub use statement::{
    EscapingLiteralRenderer, InsertStatement, LiteralRenderer, LiteralRendering,
    UnsafeLiteralRenderer,
};
pub use traits::{
    CheckDetail, CheckResult, CheckResultBuilder, ConnectorSpec, Sink, SinkConfig, WriteResult,
};
pub use transport::{ExecutionSummary, HttpTransport, Transport, TransportError};
pub use types::{Credentials, SensitiveString};
pub use writer::ClickHouseWriter;

// Re-export commonly used dependencies for host integrations
pub use async_trait::async_trait;
pub use futures::stream::BoxStream;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        async_trait, BatchInsertExecutor, BoxStream, CheckResult, ClickHouseSink,
        ClickHouseSinkConfig, ClickHouseWriter, ConnectionGate, ConnectorError, Endpoint,
        EventSink, Field, FieldType, HttpTransport, InsertError, InsertOutcome, LiteralRendering,
        Record, Result, Scheme, Sink, TracingEventSink, Transport, WriteResult,
    };
    pub use std::sync::Arc;
    pub use tracing::{debug, error, info, warn};
}
