//! Sink connector trait

use super::check::CheckResult;
use super::spec::ConnectorSpec;
use crate::error::Result;
use crate::record::Record;
use async_trait::async_trait;
use futures::stream::BoxStream;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use validator::Validate;

/// Trait for sink connector configuration
pub trait SinkConfig: DeserializeOwned + Validate + JsonSchema + Send + Sync {}

impl<T> SinkConfig for T where T: DeserializeOwned + Validate + JsonSchema + Send + Sync {}

/// Totals of one `Sink::write` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Records in successfully inserted batches
    pub records_written: u64,
    /// Rows the server reported as written
    pub rows_reported: u64,
    /// Statement bytes sent
    pub bytes_written: u64,
    /// Batches inserted
    pub batches: u64,
}

impl WriteResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one inserted batch.
    pub fn add_batch(&mut self, records: u64, rows_reported: u64, bytes: u64) {
        self.records_written += records;
        self.rows_reported += rows_reported;
        self.bytes_written += bytes;
        self.batches += 1;
    }
}

/// Trait for sink connectors
///
/// A sink consumes the records delivered by the host and writes them to an
/// external system.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Configuration type for this sink
    type Config: SinkConfig;

    /// Return the connector specification
    fn spec() -> ConnectorSpec;

    /// Check connectivity and configuration
    async fn check(&self, config: &Self::Config) -> Result<CheckResult>;

    /// Write records until the stream ends or a write fails
    async fn write(
        &self,
        config: &Self::Config,
        records: BoxStream<'static, Record>,
    ) -> Result<WriteResult>;
}
