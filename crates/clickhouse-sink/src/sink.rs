//! ClickHouse sink connector
//!
//! Streaming counterpart of [`ClickHouseWriter`]: consumes a record stream,
//! groups it into batches and inserts each batch as one statement.
//!
//! A pending batch is flushed when it reaches `batch_size`, when
//! `flush_interval_secs` elapses without the batch filling up, when a record
//! arrives whose field list differs from the batch's, and when the stream
//! ends. The first failed insert ends the write.
//!
//! # Example
//!
//! ```yaml
//! sinks:
//!   quotes:
//!     connector: clickhouse
//!     config:
//!       hostname: clickhouse.internal
//!       port: 8443
//!       database: markets
//!       table: stock_v1
//!       username: ingest
//!       password: ${CLICKHOUSE_PASSWORD}
//!       batch_size: 10000
//!       flush_interval_secs: 5
//! ```
//!
//! The `config:` block loads with [`ClickHouseSinkConfig::from_yaml`].

use crate::config::ClickHouseSinkConfig;
use crate::error::{ConnectorError, Result};
use crate::events::{EventSink, TracingEventSink};
use crate::gate::ConnectionGate;
use crate::record::Record;
use crate::traits::{CheckDetail, CheckResult, ConnectorSpec, Sink, WriteResult};
use crate::transport::{HttpTransport, Transport};
use crate::writer::ClickHouseWriter;
use async_trait::async_trait;
use clickhouse::Client;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What woke the write loop up.
enum Next {
    Record(Option<Record>),
    Tick,
}

/// ClickHouse sink implementation
pub struct ClickHouseSink {
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
}

impl ClickHouseSink {
    /// Sink over the HTTP interface with tracing events.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(
            Arc::new(HttpTransport::new()?),
            Arc::new(TracingEventSink),
        ))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, events: Arc<dyn EventSink>) -> Self {
        Self { transport, events }
    }

    /// Metadata client for `check`.
    fn metadata_client(config: &ClickHouseSinkConfig) -> Result<Client> {
        let endpoint = config.endpoint()?;
        let mut client = Client::default()
            .with_url(endpoint.server_url().as_str())
            .with_database(&config.database)
            .with_compression(clickhouse::Compression::None);
        if let Some(creds) = endpoint.credentials() {
            client = client
                .with_user(&creds.username)
                .with_password(creds.password.expose_secret());
        }
        Ok(client)
    }

    async fn flush(
        writer: &ClickHouseWriter,
        batch: &mut Vec<Record>,
        result: &mut WriteResult,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        match writer.insert(batch).await {
            Ok(outcome) => {
                result.add_batch(
                    outcome.batch_size as u64,
                    outcome.rows_reported,
                    outcome.summary.written_bytes,
                );
                batch.clear();
                Ok(())
            }
            Err(e) => {
                error!(
                    batch_size = batch.len(),
                    records_written = result.records_written,
                    error = %e,
                    "Failed to insert batch to ClickHouse"
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    type Config = ClickHouseSinkConfig;

    fn spec() -> ConnectorSpec {
        ConnectorSpec::new("clickhouse", env!("CARGO_PKG_VERSION"))
            .description("ClickHouse sink: batched INSERT ... VALUES statements over HTTP")
            .documentation_url("https://clickhouse.com/docs/en/interfaces/http")
            .config_schema_from::<ClickHouseSinkConfig>()
            .metadata("protocol", "http")
            .metadata("encoding", "sql-values")
            .metadata("auth", "password")
            .metadata("metrics", "true")
    }

    async fn check(&self, config: &Self::Config) -> Result<CheckResult> {
        let mut builder = CheckResult::builder();

        let t0 = Instant::now();
        match config.validate_all() {
            Ok(()) => builder = builder.check(CheckDetail::passed("config").timed(t0)),
            Err(e) => {
                builder = builder.check(CheckDetail::failed("config", e.to_string()).timed(t0));
                return Ok(builder.build());
            }
        }

        let endpoint = match config.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                builder = builder.check(CheckDetail::failed("endpoint", e.to_string()));
                return Ok(builder.build());
            }
        };
        if endpoint.partial_credentials() {
            warn!(endpoint = %endpoint, "Only one of username/password is set; checking anonymously");
        }

        info!(
            endpoint = %endpoint,
            table = %config.table,
            "Checking ClickHouse connectivity"
        );

        let t1 = Instant::now();
        if ConnectionGate::verify_with(self.transport.as_ref(), &endpoint, config.ping_timeout()).await {
            builder = builder.check(CheckDetail::passed("connectivity").timed(t1));
        } else {
            let msg = format!(
                "ClickHouse at {} did not answer within {}ms",
                endpoint, config.ping_timeout_ms
            );
            warn!("{}", msg);
            builder = builder.check(CheckDetail::failed("connectivity", msg).timed(t1));
            return Ok(builder.build());
        }

        let client = Self::metadata_client(config)?;
        let t2 = Instant::now();
        match client
            .query("SELECT count() FROM system.tables WHERE database = ? AND name = ?")
            .bind(&config.database)
            .bind(&config.table)
            .fetch_one::<u64>()
            .await
        {
            Ok(count) if count > 0 => {
                info!(database = %config.database, table = %config.table, "ClickHouse table verified");
                builder = builder.check(CheckDetail::passed("table_exists").timed(t2));
            }
            Ok(_) => {
                let msg = format!(
                    "Table '{}.{}' not found in ClickHouse",
                    config.database, config.table
                );
                warn!("{}", msg);
                builder = builder.check(CheckDetail::failed("table_exists", msg).timed(t2));
            }
            Err(e) => {
                let msg = format!("Failed to query ClickHouse metadata: {}", e);
                warn!("{}", msg);
                builder = builder.check(CheckDetail::failed("table_exists", msg).timed(t2));
            }
        }

        Ok(builder.build())
    }

    async fn write(
        &self,
        config: &Self::Config,
        mut records: BoxStream<'static, Record>,
    ) -> Result<WriteResult> {
        let mut writer = ClickHouseWriter::new(self.transport.clone(), self.events.clone());
        if !writer.start_with_config(config).await? {
            return Err(ConnectorError::connection(format!(
                "ClickHouse at {}:{} is not reachable",
                config.hostname, config.port
            )));
        }

        let mut batch: Vec<Record> = Vec::with_capacity(config.batch_size);
        let mut result = WriteResult::new();

        let mut flush_ticker = tokio::time::interval(config.flush_interval());
        flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        flush_ticker.tick().await;

        info!(
            table = %config.table,
            batch_size = config.batch_size,
            flush_interval_secs = config.flush_interval_secs,
            "Starting ClickHouse sink"
        );

        loop {
            let next = tokio::select! {
                biased;
                record = records.next() => Next::Record(record),
                _ = flush_ticker.tick() => Next::Tick,
            };

            match next {
                Next::Record(Some(record)) => {
                    if batch.first().is_some_and(|head| !head.same_fields(&record)) {
                        debug!(
                            pending = batch.len(),
                            "Record fields changed, flushing pending batch"
                        );
                        Self::flush(&writer, &mut batch, &mut result).await?;
                    }
                    batch.push(record);
                    if batch.len() >= config.batch_size {
                        Self::flush(&writer, &mut batch, &mut result).await?;
                    }
                }
                Next::Record(None) => {
                    Self::flush(&writer, &mut batch, &mut result).await?;
                    break;
                }
                Next::Tick => {
                    if !batch.is_empty() {
                        debug!(
                            records = batch.len(),
                            table = %config.table,
                            "Timer-triggered flush of partial batch"
                        );
                        Self::flush(&writer, &mut batch, &mut result).await?;
                    }
                }
            }
        }

        writer.stop();
        info!(
            records_written = result.records_written,
            rows_reported = result.rows_reported,
            batches = result.batches,
            "ClickHouse sink completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, RecordingEventSink};
    use serde_json::json;

    fn config() -> ClickHouseSinkConfig {
        ClickHouseSinkConfig {
            hostname: "localhost".to_string(),
            port: 8123,
            table: "stock_v1".to_string(),
            scheme: crate::gate::Scheme::Http,
            batch_size: 2,
            ..Default::default()
        }
    }

    fn sink(transport: &Arc<MockTransport>) -> ClickHouseSink {
        ClickHouseSink::with_transport(transport.clone(), Arc::new(RecordingEventSink::new()))
    }

    #[test]
    fn test_spec() {
        let spec = ClickHouseSink::spec();
        assert_eq!(spec.connector_type, "clickhouse");
        assert_eq!(spec.metadata.get("protocol").map(String::as_str), Some("http"));
        assert_eq!(
            spec.documentation_url.as_deref(),
            Some("https://clickhouse.com/docs/en/interfaces/http")
        );
        let schema = spec.config_schema.unwrap();
        assert!(schema["properties"]["table"].is_object());
        assert!(schema["properties"]["literal_rendering"].is_object());
    }

    #[tokio::test]
    async fn test_check_rejects_bad_table_name() {
        let transport = Arc::new(MockTransport::new());
        let mut config = config();
        config.table = "x; DROP TABLE y".to_string();

        let result = sink(&transport).check(&config).await.unwrap();
        assert!(!result.is_success());
        assert!(!result.get("config").unwrap().passed);
        assert!(result.get("connectivity").is_none());
        assert_eq!(transport.pings(), 0);
    }

    #[tokio::test]
    async fn test_check_reports_unreachable() {
        let transport = Arc::new(MockTransport::new().unreachable());

        let result = sink(&transport).check(&config()).await.unwrap();
        assert!(!result.is_success());
        assert!(result.get("config").unwrap().passed);
        assert!(!result.get("connectivity").unwrap().passed);
        assert!(result.get("table_exists").is_none());
    }

    #[tokio::test]
    async fn test_write_unreachable_fails_before_consuming() {
        let transport = Arc::new(MockTransport::new().unreachable());
        let records = futures::stream::iter(vec![Record::infer(json!({"a": 1})).unwrap()]).boxed();

        let err = sink(&transport).write(&config(), records).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(_)));
        assert!(transport.statements().is_empty());
    }

    #[tokio::test]
    async fn test_write_empty_stream() {
        let transport = Arc::new(MockTransport::new());
        let records = futures::stream::empty().boxed();

        let result = sink(&transport).write(&config(), records).await.unwrap();
        assert_eq!(result, WriteResult::default());
        assert!(transport.statements().is_empty());
    }
}
