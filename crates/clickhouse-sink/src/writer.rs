//! Writer task lifecycle
//!
//! [`ClickHouseWriter`] is what the hosting framework drives: `start` with
//! the property map, `insert` once per delivered batch, `stop` at shutdown.
//! Startup refuses to go live when the reachability probe fails; the
//! framework decides what to do with a `false` start.

use crate::config::ClickHouseSinkConfig;
use crate::error::{ConnectorError, Result};
use crate::events::EventSink;
use crate::executor::{BatchInsertExecutor, InsertOutcome};
use crate::gate::{ConnectionGate, Endpoint};
use crate::record::Record;
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// State that only exists between a successful `start` and `stop`.
struct Active {
    endpoint: Endpoint,
    table: String,
    executor: BatchInsertExecutor,
}

/// Inserts framework-delivered batches into one ClickHouse table.
pub struct ClickHouseWriter {
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    active: Option<Active>,
    records_inserted: AtomicU64,
}

impl ClickHouseWriter {
    pub fn new(transport: Arc<dyn Transport>, events: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            events,
            active: None,
            records_inserted: AtomicU64::new(0),
        }
    }

    /// Parse `props`, resolve the endpoint and probe it.
    ///
    /// `Ok(false)` means the configuration is fine but the server did not
    /// answer the probe in time; the writer stays stopped.
    pub async fn start(&mut self, props: &HashMap<String, String>) -> Result<bool> {
        let config = ClickHouseSinkConfig::from_props(props)?;
        self.start_with_config(&config).await
    }

    /// [`ClickHouseWriter::start`] for an already typed configuration.
    pub async fn start_with_config(&mut self, config: &ClickHouseSinkConfig) -> Result<bool> {
        config.validate_all()?;
        let endpoint = config.endpoint()?;

        if endpoint.partial_credentials() {
            warn!(
                endpoint = %endpoint,
                "Only one of username/password is set; connecting anonymously"
            );
        }

        if !ConnectionGate::verify_with(self.transport.as_ref(), &endpoint, config.ping_timeout())
            .await
        {
            warn!(
                endpoint = %endpoint,
                timeout_ms = config.ping_timeout_ms,
                "ClickHouse is not reachable, writer not started"
            );
            self.active = None;
            return Ok(false);
        }

        info!(
            endpoint = %endpoint,
            table = %config.table,
            rendering = ?config.literal_rendering,
            authenticated = endpoint.credentials().is_some(),
            "ClickHouse writer started"
        );

        let executor = BatchInsertExecutor::new(self.transport.clone())
            .with_rendering(config.literal_rendering)
            .with_events(self.events.clone());
        self.active = Some(Active {
            endpoint,
            table: config.table.clone(),
            executor,
        });
        Ok(true)
    }

    /// Insert one batch as a single statement.
    pub async fn insert(&self, records: &[Record]) -> Result<InsertOutcome> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| ConnectorError::State("writer is not started".to_string()))?;

        let outcome = active
            .executor
            .insert(&active.endpoint, &active.table, records)
            .await?;
        self.records_inserted
            .fetch_add(outcome.batch_size as u64, Ordering::Relaxed);
        Ok(outcome)
    }

    /// Release the endpoint. Further inserts fail until the next `start`.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            info!(
                endpoint = %active.endpoint,
                table = %active.table,
                records_inserted = self.records_inserted(),
                "ClickHouse writer stopped"
            );
        }
    }

    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Records in batches the server accepted since construction.
    pub fn records_inserted(&self) -> u64 {
        self.records_inserted.load(Ordering::Relaxed)
    }
}
