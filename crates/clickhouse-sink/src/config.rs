//! Connector configuration
//!
//! The hosting framework hands the connector a flat string property map at
//! startup. [`ClickHouseSinkConfig::from_props`] turns it into a typed,
//! validated config; YAML/JSON configs deserialize into the same type.
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `hostname` | (required) | ClickHouse host |
//! | `port` | `8443` | HTTP(S) port |
//! | `database` | `default` | Target database |
//! | `table` | (required) | Target table |
//! | `username` | none | User; ignored without `password` |
//! | `password` | none | Password; ignored without `username` |
//! | `scheme` | `https` | `http` or `https` |
//! | `ping_timeout_ms` | `100` | Startup probe bound |
//! | `batch_size` | `10000` | Records per insert in streaming mode |
//! | `flush_interval_secs` | `5` | Partial batch flush timer |
//! | `literal_rendering` | `escaped` | `escaped` or `unsafe` |

use crate::error::{ConnectorError, Result};
use crate::gate::{Endpoint, Scheme};
use crate::statement::LiteralRendering;
use crate::types::SensitiveString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

pub const HOSTNAME: &str = "hostname";
pub const PORT: &str = "port";
pub const DATABASE: &str = "database";
pub const TABLE: &str = "table";
pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const SCHEME: &str = "scheme";
pub const PING_TIMEOUT_MS: &str = "ping_timeout_ms";
pub const BATCH_SIZE: &str = "batch_size";
pub const FLUSH_INTERVAL_SECS: &str = "flush_interval_secs";
pub const LITERAL_RENDERING: &str = "literal_rendering";

/// Configuration for the ClickHouse sink
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ClickHouseSinkConfig {
    /// ClickHouse hostname
    #[validate(length(min = 1, max = 253))]
    pub hostname: String,

    /// HTTP(S) port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Database name
    #[serde(default = "default_database")]
    #[validate(length(min = 1, max = 255))]
    pub database: String,

    /// Target table (must already exist)
    #[validate(length(min = 1, max = 255))]
    pub table: String,

    /// Username; only used together with `password`
    #[serde(default)]
    pub username: Option<String>,

    /// Password; only used together with `username`
    #[serde(default)]
    pub password: Option<SensitiveString>,

    /// URL scheme of the HTTP interface
    #[serde(default)]
    pub scheme: Scheme,

    /// Bound on the startup reachability probe (milliseconds)
    #[serde(default = "default_ping_timeout_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub ping_timeout_ms: u64,

    /// Records per INSERT when consuming a stream
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub batch_size: usize,

    /// Maximum time before a partial batch is flushed (seconds)
    #[serde(default = "default_flush_interval")]
    #[validate(range(min = 1, max = 3600))]
    pub flush_interval_secs: u64,

    /// How values are embedded in the statement
    #[serde(default)]
    pub literal_rendering: LiteralRendering,
}

fn default_port() -> u16 {
    8443
}

fn default_database() -> String {
    "default".to_string()
}

fn default_ping_timeout_ms() -> u64 {
    100
}

fn default_batch_size() -> usize {
    10_000
}

fn default_flush_interval() -> u64 {
    5
}

/// Valid ClickHouse identifiers (database / table names). Dots allow
/// `db.table` qualified names.
static IDENTIFIER_PATTERN: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]{0,254}$").expect("identifier pattern is valid")
});

impl Default for ClickHouseSinkConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: default_port(),
            database: default_database(),
            table: String::new(),
            username: None,
            password: None,
            scheme: Scheme::default(),
            ping_timeout_ms: default_ping_timeout_ms(),
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval(),
            literal_rendering: LiteralRendering::default(),
        }
    }
}

impl ClickHouseSinkConfig {
    /// Parse the framework's property map.
    ///
    /// Unknown keys are ignored. Empty values count as absent.
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self {
            hostname: get(HOSTNAME)
                .ok_or_else(|| ConnectorError::config("missing required property 'hostname'"))?
                .to_string(),
            table: get(TABLE)
                .ok_or_else(|| ConnectorError::config("missing required property 'table'"))?
                .to_string(),
            username: get(USERNAME).map(str::to_string),
            // passwords are taken verbatim, surrounding spaces included
            password: props
                .get(PASSWORD)
                .filter(|v| !v.is_empty())
                .map(SensitiveString::new),
            ..Self::default()
        };

        if let Some(v) = get(PORT) {
            config.port = parse_prop(PORT, v)?;
        }
        if let Some(v) = get(DATABASE) {
            config.database = v.to_string();
        }
        if let Some(v) = get(SCHEME) {
            config.scheme = parse_prop(SCHEME, v)?;
        }
        if let Some(v) = get(PING_TIMEOUT_MS) {
            config.ping_timeout_ms = parse_prop(PING_TIMEOUT_MS, v)?;
        }
        if let Some(v) = get(BATCH_SIZE) {
            config.batch_size = parse_prop(BATCH_SIZE, v)?;
        }
        if let Some(v) = get(FLUSH_INTERVAL_SECS) {
            config.flush_interval_secs = parse_prop(FLUSH_INTERVAL_SECS, v)?;
        }
        if let Some(v) = get(LITERAL_RENDERING) {
            config.literal_rendering = parse_prop(LITERAL_RENDERING, v)?;
        }

        Ok(config)
    }

    /// Parse and validate a YAML `config:` block.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Field-level rules plus identifier checks.
    pub fn validate_all(&self) -> Result<()> {
        self.validate()
            .map_err(|e| ConnectorError::config(e.to_string()))?;
        Self::validate_database_name(&self.database).map_err(ConnectorError::Config)?;
        Self::validate_table_name(&self.table).map_err(ConnectorError::Config)?;
        Ok(())
    }

    /// Validate that a database name is safe for inclusion in queries.
    pub fn validate_database_name(name: &str) -> std::result::Result<(), String> {
        if !IDENTIFIER_PATTERN.is_match(name) {
            return Err(format!(
                "Invalid database name '{}': must match [A-Za-z_][A-Za-z0-9_.]*",
                name
            ));
        }
        Ok(())
    }

    /// Validate that a table name is safe for inclusion in queries.
    pub fn validate_table_name(name: &str) -> std::result::Result<(), String> {
        if !IDENTIFIER_PATTERN.is_match(name) {
            return Err(format!(
                "Invalid table name '{}': must match [A-Za-z_][A-Za-z0-9_.]*",
                name
            ));
        }
        Ok(())
    }

    /// Resolve the configured endpoint.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::configure(
            self.scheme,
            &self.hostname,
            self.port,
            &self.database,
            self.username.as_deref(),
            self.password.as_ref(),
        )
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn parse_prop<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConnectorError::config(format!("invalid value '{}' for '{}': {}", value, key, e)))
}
