//! Connection gate
//!
//! Resolves connection parameters into an immutable [`Endpoint`] and checks
//! that the server answers before any batch is sent.

use crate::error::{ConnectorError, Result};
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::types::{Credentials, SensitiveString};
use reqwest::Url;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Characters that would move the URL authority away from the hostname.
const HOST_DELIMITERS: [char; 5] = ['/', '?', '#', '@', '\\'];

/// Default bound on the reachability probe.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(100);

/// URL scheme of the ClickHouse HTTP interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Https => f.write_str("https"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(format!("unsupported scheme '{}'", other)),
        }
    }
}

/// Resolved network target for one ClickHouse database.
#[derive(Debug, Clone)]
pub struct Endpoint {
    scheme: Scheme,
    hostname: String,
    port: u16,
    database: String,
    credentials: Option<Credentials>,
    partial_credentials: bool,
    url: Url,
    server_url: Url,
}

impl Endpoint {
    /// Build the endpoint `scheme://hostname:port/database`.
    ///
    /// Credentials are attached only when both `username` and `password` are
    /// given. A lone username or password yields an anonymous endpoint with
    /// [`Endpoint::partial_credentials`] set.
    pub fn configure(
        scheme: Scheme,
        hostname: &str,
        port: u16,
        database: &str,
        username: Option<&str>,
        password: Option<&SensitiveString>,
    ) -> Result<Self> {
        if hostname.trim().is_empty() {
            return Err(ConnectorError::config("hostname must not be empty"));
        }
        if database.trim().is_empty() {
            return Err(ConnectorError::config("database must not be empty"));
        }
        if port == 0 {
            return Err(ConnectorError::config("port must be in 1..=65535"));
        }
        if let Some(c) = hostname
            .chars()
            .find(|c| c.is_whitespace() || HOST_DELIMITERS.contains(c))
        {
            return Err(ConnectorError::config(format!(
                "hostname '{}' must not contain '{}'",
                hostname,
                c.escape_default()
            )));
        }

        let url = Url::parse(&format!("{}://{}:{}/{}", scheme, hostname, port, database))
            .map_err(|e| ConnectorError::config(format!("invalid endpoint url: {}", e)))?;
        let server_url = Url::parse(&format!("{}://{}:{}/", scheme, hostname, port))
            .map_err(|e| ConnectorError::config(format!("invalid endpoint url: {}", e)))?;

        let resolved_host = server_url.host_str().unwrap_or_default();
        let expected_host = hostname.trim_start_matches('[').trim_end_matches(']');
        if !resolved_host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .eq_ignore_ascii_case(expected_host)
            || server_url.port_or_known_default() != Some(port)
        {
            return Err(ConnectorError::config(format!(
                "hostname '{}' with port {} does not resolve to that host and port (got {})",
                hostname, port, server_url
            )));
        }

        let credentials = Credentials::from_parts(username, password);
        let partial_credentials = credentials.is_none() && (username.is_some() || password.is_some());

        Ok(Self {
            scheme,
            hostname: hostname.to_string(),
            port,
            database: database.to_string(),
            credentials,
            partial_credentials,
            url,
            server_url,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// True when exactly one of username/password was supplied and the
    /// endpoint therefore fell back to anonymous access.
    pub fn partial_credentials(&self) -> bool {
        self.partial_credentials
    }

    /// `scheme://hostname:port/database`
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `scheme://hostname:port/`, the root of the HTTP interface.
    pub fn server_url(&self) -> &Url {
        &self.server_url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Reachability probe in front of the insert path.
pub struct ConnectionGate;

impl ConnectionGate {
    /// Probe `endpoint` over HTTP with a fresh client.
    ///
    /// `true` only for a successful round trip within `timeout`. No retry.
    pub async fn verify(endpoint: &Endpoint, timeout: Duration) -> bool {
        let t0 = Instant::now();
        let result = HttpTransport::probe(endpoint, timeout).await;
        Self::report(endpoint, timeout, t0, result)
    }

    /// Same as [`ConnectionGate::verify`] through an arbitrary transport.
    pub async fn verify_with(
        transport: &dyn Transport,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> bool {
        let t0 = Instant::now();
        let result = transport.ping(endpoint, timeout).await;
        Self::report(endpoint, timeout, t0, result)
    }

    fn report(
        endpoint: &Endpoint,
        timeout: Duration,
        t0: Instant,
        result: std::result::Result<(), TransportError>,
    ) -> bool {
        match result {
            Ok(()) => {
                debug!(
                    endpoint = %endpoint,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "ClickHouse ping ok"
                );
                true
            }
            Err(e) => {
                debug!(
                    endpoint = %endpoint,
                    timeout_ms = timeout.as_millis() as u64,
                    error = %e,
                    "ClickHouse ping failed"
                );
                false
            }
        }
    }
}
