//! Transport to the ClickHouse HTTP interface
//!
//! The executor and the connection gate only talk to the server through the
//! [`Transport`] trait. [`HttpTransport`] is the real implementation:
//!
//! - `GET /ping` for the reachability probe (answers `Ok.`)
//! - `POST /?database=<db>&default_format=RowBinaryWithNamesAndTypes` with
//!   the statement as the request body
//!
//! Credentials travel in the `X-ClickHouse-User` / `X-ClickHouse-Key`
//! headers. Row counts come from the `X-ClickHouse-Summary` response header;
//! the response body is drained but not parsed.

use crate::error::{ConnectorError, Result};
use crate::gate::Endpoint;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Response format requested for statements.
pub const RESPONSE_FORMAT: &str = "RowBinaryWithNamesAndTypes";

const SUMMARY_HEADER: &str = "x-clickhouse-summary";
const EXCEPTION_CODE_HEADER: &str = "x-clickhouse-exception-code";
const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

/// Failure of one request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request did not complete: refused, reset, timed out, TLS, DNS.
    #[error("{0}")]
    Connectivity(String),

    /// The server answered with an exception.
    #[error("HTTP {status}: {message}")]
    Server {
        status: u16,
        code: Option<u32>,
        message: String,
    },
}

/// Counters ClickHouse reports for an executed statement.
///
/// ClickHouse sends them as JSON strings (`{"written_rows":"2",...}`); plain
/// numbers are accepted as well. Missing counters are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub read_rows: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub read_bytes: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub written_rows: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub written_bytes: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_rows_to_read: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub result_rows: u64,
}

impl ExecutionSummary {
    /// Parse the `X-ClickHouse-Summary` header value.
    pub fn from_header(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(ConnectorError::from)
    }

    fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(SUMMARY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Self::from_header(v).ok())
            .unwrap_or_default()
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn exception_code(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(EXCEPTION_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Carries probes and statements to a ClickHouse server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Lightweight reachability check bounded by `timeout`.
    async fn ping(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> std::result::Result<(), TransportError>;

    /// Execute one statement and return the server's counters.
    async fn execute(
        &self,
        endpoint: &Endpoint,
        statement: &str,
    ) -> std::result::Result<ExecutionSummary, TransportError>;
}

/// ClickHouse HTTP interface over `reqwest`.
///
/// Idle connections are not kept, so every call opens its own connection.
/// `execute` has no request timeout: a server that never answers blocks the
/// caller.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ConnectorError::config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// `GET /ping` on a client built for this call alone, bounded by `timeout`.
    pub async fn probe(
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> std::result::Result<(), TransportError> {
        let url = endpoint
            .server_url()
            .join("ping")
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        // fresh client per probe, nothing outlives the call
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        let probe = async {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| TransportError::Connectivity(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let message = response.text().await.unwrap_or_default();
                Err(TransportError::Server {
                    status: status.as_u16(),
                    code: None,
                    message: message.trim().to_string(),
                })
            }
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connectivity(format!(
                "ping timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn authorize(endpoint: &Endpoint, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match endpoint.credentials() {
            Some(creds) => request
                .header(USER_HEADER, &creds.username)
                .header(KEY_HEADER, creds.password.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ping(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> std::result::Result<(), TransportError> {
        Self::probe(endpoint, timeout).await
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        statement: &str,
    ) -> std::result::Result<ExecutionSummary, TransportError> {
        let request = self
            .client
            .post(endpoint.server_url().clone())
            .query(&[
                ("database", endpoint.database()),
                ("default_format", RESPONSE_FORMAT),
            ])
            .body(statement.to_string());

        let response = Self::authorize(endpoint, request)
            .send()
            .await
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let code = exception_code(&headers);

        // ClickHouse may fail after sending 200 headers; the exception code
        // header is the reliable signal.
        if !status.is_success() || code.is_some() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Server {
                status: status.as_u16(),
                code,
                message: message.trim().to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        Ok(ExecutionSummary::from_headers(&headers))
    }
}
