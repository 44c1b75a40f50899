//! HTTP transport against a minimal in-process ClickHouse stand-in.

use clickhouse_sink::prelude::*;
use clickhouse_sink::{ExecutionSummary, SensitiveString, TransportError, DEFAULT_PING_TIMEOUT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request as seen by the fake server.
#[derive(Debug, Clone)]
struct Captured {
    request_line: String,
    headers: HashMap<String, String>,
    body: String,
}

/// Canned reply.
#[derive(Clone)]
struct Reply {
    status: &'static str,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl Reply {
    fn ok(body: &str) -> Self {
        Self {
            status: "200 OK",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn render(&self) -> String {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.body.len()
        );
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

struct FakeClickHouse {
    port: u16,
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl FakeClickHouse {
    /// Serve `/ping` with `Ok.` and every other request with `insert_reply`.
    async fn start(insert_reply: Reply) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let captured = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let captured = captured.clone();
                let insert_reply = insert_reply.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    let reply = if request.request_line.starts_with("GET /ping") {
                        Reply::ok("Ok.\n")
                    } else {
                        insert_reply
                    };
                    captured.lock().push(request);
                    let _ = stream.write_all(reply.render().as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { port, requests }
    }

    fn endpoint(&self, credentials: Option<(&str, &str)>) -> Endpoint {
        let password = credentials.map(|(_, p)| SensitiveString::new(p));
        Endpoint::configure(
            Scheme::Http,
            "127.0.0.1",
            self.port,
            "markets",
            credentials.map(|(u, _)| u),
            password.as_ref(),
        )
        .unwrap()
    }

    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().clone()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("clickhouse_sink=debug")
        .try_init();
}

async fn read_request(stream: &mut TcpStream) -> Option<Captured> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);

    Some(Captured {
        request_line,
        headers,
        body: String::from_utf8_lossy(&buf[header_end..body_end]).to_string(),
    })
}

fn stock(symbol: &str, price: &str) -> Record {
    Record::from_json(
        vec![
            Field::new("symbol", FieldType::String),
            Field::new("price", FieldType::String),
        ],
        serde_json::json!({"symbol": symbol, "price": price}),
    )
    .unwrap()
}

const SUMMARY: &str = r#"{"read_rows":"2","read_bytes":"60","written_rows":"2","written_bytes":"60","total_rows_to_read":"0","result_rows":"2","result_bytes":"60"}"#;

#[tokio::test]
async fn test_verify_reachable_server() {
    let server = FakeClickHouse::start(Reply::ok("")).await;

    assert!(ConnectionGate::verify(&server.endpoint(None), Duration::from_secs(2)).await);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].request_line.starts_with("GET /ping "));
}

#[tokio::test]
async fn test_verify_refused_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint =
        Endpoint::configure(Scheme::Http, "127.0.0.1", port, "default", None, None).unwrap();
    assert!(!ConnectionGate::verify(&endpoint, DEFAULT_PING_TIMEOUT).await);
}

#[tokio::test]
async fn test_verify_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            // accept and never answer
            open.push(stream);
        }
    });

    let endpoint =
        Endpoint::configure(Scheme::Http, "127.0.0.1", port, "default", None, None).unwrap();
    let t0 = Instant::now();
    assert!(!ConnectionGate::verify(&endpoint, Duration::from_millis(100)).await);
    assert!(t0.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_execute_sends_statement_and_reads_summary() {
    let server =
        FakeClickHouse::start(Reply::ok("").header("X-ClickHouse-Summary", SUMMARY)).await;
    let transport = HttpTransport::new().unwrap();
    let statement = "INSERT INTO stock_v1 (symbol,price) VALUES ('ACME','1.5'),('INIT','2.25')";

    let summary = transport
        .execute(&server.endpoint(Some(("ingest", "s3cret"))), statement)
        .await
        .unwrap();

    assert_eq!(summary.written_rows, 2);
    assert_eq!(summary.written_bytes, 60);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request
        .request_line
        .starts_with("POST /?database=markets&default_format=RowBinaryWithNamesAndTypes "));
    assert_eq!(request.headers.get("x-clickhouse-user").map(String::as_str), Some("ingest"));
    assert_eq!(request.headers.get("x-clickhouse-key").map(String::as_str), Some("s3cret"));
    assert_eq!(request.body, statement);
}

#[tokio::test]
async fn test_execute_anonymous_sends_no_auth_headers() {
    let server = FakeClickHouse::start(Reply::ok("")).await;
    let transport = HttpTransport::new().unwrap();

    let summary = transport
        .execute(&server.endpoint(None), "INSERT INTO t (a) VALUES ('1')")
        .await
        .unwrap();

    // no summary header: counters default to zero
    assert_eq!(summary, ExecutionSummary::default());
    let request = &server.requests()[0];
    assert!(!request.headers.contains_key("x-clickhouse-user"));
    assert!(!request.headers.contains_key("x-clickhouse-key"));
}

#[tokio::test]
async fn test_server_exception_maps_to_execution_error() {
    let server = FakeClickHouse::start(Reply {
        status: "404 Not Found",
        headers: vec![("X-ClickHouse-Exception-Code", "60".to_string())],
        body: "Code: 60. DB::Exception: Unknown table markets.stock_v1. (UNKNOWN_TABLE)\n"
            .to_string(),
    })
    .await;
    let executor = BatchInsertExecutor::new(Arc::new(HttpTransport::new().unwrap()));

    let err = executor
        .insert(&server.endpoint(None), "stock_v1", &[stock("ACME", "1.5")])
        .await
        .unwrap_err();

    match &err {
        InsertError::Execution {
            statement,
            code,
            message,
        } => {
            assert_eq!(
                statement,
                "INSERT INTO stock_v1 (symbol,price) VALUES ('ACME','1.5')"
            );
            assert_eq!(*code, Some(60));
            assert!(message.starts_with("Code: 60."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(ConnectorError::from(err), ConnectorError::NotFound(_)));
}

#[tokio::test]
async fn test_exception_after_ok_status_is_an_error() {
    let server = FakeClickHouse::start(
        Reply::ok("Code: 241. DB::Exception: Memory limit (total) exceeded")
            .header("X-ClickHouse-Exception-Code", "241"),
    )
    .await;

    let err = HttpTransport::new()
        .unwrap()
        .execute(&server.endpoint(None), "INSERT INTO t (a) VALUES ('1')")
        .await
        .unwrap_err();

    match err {
        TransportError::Server { status, code, .. } => {
            assert_eq!(status, 200);
            assert_eq!(code, Some(241));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_writer_end_to_end() {
    let server =
        FakeClickHouse::start(Reply::ok("").header("X-ClickHouse-Summary", SUMMARY)).await;
    let props: HashMap<String, String> = [
        ("hostname", "127.0.0.1".to_string()),
        ("port", server.port.to_string()),
        ("scheme", "http".to_string()),
        ("database", "markets".to_string()),
        ("table", "stock_v1".to_string()),
        ("username", "ingest".to_string()),
        ("password", "s3cret".to_string()),
        ("ping_timeout_ms", "2000".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut writer = ClickHouseWriter::new(
        Arc::new(HttpTransport::new().unwrap()),
        Arc::new(TracingEventSink),
    );
    assert!(writer.start(&props).await.unwrap());

    let outcome = writer
        .insert(&[stock("ACME", "1.5"), stock("O'Neil", "2.25")])
        .await
        .unwrap();
    assert_eq!(outcome.batch_size, 2);
    assert_eq!(outcome.rows_reported, 2);
    assert_eq!(writer.records_inserted(), 2);
    writer.stop();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].request_line.starts_with("GET /ping "));
    assert_eq!(
        requests[1].body,
        r"INSERT INTO stock_v1 (symbol,price) VALUES ('ACME','1.5'),('O\'Neil','2.25')"
    );
}

/// SQL of a request from the `clickhouse` client: the `query` parameter of a
/// GET, or the body of a POST.
fn sql_of(request: &Captured) -> String {
    let target = request.request_line.split(' ').nth(1).unwrap_or_default();
    let url = reqwest::Url::parse(&format!("http://fake{}", target)).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "query")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| request.body.clone())
}

/// RowBinary encoding of a single `UInt64` row.
fn row_binary_u64(n: u64) -> String {
    String::from_utf8(n.to_le_bytes().to_vec()).unwrap()
}

fn check_config(server: &FakeClickHouse) -> ClickHouseSinkConfig {
    ClickHouseSinkConfig {
        hostname: "127.0.0.1".to_string(),
        port: server.port,
        scheme: Scheme::Http,
        database: "markets".to_string(),
        table: "stock_v1".to_string(),
        ping_timeout_ms: 2000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_check_table_exists() {
    let server = FakeClickHouse::start(Reply::ok(&row_binary_u64(1))).await;
    let sink = ClickHouseSink::new().unwrap();

    let result = sink.check(&check_config(&server)).await.unwrap();

    assert!(result.is_success(), "{result}");
    assert!(result.get("connectivity").unwrap().passed);
    assert!(result.get("table_exists").unwrap().passed);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let sql = sql_of(&requests[1]);
    assert!(sql.contains("system.tables"), "{sql}");
    assert!(sql.contains("'markets'"), "{sql}");
    assert!(sql.contains("'stock_v1'"), "{sql}");
    assert!(!sql.contains('?'), "{sql}");
}

#[tokio::test]
async fn test_check_table_missing() {
    let server = FakeClickHouse::start(Reply::ok(&row_binary_u64(0))).await;
    let sink = ClickHouseSink::new().unwrap();

    let result = sink.check(&check_config(&server)).await.unwrap();

    assert!(!result.is_success());
    assert!(result.get("connectivity").unwrap().passed);
    let table = result.get("table_exists").unwrap();
    assert!(!table.passed);
    assert!(table
        .message
        .as_deref()
        .unwrap()
        .contains("'markets.stock_v1' not found"));
}

#[tokio::test]
async fn test_check_metadata_query_error() {
    let server = FakeClickHouse::start(Reply {
        status: "500 Internal Server Error",
        headers: vec![("X-ClickHouse-Exception-Code", "497".to_string())],
        body: "Code: 497. DB::Exception: Not enough privileges. (ACCESS_DENIED)\n".to_string(),
    })
    .await;
    let sink = ClickHouseSink::new().unwrap();

    let result = sink.check(&check_config(&server)).await.unwrap();

    assert!(!result.is_success());
    let table = result.get("table_exists").unwrap();
    assert!(!table.passed);
    assert!(table
        .message
        .as_deref()
        .unwrap()
        .starts_with("Failed to query ClickHouse metadata"));
}
