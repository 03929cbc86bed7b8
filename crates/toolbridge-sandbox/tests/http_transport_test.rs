//! HTTP transport against a local one-shot server.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use toolbridge_core::{BridgeError, SessionId};
use toolbridge_sandbox::{HttpSandboxTransport, SandboxConfig, SandboxTransport};

struct CannedServer {
    endpoint: String,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

/// Serve every connection with the same status line and body.
async fn canned_server(status: &'static str, body: &'static str) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");
    let connections = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let counter = connections.clone();
    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let request = read_request(&mut stream).await;
            seen.lock().await.push(request);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    CannedServer {
        endpoint: format!("http://{}/", address),
        connections,
        requests,
    }
}

async fn read_request(stream: &mut TcpStream) -> (String, Value) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let read = stream.read(&mut chunk).await.expect("read request");
        if read == 0 {
            return (String::new(), Value::Null);
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await.expect("read body");
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let request_line = head.lines().next().unwrap_or_default().to_string();
    let body = serde_json::from_slice(&buffer[header_end..]).unwrap_or(Value::Null);
    (request_line, body)
}

#[tokio::test]
async fn execute_posts_session_scoped_code() {
    let server = canned_server(
        "200 OK",
        r#"{"properties":{"status":"Success","stdout":"4\n","stderr":"","result":4,"executionTimeInMilliseconds":12}}"#,
    )
    .await;
    let config = SandboxConfig::new(server.endpoint.clone()).with_session_id(SessionId::from_external("s-1"));
    let transport = HttpSandboxTransport::new(&config).expect("transport");

    let result = transport
        .execute(&config.session_id, "print(2 + 2)")
        .await
        .expect("execute");
    assert!(result.succeeded());
    assert_eq!(result.stdout, "4\n");
    assert_eq!(result.result, json!(4));
    assert_eq!(result.execution_time_ms, 12);

    let requests = server.requests.lock().await;
    let (request_line, body) = &requests[0];
    assert!(request_line.starts_with("POST /python/execute"));
    assert_eq!(body["properties"]["identifier"], "s-1");
    assert_eq!(body["properties"]["pythonCode"], "print(2 + 2)");
    assert_eq!(body["properties"]["executionType"], "synchronous");
}

#[tokio::test]
async fn non_success_status_is_a_transport_error_without_retry() {
    let server = canned_server("503 Service Unavailable", "pool busy").await;
    let config = SandboxConfig::new(server.endpoint.clone());
    let transport = HttpSandboxTransport::new(&config).expect("transport");

    let err = transport
        .execute(&config.session_id, "1")
        .await
        .expect_err("503 must fail");
    match err {
        BridgeError::Transport { operation, status, body } => {
            assert_eq!(operation, "execute");
            assert_eq!(status, 503);
            assert_eq!(body, "pool busy");
        }
        other => panic!("expected transport error, got {:?}", other),
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_listing_unwraps_values() {
    let server = canned_server(
        "200 OK",
        r#"{"$id":"1","$values":[{"properties":{"filename":"report.csv","bytes":42,"fullPath":"/mnt/data/report.csv"}}]}"#,
    )
    .await;
    let config = SandboxConfig::new(server.endpoint.clone());
    let transport = HttpSandboxTransport::new(&config).expect("transport");

    let files = transport.list_files(&config.session_id).await.expect("list files");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "report.csv");
    assert_eq!(files[0].bytes, Some(42));

    let requests = server.requests.lock().await;
    assert!(requests[0].0.starts_with("GET /python/files?identifier="));
}

#[tokio::test]
async fn malformed_execute_body_is_a_decode_error() {
    let server = canned_server("200 OK", "not json").await;
    let config = SandboxConfig::new(server.endpoint.clone());
    let transport = HttpSandboxTransport::new(&config).expect("transport");

    let err = transport
        .execute(&config.session_id, "1")
        .await
        .expect_err("body is not JSON");
    match err {
        BridgeError::Decode { raw, .. } => assert_eq!(raw, "not json"),
        other => panic!("expected decode error, got {:?}", other),
    }
}
