use futures::StreamExt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use campus_chat::transport::{
    FragmentStream, HttpConfig, HttpTransport, StreamError, StreamTransport, TransportError,
};

async fn collect(mut stream: FragmentStream) -> (String, Option<StreamError>) {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => text.push_str(&fragment),
            Err(e) => return (text, Some(e)),
        }
    }
    (text, None)
}

/// Answers the first request with the raw `response` bytes, then either
/// closes the connection or keeps it open without sending anything more.
async fn raw_server(response: Vec<u8>, keep_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket.write_all(&response).await.unwrap();
        socket.flush().await.unwrap();
        if keep_open {
            std::future::pending::<()>().await;
        }
    });

    format!("http://{addr}")
}

async fn next_within(stream: &mut FragmentStream) -> Option<Result<String, StreamError>> {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("stream stalled")
}

#[tokio::test]
async fn test_streams_body_for_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat"))
        .and(query_param("query", "下学期什么时候开学？"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain; charset=utf-8")
                .set_body_string("【后端】正在检索知识库...\n开学时间是二月。"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let stream = transport.open("下学期什么时候开学？", CancellationToken::new());
    let (text, error) = collect(stream).await;

    assert_eq!(text, "【后端】正在检索知识库...\n开学时间是二月。");
    assert!(error.is_none());
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let (text, error) = collect(transport.open("q", CancellationToken::new())).await;

    assert!(text.is_empty());
    assert_eq!(
        error,
        Some(StreamError::Transport(TransportError::status(
            500,
            "Internal Server Error"
        )))
    );
}

#[tokio::test]
async fn test_fastapi_detail_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "detail": "Not Found"
        })))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let (_, error) = collect(transport.open("q", CancellationToken::new())).await;

    assert_eq!(
        error,
        Some(StreamError::Transport(TransportError::status(404, "Not Found")))
    );
}

#[tokio::test]
async fn test_refused_connection_maps_to_connection_error() {
    let transport = HttpTransport::with_config(
        "http://127.0.0.1:9",
        HttpConfig::new().with_connect_timeout(std::time::Duration::from_secs(2)),
    )
    .unwrap();

    let (_, error) = collect(transport.open("q", CancellationToken::new())).await;
    assert!(matches!(
        error,
        Some(StreamError::Transport(TransportError::Connection(_)))
    ));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let cancel = CancellationToken::new();
    let mut stream = transport.open("q", cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let first = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
        .await
        .expect("cancellation should end the wait promptly");
    assert_eq!(first, Some(Err(StreamError::Cancelled)));
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_cancel_mid_body_stops_reading() {
    let endpoint = raw_server(
        b"HTTP/1.1 200 OK\r\ncontent-type: text/plain; charset=utf-8\r\ntransfer-encoding: chunked\r\n\r\n5\r\nHello\r\n"
            .to_vec(),
        true,
    )
    .await;

    let transport = HttpTransport::new(endpoint).unwrap();
    let cancel = CancellationToken::new();
    let mut stream = transport.open("q", cancel.clone());

    assert_eq!(next_within(&mut stream).await, Some(Ok("Hello".to_string())));

    cancel.cancel();
    assert_eq!(
        next_within(&mut stream).await,
        Some(Err(StreamError::Cancelled))
    );
    assert_eq!(next_within(&mut stream).await, None);
}

#[tokio::test]
async fn test_dropped_connection_mid_body_is_body_error() {
    let mut response = b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\nHi ".to_vec();
    // First two bytes of a three-byte character.
    response.extend_from_slice(&"✅".as_bytes()[..2]);
    let endpoint = raw_server(response, false).await;

    let transport = HttpTransport::new(endpoint).unwrap();
    let mut stream = transport.open("q", CancellationToken::new());

    let mut text = String::new();
    let error = loop {
        match next_within(&mut stream).await {
            Some(Ok(fragment)) => text.push_str(&fragment),
            Some(Err(e)) => break e,
            None => panic!("stream ended without an error"),
        }
    };

    assert_eq!(text, "Hi \u{FFFD}");
    assert!(matches!(
        error,
        StreamError::Transport(TransportError::Body(_))
    ));
    assert_eq!(next_within(&mut stream).await, None);
}

#[tokio::test]
async fn test_endless_error_body_is_capped() {
    let mut response =
        b"HTTP/1.1 503 Service Unavailable\r\ntransfer-encoding: chunked\r\n\r\n1388\r\n".to_vec();
    response.extend(std::iter::repeat_n(b'x', 5000));
    response.extend_from_slice(b"\r\n");
    let endpoint = raw_server(response, true).await;

    let transport = HttpTransport::new(endpoint).unwrap();
    let mut stream = transport.open("q", CancellationToken::new());

    assert_eq!(
        next_within(&mut stream).await,
        Some(Err(StreamError::Transport(TransportError::status(
            503, "HTTP 503"
        ))))
    );
    assert_eq!(next_within(&mut stream).await, None);
}
