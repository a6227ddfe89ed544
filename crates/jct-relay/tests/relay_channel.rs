// SPDX-License-Identifier: MIT OR Apache-2.0
//! `RelayChannel` against a stub relay.

use jct_relay::RelayChannel;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM: &str = "event: ready\ndata: {}\n\n\
data: {\"body\": {\"@type\": \"StateChange\", \"changed\": {\"A1\": {\"Email\": \"s2\"}}}}\n\n\
data: not json\n\n\
data: {\"@type\": \"Ping\"}\n\n";

async fn relay_with_stream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("Location", format!("{}/chan42", server.uri())),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chan42"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(STREAM),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn connect_reads_location_and_buffers_events() {
    let server = MockServer::start().await;
    relay_with_stream(&server).await;

    let channel = RelayChannel::connect(&server.uri()).await.expect("channel");
    assert_eq!(channel.url(), format!("{}/chan42", server.uri()));

    let events = channel.wait_for_count(2, Duration::from_secs(3)).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["@type"], "StateChange");
    assert_eq!(events[1], json!({"@type": "Ping"}));

    let hit = channel
        .wait_for_match(|e| e["changed"]["A1"]["Email"] == "s2", Duration::from_secs(1))
        .await;
    assert!(hit.is_some());

    channel.clear();
    assert!(channel.events().is_empty());
    channel.close();
    channel.close();
    assert!(channel.is_closed());
}

#[tokio::test]
async fn relay_without_location_uses_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string("event: ready\ndata: {}\n\n"),
        )
        .mount(&server)
        .await;
    let channel = RelayChannel::connect_with(&server.uri(), Duration::from_millis(500))
        .await
        .expect("channel");
    assert_eq!(channel.url(), format!("{}/new", server.uri()));
}

#[tokio::test]
async fn relay_error_status_gives_no_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    assert!(RelayChannel::connect(&server.uri()).await.is_none());
}

#[tokio::test]
async fn unreachable_relay_gives_no_channel() {
    assert!(RelayChannel::connect("http://127.0.0.1:1").await.is_none());
}

// ── Held-open stream over a raw socket ──────────────────────────────

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => return,
            Ok(_) => head.push(byte[0]),
        }
    }
}

fn chunk(data: &str) -> String {
    format!("{:x}\r\n{data}\r\n", data.len())
}

#[tokio::test]
async fn close_hangs_up_a_stream_the_relay_keeps_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (hangup_tx, hangup_rx) = oneshot::channel::<bool>();

    tokio::spawn(async move {
        let (mut alloc, _) = listener.accept().await.unwrap();
        read_request_head(&mut alloc).await;
        alloc
            .write_all(b"HTTP/1.1 302 Found\r\nLocation: /chan7\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        drop(alloc);

        let (mut stream, _) = listener.accept().await.unwrap();
        read_request_head(&mut stream).await;
        let frames = [
            "event: ready\ndata: {}\n\n",
            "data: {\"body\": {\"@type\": \"StateChange\", \"changed\": {\"A1\": {\"Mailbox\": \"s9\"}}}}\n\n",
        ];
        let mut reply =
            String::from("HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n");
        reply.push_str(&chunk(frames[0]));
        stream.write_all(reply.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(chunk(frames[1]).as_bytes()).await.unwrap();

        // No terminating chunk: the response stays open until the client leaves.
        let mut buf = [0u8; 64];
        let hung_up = loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break true,
                Ok(_) => continue,
            }
        };
        let _ = hangup_tx.send(hung_up);
    });

    let channel = RelayChannel::connect_with(&base, Duration::from_secs(3))
        .await
        .expect("channel");
    assert_eq!(channel.url(), format!("{base}/chan7"));

    let event = channel
        .wait_for_match(|e| e["changed"]["A1"]["Mailbox"] == "s9", Duration::from_secs(3))
        .await
        .expect("state change delivered while the stream is open");
    assert_eq!(event["@type"], "StateChange");

    channel.close();
    let saw_eof = tokio::time::timeout(Duration::from_secs(5), hangup_rx)
        .await
        .expect("relay saw the connection end")
        .unwrap();
    assert!(saw_eof);
    assert!(channel.is_closed());
}
