//! End-to-end tests against a local tungstenite server.

#![cfg(feature = "websocket")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use entsync_client::protocol::{CommandKind, Envelope, TypeKey};
use entsync_client::{ConnectionState, LifecycleEvent, SyncClient};

/// Server that echoes the requested sub-protocol, pushes `push` to the
/// client, forwards the first text it receives, then closes with "bye".
async fn spawn_server(
    push: &'static str,
) -> (String, oneshot::Receiver<(Option<String>, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();

        let requested = Arc::new(Mutex::new(None));
        let r = requested.clone();
        let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            if let Some(value) = req.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                *r.lock().unwrap() = value.to_str().ok().map(str::to_string);
                resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value.clone());
            }
            Ok(resp)
        };

        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        ws.send(Message::Text(push.to_string())).await.unwrap();

        let received = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        };

        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

        let protocol = requested.lock().unwrap().take();
        let _ = done_tx.send((protocol, received));
    });

    (format!("ws://{}/app/ws/", addr), done_rx)
}

#[tokio::test]
async fn test_websocket_round_trip() {
    let (url, done) =
        spawn_server(r#"{"command":"CREATE","type":"user","id":"u1","groupId":"g1"}"#).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let events: Arc<Mutex<Vec<LifecycleEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let (s, e) = (seen.clone(), events.clone());

    let client = SyncClient::builder()
        .on_event(CommandKind::Create, "user", move |env: &Envelope| {
            s.lock().unwrap().push(env.clone());
            Ok(())
        })
        .on_state_change(move |event| e.lock().unwrap().push(event.clone()))
        .build();

    client.connect(&url, "structr").unwrap();
    tokio::time::timeout(Duration::from_secs(5), client.wait_for(ConnectionState::Open))
        .await
        .unwrap()
        .unwrap();

    // Reply once the push has been handled.
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    client
        .send(&Envelope::delete("user", "u1"))
        .await
        .unwrap();

    let (protocol, received) = tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(protocol.as_deref(), Some("structr"));
    assert_eq!(received, r#"{"command":"DELETE","type":"user","id":"u1"}"#);

    tokio::time::timeout(
        Duration::from_secs(5),
        client.wait_for(ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Envelope::create("user").with_id("u1").with_field("groupId", "g1")]
    );

    let events = events.lock().unwrap();
    let closed = events
        .iter()
        .find(|e| e.state == ConnectionState::Closed)
        .unwrap();
    assert_eq!(closed.reason.as_deref(), Some("bye"));
    assert_eq!(events.last().unwrap().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_websocket_unhandled_and_fallback() {
    let (url, done) = spawn_server(r#"{"command":"DELETE","type":"User","id":"u1"}"#).await;

    let unhandled = Arc::new(Mutex::new(Vec::new()));
    let u = unhandled.clone();
    let client = SyncClient::builder()
        .on_event(CommandKind::Delete, "user", |_: &Envelope| Ok(()))
        .on_event(CommandKind::Create, TypeKey::Any, |_: &Envelope| Ok(()))
        .on_error(move |e| u.lock().unwrap().push(e.to_string()))
        .build();

    client.connect(&url, "structr").unwrap();
    client.wait_for(ConnectionState::Open).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while unhandled.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    client.send_text("ack").await.unwrap();

    let (_, received) = done.await.unwrap();
    assert_eq!(received, "ack");
    assert_eq!(
        *unhandled.lock().unwrap(),
        vec!["Unhandled message: command=DELETE, type=User".to_string()]
    );
}

#[tokio::test]
async fn test_websocket_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let events: Arc<Mutex<Vec<LifecycleEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let client = SyncClient::builder()
        .on_state_change(move |event| e.lock().unwrap().push(event.clone()))
        .build();

    client
        .connect(&format!("ws://{}/ws", addr), "structr")
        .unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        client.wait_for(ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    let states: Vec<_> = events.lock().unwrap().iter().map(|e| e.state).collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Closed,
            ConnectionState::Disconnected,
        ]
    );
}
