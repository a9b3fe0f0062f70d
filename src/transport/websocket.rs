//! WebSocket transport using `tokio-tungstenite`.
//!
//! The endpoint's sub-protocol is sent as `Sec-WebSocket-Protocol`;
//! tungstenite rejects the handshake if the server does not echo it.
//! Ping/pong is answered by tungstenite and never surfaces as a frame.

use futures::future;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};

use super::{BoxFuture, Connector, Endpoint, Inbound, Outbound, Transport};
use crate::error::{Result, SyncError};

/// Connector opening `ws://` and `wss://` connections.
///
/// `wss` needs the `tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, Result<Transport>> {
        let url = endpoint.url().to_string();
        let protocol = endpoint.protocol().to_string();

        Box::pin(async move {
            let mut request = url.as_str().into_client_request()?;
            let value = HeaderValue::from_str(&protocol)
                .map_err(|_| SyncError::InvalidProtocol(protocol.clone()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);

            let (socket, response) = connect_async(request).await?;
            tracing::debug!(
                "WebSocket open to {} (status {})",
                url,
                response.status()
            );

            let (sink, stream) = socket.split();

            let sink = sink
                .with(|frame: Outbound| future::ready(Ok::<_, tungstenite::Error>(to_message(frame))))
                .sink_map_err(SyncError::from);
            let stream = stream.filter_map(|message| future::ready(from_message(message)));

            Ok(Transport {
                sink: Box::pin(sink),
                stream: stream.boxed(),
            })
        })
    }
}

fn to_message(frame: Outbound) -> Message {
    match frame {
        Outbound::Text(text) => Message::Text(text),
        Outbound::Close => Message::Close(None),
    }
}

/// Map a tungstenite message to an inbound frame; control frames are dropped.
fn from_message(message: std::result::Result<Message, tungstenite::Error>) -> Option<Result<Inbound>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text))),
        Ok(Message::Binary(bytes)) => Some(
            String::from_utf8(bytes)
                .map(Inbound::Text)
                .map_err(|_| SyncError::Transport("binary frame is not valid UTF-8".to_string())),
        ),
        Ok(Message::Close(frame)) => {
            let reason = frame
                .map(|f| f.reason.to_string())
                .filter(|reason| !reason.is_empty());
            Some(Ok(Inbound::Close(reason)))
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn test_text_maps_to_text() {
        let frame = from_message(Ok(Message::Text("hi".to_string())));
        assert_eq!(frame.unwrap().unwrap(), Inbound::Text("hi".to_string()));
    }

    #[test]
    fn test_binary_utf8_maps_to_text() {
        let frame = from_message(Ok(Message::Binary(b"{}".to_vec())));
        assert_eq!(frame.unwrap().unwrap(), Inbound::Text("{}".to_string()));
    }

    #[test]
    fn test_binary_invalid_utf8_is_error() {
        let frame = from_message(Ok(Message::Binary(vec![0xff, 0xfe])));
        assert!(matches!(frame, Some(Err(SyncError::Transport(_)))));
    }

    #[test]
    fn test_control_frames_skipped() {
        assert!(from_message(Ok(Message::Ping(vec![1]))).is_none());
        assert!(from_message(Ok(Message::Pong(vec![1]))).is_none());
    }

    #[test]
    fn test_close_carries_reason() {
        let frame = from_message(Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "server restart".into(),
        }))));
        assert_eq!(
            frame.unwrap().unwrap(),
            Inbound::Close(Some("server restart".to_string()))
        );

        let frame = from_message(Ok(Message::Close(None)));
        assert_eq!(frame.unwrap().unwrap(), Inbound::Close(None));
    }

    #[test]
    fn test_outbound_mapping() {
        assert_eq!(
            to_message(Outbound::Text("x".to_string())),
            Message::Text("x".to_string())
        );
        assert_eq!(to_message(Outbound::Close), Message::Close(None));
    }
}
