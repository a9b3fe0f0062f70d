//! In-process transport over `futures` channels.
//!
//! Each successful `connect` hands a [`MemoryPeer`] to the paired
//! [`MemoryAcceptor`]; the peer plays the server side. Dropping the peer
//! ends the client's inbound stream, which the client sees as a remote close.
//!
//! # Example
//!
//! ```ignore
//! let (connector, mut acceptor) = MemoryConnector::new();
//! let client = SyncClient::builder().connector(connector).build();
//! client.connect("ws://memory/ws", "sync")?;
//!
//! let peer = acceptor.accept().await.unwrap();
//! peer.send_text(r#"{"command":"CREATE","type":"user"}"#)?;
//! ```

use futures::channel::mpsc;
use futures::future;
use futures::{SinkExt, StreamExt};

use super::{BoxFuture, Connector, Endpoint, Inbound, Outbound, Transport};
use crate::error::{Result, SyncError};

enum Mode {
    Accept(mpsc::UnboundedSender<MemoryPeer>),
    Refuse(String),
    Stall,
}

/// Connector producing in-process transports.
pub struct MemoryConnector {
    mode: Mode,
}

impl MemoryConnector {
    /// Connector whose connections are delivered to the returned acceptor.
    pub fn new() -> (Self, MemoryAcceptor) {
        let (tx, rx) = mpsc::unbounded();
        (
            Self {
                mode: Mode::Accept(tx),
            },
            MemoryAcceptor { rx },
        )
    }

    /// Connector that fails every connect with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            mode: Mode::Refuse(reason.into()),
        }
    }

    /// Connector whose connects never complete.
    pub fn stalled() -> Self {
        Self { mode: Mode::Stall }
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, Result<Transport>> {
        match &self.mode {
            Mode::Accept(acceptor) => {
                let (to_client, inbound) = mpsc::unbounded();
                let (outbound, from_client) = mpsc::unbounded();

                let peer = MemoryPeer {
                    endpoint: endpoint.clone(),
                    tx: to_client,
                    rx: from_client,
                };

                let result = acceptor
                    .unbounded_send(peer)
                    .map(|()| Transport {
                        sink: Box::pin(outbound.sink_map_err(|_| SyncError::ConnectionClosed)),
                        stream: inbound.boxed(),
                    })
                    .map_err(|_| SyncError::Transport("memory acceptor dropped".to_string()));

                Box::pin(future::ready(result))
            }
            Mode::Refuse(reason) => {
                Box::pin(future::ready(Err(SyncError::Transport(reason.clone()))))
            }
            Mode::Stall => Box::pin(future::pending()),
        }
    }
}

/// Receives the server side of each in-process connection.
pub struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAcceptor {
    /// Wait for the next connection. `None` once the connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.rx.next().await
    }
}

/// Server side of one in-process connection.
pub struct MemoryPeer {
    endpoint: Endpoint,
    tx: mpsc::UnboundedSender<Result<Inbound>>,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl MemoryPeer {
    /// Endpoint the client connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Deliver one text message to the client.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.push(Ok(Inbound::Text(text.into())))
    }

    /// Close the connection from the server side.
    pub fn close(&self, reason: Option<&str>) -> Result<()> {
        self.push(Ok(Inbound::Close(reason.map(str::to_string))))
    }

    /// Fail the connection with a transport error.
    pub fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.push(Err(SyncError::Transport(message.into())))
    }

    /// Next frame sent by the client. `None` once the client dropped its sink.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.next().await
    }

    fn push(&self, frame: Result<Inbound>) -> Result<()> {
        self.tx
            .unbounded_send(frame)
            .map_err(|_| SyncError::ConnectionClosed)
    }
}
