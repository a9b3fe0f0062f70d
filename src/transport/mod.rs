//! Transport module - the persistent bidirectional text channel.
//!
//! A [`Connector`] turns an [`Endpoint`] into a [`Transport`]: a sink of
//! [`Outbound`] frames and a stream of [`Inbound`] frames. Implementations:
//!
//! - [`WebSocketConnector`] - `ws://` / `wss://` via `tokio-tungstenite` (feature `websocket`)
//! - [`MemoryConnector`] - in-process channels, paired with a [`MemoryAcceptor`]

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::stream::BoxStream;
use futures::Sink;
use url::Url;

use crate::error::{Result, SyncError};

mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use memory::{MemoryAcceptor, MemoryConnector, MemoryPeer};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

/// Boxed future returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Frames read from the transport.
pub type InboundStream = BoxStream<'static, Result<Inbound>>;

/// Frames written to the transport.
pub type OutboundSink = Pin<Box<dyn Sink<Outbound, Error = SyncError> + Send>>;

/// Frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One text message.
    Text(String),
    /// Peer closed the connection, with its reason if given.
    Close(Option<String>),
}

/// Frame sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One text message.
    Text(String),
    /// Close handshake.
    Close,
}

/// An open transport, split into its two directions.
pub struct Transport {
    pub sink: OutboundSink,
    pub stream: InboundStream,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Capability that opens transports.
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `endpoint`.
    ///
    /// Resolves once the transport is open and usable, or with the reason
    /// it could not be opened.
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, Result<Transport>>;
}

/// Where to connect: a `ws`/`wss` URL plus the sub-protocol to negotiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    protocol: String,
}

impl Endpoint {
    /// Parse and validate an endpoint.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidUrl`] if `url` does not parse or its scheme is
    ///   not `ws` or `wss`.
    /// - [`SyncError::InvalidProtocol`] if `protocol` is empty or is not a
    ///   single HTTP token.
    pub fn parse(url: &str, protocol: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", url, e)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(SyncError::InvalidUrl(format!(
                    "unsupported scheme {:?}, expected ws or wss",
                    other
                )))
            }
        }

        if protocol.is_empty() || !protocol.bytes().all(is_token_byte) {
            return Err(SyncError::InvalidProtocol(protocol.to_string()));
        }

        Ok(Self {
            url,
            protocol: protocol.to_string(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sub-protocol name, sent as `Sec-WebSocket-Protocol`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[inline]
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.protocol)
    }
}

/// RFC 7230 `tchar`.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
