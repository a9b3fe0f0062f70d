//! Client builder and composition root.
//!
//! The [`SyncClientBuilder`] provides a fluent API for registering handlers,
//! listeners and configuration. The [`SyncClient`] wires the pieces:
//! 1. Connection state machine owns the transport
//! 2. Each inbound text is decoded by [`JsonCodec`]
//! 3. The envelope is routed through the [`DispatchTable`]
//! 4. Message-level failures go to the error reporter
//!
//! # Example
//!
//! ```ignore
//! use entsync_client::protocol::{CommandKind, Envelope, TypeKey};
//! use entsync_client::{ConnectionState, SyncClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SyncClient::builder()
//!         .on_event(CommandKind::Create, "user", |env: &Envelope| {
//!             println!("user {:?} joined {:?}", env.id(), env.field_str("groupId"));
//!             Ok(())
//!         })
//!         .on_event(CommandKind::Delete, TypeKey::Any, |env: &Envelope| {
//!             println!("removed {:?}", env.id());
//!             Ok(())
//!         })
//!         .on_state_change(|event| println!("{} -> {}", event.previous, event.state))
//!         .build();
//!
//!     client.connect("ws://localhost:8080/app/ws/", "structr")?;
//!     client.wait_for(ConnectionState::Open).await?;
//!     client.send(&Envelope::create("group").with_field("name", "admins")).await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use crate::codec::JsonCodec;
use crate::config::ClientConfig;
use crate::connection::{
    ConnectionState, ConnectionStateMachine, InboundHandler, LifecycleEvent, StateListener,
};
use crate::error::{Result, SyncError};
use crate::handler::{invoke, DispatchOutcome, DispatchTable, EventHandler, HandlerResult};
use crate::protocol::{CommandKind, DispatchKey, Envelope, TypeKey};
use crate::transport::{Connector, Endpoint};

/// Receiver of message-level failures from the session loop.
///
/// Gets parse, schema, handler and unhandled reports; connection-level
/// failures arrive as `Closed` lifecycle events instead.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, error: &SyncError);
}

impl<F> ErrorReporter for F
where
    F: Fn(&SyncError) + Send + Sync + 'static,
{
    fn report(&self, error: &SyncError) {
        (self)(error)
    }
}

/// Default reporter: log and carry on.
struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &SyncError) {
        tracing::warn!("Message error: {}", error);
    }
}

/// Codec + dispatch table, shared with the session task.
struct Router {
    table: RwLock<DispatchTable>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Router {
    fn handle_text(&self, text: &str) -> Result<DispatchOutcome> {
        let envelope = JsonCodec::decode(text)?;
        self.dispatch(envelope)
    }

    fn dispatch(&self, envelope: Envelope) -> Result<DispatchOutcome> {
        // Lock released before the handler runs so it may register handlers.
        let resolved = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(envelope.command(), envelope.entity_type());

        match resolved {
            Some((route, handler)) => invoke(route, handler.as_ref(), envelope),
            None => {
                if envelope.command().is_unknown() {
                    tracing::debug!("Unknown command: {}", envelope.command());
                }
                self.reporter.report(&SyncError::Unhandled {
                    command: envelope.command().to_string(),
                    entity_type: envelope.entity_type().to_string(),
                });
                Ok(DispatchOutcome::Unhandled)
            }
        }
    }
}

impl InboundHandler for Router {
    fn on_text(&self, text: String) {
        if let Err(e) = self.handle_text(&text) {
            self.reporter.report(&e);
        }
    }
}

/// Builder for configuring and creating a [`SyncClient`].
pub struct SyncClientBuilder {
    table: DispatchTable,
    listeners: Vec<Arc<dyn StateListener>>,
    reporter: Arc<dyn ErrorReporter>,
    connector: Option<Arc<dyn Connector>>,
    config: ClientConfig,
}

impl SyncClientBuilder {
    /// Create a new builder with the default transport.
    pub fn new() -> Self {
        Self {
            table: DispatchTable::new(),
            listeners: Vec::new(),
            reporter: Arc::new(LogReporter),
            connector: default_connector(),
            config: ClientConfig::default(),
        }
    }

    /// Register a handler for `(command, entity_type)`.
    ///
    /// Use [`TypeKey::Any`] for the per-command fallback.
    pub fn on_event<F>(mut self, command: CommandKind, entity_type: impl Into<TypeKey>, handler: F) -> Self
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.table.register(command, entity_type, handler);
        self
    }

    /// Register a lifecycle listener.
    pub fn on_state_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Replace the error reporter (default logs with `tracing::warn!`).
    pub fn on_error<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Use a specific transport connector.
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Build without any transport; `connect` will fail with
    /// [`SyncError::TransportUnavailable`].
    pub fn without_transport(mut self) -> Self {
        self.connector = None;
        self
    }

    /// Set the open timeout.
    ///
    /// Default: 10 seconds
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    /// Set how long a local close waits for the close frame to flush.
    ///
    /// Default: 5 seconds
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set the outbound channel capacity.
    ///
    /// Default: 256
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the client. Nothing connects until [`SyncClient::connect`].
    pub fn build(self) -> SyncClient {
        let router = Arc::new(Router {
            table: RwLock::new(self.table),
            reporter: self.reporter,
        });

        let machine = ConnectionStateMachine::new(self.connector, router.clone(), self.config);
        for listener in self.listeners {
            machine.add_listener(listener);
        }

        SyncClient { router, machine }
    }
}

impl Default for SyncClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "websocket")]
fn default_connector() -> Option<Arc<dyn Connector>> {
    Some(Arc::new(crate::transport::WebSocketConnector))
}

#[cfg(not(feature = "websocket"))]
fn default_connector() -> Option<Arc<dyn Connector>> {
    None
}

/// A sync client: one connection, one dispatch table.
///
/// Instances share nothing; any number can run side by side. Dropping a
/// client shuts its connection down: an open one sends a close frame, a
/// pending connect is abandoned, and no handler runs afterwards.
pub struct SyncClient {
    router: Arc<Router>,
    machine: ConnectionStateMachine,
}

impl SyncClient {
    /// Create a new client builder.
    pub fn builder() -> SyncClientBuilder {
        SyncClientBuilder::new()
    }

    /// Start connecting to `url`, negotiating sub-protocol `protocol`.
    ///
    /// Returns once connecting has started; watch the state for the outcome.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidUrl`] / [`SyncError::InvalidProtocol`] for a bad
    /// endpoint, plus everything [`ConnectionStateMachine::connect`] returns.
    pub fn connect(&self, url: &str, protocol: &str) -> Result<()> {
        let endpoint = Endpoint::parse(url, protocol)?;
        self.machine.connect(endpoint)
    }

    /// Start connecting to an already validated endpoint.
    pub fn connect_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        self.machine.connect(endpoint)
    }

    /// Register a handler for `(command, entity_type)`, replacing any previous one.
    pub fn on_event<F>(
        &self,
        command: CommandKind,
        entity_type: impl Into<TypeKey>,
        handler: F,
    ) -> Option<Arc<dyn EventHandler>>
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.router
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(command, entity_type, handler)
    }

    /// Remove the handler registered under exactly `key`.
    pub fn remove_handler(&self, key: &DispatchKey) -> Option<Arc<dyn EventHandler>> {
        self.router
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister(key)
    }

    /// Register a lifecycle listener.
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.machine.add_listener(Arc::new(listener));
    }

    /// Encode and send an envelope.
    ///
    /// # Errors
    ///
    /// [`SyncError::Schema`] if the envelope cannot be encoded;
    /// [`SyncError::NotConnected`] unless open.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let text = JsonCodec::encode(envelope)?;
        self.machine.send(text).await
    }

    /// Encode and send without waiting; usable from inside handlers.
    pub fn try_send(&self, envelope: &Envelope) -> Result<()> {
        let text = JsonCodec::encode(envelope)?;
        self.machine.try_send(text)
    }

    /// Send raw text as-is.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.machine.send(text.into()).await
    }

    /// Decode one message and dispatch it.
    ///
    /// Errors come back to the caller rather than the reporter; an
    /// unhandled message is still reported.
    pub fn handle_text(&self, text: &str) -> Result<DispatchOutcome> {
        self.router.handle_text(text)
    }

    /// Dispatch an already decoded envelope.
    pub fn dispatch(&self, envelope: Envelope) -> Result<DispatchOutcome> {
        self.router.dispatch(envelope)
    }

    /// Begin a local close.
    pub fn close(&self) -> Result<()> {
        self.machine.close()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Receiver tracking the connection state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.machine.subscribe()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        self.machine.wait_for(target).await
    }

    /// Endpoint of the most recent connect.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.machine.endpoint()
    }

    /// Outbound frames not yet written to the transport.
    pub fn pending_frames(&self) -> usize {
        self.machine.pending_frames()
    }
}

impl Default for SyncClient {
    fn default() -> Self {
        SyncClientBuilder::new().build()
    }
}
