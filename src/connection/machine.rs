//! Connection state machine and per-connection session task.
//!
//! `connect()` only performs `Disconnected -> Connecting` and spawns the
//! session; everything after that is observed through state transitions.
//! The session task:
//! 1. Opens the transport under the open timeout
//! 2. Spawns the writer task and moves to `Open`
//! 3. Reads inbound frames and hands each text to the [`InboundHandler`],
//!    one at a time, in receipt order
//! 4. On local close, drains frames the transport already holds, then
//!    sends a close frame
//! 5. On remote close/error, or if the task unwinds, cleans up and returns
//!    to `Disconnected`
//!
//! Dropping the [`ConnectionStateMachine`] signals shutdown; a running
//! session stops without invoking the inbound handler again.

use std::sync::{Arc, Mutex, PoisonError};

use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::state::{ConnectionState, Lifecycle, StateListener};
use crate::config::ClientConfig;
use crate::error::{Result, SyncError};
use crate::transport::{Connector, Endpoint, Inbound, InboundStream, Outbound, Transport};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Receiver of inbound text messages.
///
/// Called on the session task; the next message is not read until this
/// returns.
pub trait InboundHandler: Send + Sync + 'static {
    fn on_text(&self, text: String);
}

impl<F> InboundHandler for F
where
    F: Fn(String) + Send + Sync + 'static,
{
    fn on_text(&self, text: String) {
        (self)(text)
    }
}

/// How a session's read loop ended.
enum SessionEnd {
    /// `close()` was called.
    Local,
    /// Peer closed, stream ended, or transport failed.
    Remote(String),
    /// The owning state machine was dropped.
    Shutdown,
}

struct Shared {
    lifecycle: Lifecycle,
    connector: Option<Arc<dyn Connector>>,
    inbound: Arc<dyn InboundHandler>,
    config: ClientConfig,
    writer: Mutex<Option<WriterHandle>>,
    endpoint: Mutex<Option<Endpoint>>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn writer(&self) -> Option<WriterHandle> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_writer(&self, writer: Option<WriterHandle>) -> Option<WriterHandle> {
        std::mem::replace(
            &mut *self.writer.lock().unwrap_or_else(PoisonError::into_inner),
            writer,
        )
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Record a transition the session drives; illegal ones are logged, not fatal.
    fn advance(&self, to: ConnectionState, reason: Option<String>) {
        if let Err(e) = self.lifecycle.transition(to, reason) {
            tracing::debug!("Skipped transition: {}", e);
        }
    }
}

/// Owns one transport connection and its lifecycle.
pub struct ConnectionStateMachine {
    shared: Arc<Shared>,
}

impl ConnectionStateMachine {
    /// Create a machine in `Disconnected`.
    ///
    /// `connector` may be `None`, in which case every `connect` fails with
    /// [`SyncError::TransportUnavailable`].
    pub fn new(
        connector: Option<Arc<dyn Connector>>,
        inbound: Arc<dyn InboundHandler>,
        config: ClientConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                lifecycle: Lifecycle::new(),
                connector,
                inbound,
                config,
                writer: Mutex::new(None),
                endpoint: Mutex::new(None),
                shutdown: watch::channel(false).0,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle.current()
    }

    /// Receiver tracking the current state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.lifecycle.subscribe()
    }

    /// Register a lifecycle listener. Listeners persist across reconnects.
    pub fn add_listener(&self, listener: Arc<dyn StateListener>) {
        self.shared.lifecycle.add_listener(listener);
    }

    /// Endpoint of the most recent `connect`.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.shared
            .endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frames queued for the transport but not yet written.
    pub fn pending_frames(&self) -> usize {
        self.shared.writer().map_or(0, |w| w.pending_count())
    }

    /// Start connecting to `endpoint`. Returns without waiting for the transport.
    ///
    /// # Errors
    ///
    /// - [`SyncError::TransportUnavailable`] if no connector is configured or
    ///   no Tokio runtime is running.
    /// - [`SyncError::InvalidTransition`] if not `Disconnected`.
    pub fn connect(&self, endpoint: Endpoint) -> Result<()> {
        let connector = self.shared.connector.clone().ok_or_else(|| {
            SyncError::TransportUnavailable("no transport connector configured".to_string())
        })?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SyncError::TransportUnavailable("no async runtime available".to_string())
        })?;

        self.shared
            .lifecycle
            .transition(ConnectionState::Connecting, None)?;
        *self
            .shared
            .endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(endpoint.clone());

        tracing::debug!("Connecting to {}", endpoint);
        runtime.spawn(run_session(self.shared.clone(), connector, endpoint));
        Ok(())
    }

    /// Send one text message.
    ///
    /// # Errors
    ///
    /// - [`SyncError::EmptyMessage`] for empty text.
    /// - [`SyncError::NotConnected`] unless `Open`; nothing is queued.
    pub async fn send(&self, text: String) -> Result<()> {
        let writer = self.open_writer(&text)?;
        writer.send(Outbound::Text(text)).await.map_err(not_connected)
    }

    /// Send one text message without waiting for queue capacity.
    pub fn try_send(&self, text: String) -> Result<()> {
        let writer = self.open_writer(&text)?;
        writer.try_send(Outbound::Text(text)).map_err(not_connected)
    }

    /// Begin a local close: `Open -> Closing`.
    ///
    /// No inbound message read after this point is dispatched. The session
    /// sends a close frame and returns to `Disconnected`.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotConnected`] unless `Open`.
    pub fn close(&self) -> Result<()> {
        match self
            .shared
            .lifecycle
            .transition(ConnectionState::Closing, None)
        {
            Ok(_) => Ok(()),
            Err(SyncError::InvalidTransition { .. }) => Err(SyncError::NotConnected),
            Err(e) => Err(e),
        }
    }

    /// Wait until the state equals `target`.
    ///
    /// Only returns for a state that is current when checked; a transient
    /// state passed through in between may be missed.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        let mut rx = self.subscribe();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::ConnectionClosed)
    }

    fn open_writer(&self, text: &str) -> Result<WriterHandle> {
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        if self.state() != ConnectionState::Open {
            return Err(SyncError::NotConnected);
        }
        self.shared.writer().ok_or(SyncError::NotConnected)
    }
}

impl Drop for ConnectionStateMachine {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

/// The writer only disappears when the session is ending.
fn not_connected(err: SyncError) -> SyncError {
    match err {
        SyncError::ConnectionClosed => SyncError::NotConnected,
        other => other,
    }
}

/// Resets the lifecycle if the session task ends early (handler panic,
/// runtime shutdown). Disarmed before the final transition.
struct SessionGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl SessionGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reason = if std::thread::panicking() {
            "session task panicked"
        } else {
            "session task cancelled"
        };
        tracing::error!("Connection lost: {}", reason);
        drop(self.shared.set_writer(None));
        self.shared
            .advance(ConnectionState::Closed, Some(reason.to_string()));
        self.shared.advance(ConnectionState::Disconnected, None);
    }
}

/// One connection attempt, from open to cleanup.
async fn run_session(shared: Arc<Shared>, connector: Arc<dyn Connector>, endpoint: Endpoint) {
    let mut guard = SessionGuard {
        shared: &shared,
        armed: true,
    };
    let mut shutdown = shared.shutdown.subscribe();

    let timeout = shared.config.open_timeout;
    let opened = tokio::select! {
        biased;

        _ = shutdown_requested(&mut shutdown) => {
            Err(SyncError::Transport("shut down while connecting".to_string()))
        }
        result = tokio::time::timeout(timeout, connector.connect(&endpoint)) => match result {
            Ok(result) => result,
            Err(_) => Err(SyncError::OpenTimeout(timeout)),
        },
    };
    let opened = match opened {
        Ok(transport) if shared.is_shut_down() => {
            drop(transport);
            Err(SyncError::Transport("shut down while connecting".to_string()))
        }
        other => other,
    };

    let Transport { sink, stream } = match opened {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", endpoint, e);
            shared.advance(ConnectionState::Closed, Some(e.to_string()));
            guard.disarm();
            shared.advance(ConnectionState::Disconnected, None);
            return;
        }
    };

    let (writer, writer_task) = spawn_writer_task(sink, shared.config.outbound_capacity);
    // Writer must be in place before Open is observable.
    shared.set_writer(Some(writer));
    shared.advance(ConnectionState::Open, None);

    let end = read_loop(&shared, stream, &mut shutdown).await;
    let writer = shared.set_writer(None);

    if matches!(end, SessionEnd::Shutdown) {
        tracing::debug!("Shutting down connection to {}", endpoint);
        shared.advance(ConnectionState::Closing, None);
    }

    match end {
        SessionEnd::Remote(reason) => {
            tracing::error!("Connection to {} closed: {}", endpoint, reason);
            // A concurrent close() may already have moved us to Closing.
            shared.advance(ConnectionState::Closed, Some(reason));
            drop(writer);
            writer_task.abort();
        }
        SessionEnd::Local | SessionEnd::Shutdown => {
            let queued = writer.map_or(false, |w| w.try_send(Outbound::Close).is_ok());
            if queued {
                finish_writer(writer_task, &shared.config).await;
            } else {
                writer_task.abort();
            }
        }
    }

    guard.disarm();
    shared.advance(ConnectionState::Disconnected, None);
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        // Sender lives in `Shared`; a closed channel means nobody can shut down.
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn finish_writer(task: JoinHandle<Result<()>>, config: &ClientConfig) {
    let abort = task.abort_handle();
    match tokio::time::timeout(config.close_timeout, task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::debug!("Writer ended with error: {}", e),
        Ok(Err(e)) => tracing::debug!("Writer task failed: {}", e),
        Err(_) => {
            tracing::warn!("Close frame not flushed within {:?}", config.close_timeout);
            abort.abort();
        }
    }
}

/// Read and dispatch until closed locally or remotely, or shut down.
///
/// Once `Closing` is seen, frames the transport has already received are
/// dispatched without waiting for more; nothing arriving later is.
async fn read_loop(
    shared: &Shared,
    mut stream: InboundStream,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let mut state = shared.lifecycle.subscribe();

    loop {
        if shared.is_shut_down() {
            return SessionEnd::Shutdown;
        }
        if *state.borrow_and_update() == ConnectionState::Closing {
            drain_buffered(shared, &mut stream);
            return SessionEnd::Local;
        }

        tokio::select! {
            biased;

            _ = shutdown_requested(shutdown) => return SessionEnd::Shutdown,

            changed = state.changed() => {
                if changed.is_err() {
                    return SessionEnd::Local;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Inbound::Text(text))) => {
                    tracing::debug!("Message received: {}", text);
                    shared.inbound.on_text(text);
                }
                Some(Ok(Inbound::Close(reason))) => {
                    return SessionEnd::Remote(reason.unwrap_or_else(|| "closed by peer".to_string()));
                }
                Some(Err(e)) => return SessionEnd::Remote(e.to_string()),
                None => return SessionEnd::Remote("transport stream ended".to_string()),
            },
        }
    }
}

/// Dispatch text frames that are ready right now; stops at the first
/// frame that would wait, or at close/error.
fn drain_buffered(shared: &Shared, stream: &mut InboundStream) {
    while !shared.is_shut_down() {
        match stream.next().now_or_never() {
            Some(Some(Ok(Inbound::Text(text)))) => {
                tracing::debug!("Message drained: {}", text);
                shared.inbound.on_text(text);
            }
            _ => break,
        }
    }
}
