//! # entsync-client
//!
//! Real-time entity-synchronization client.
//!
//! The client keeps one persistent WebSocket connection to a server, receives
//! CREATE / UPDATE / DELETE notifications about typed entities, and routes
//! each one by `(command, type)` to a registered handler.
//!
//! ## Architecture
//!
//! - **Codec**: one JSON object per message, validated into an [`Envelope`](protocol::Envelope)
//! - **Dispatch table**: exact `(command, type)` match, then a per-command fallback
//! - **Connection state machine**: `DISCONNECTED → CONNECTING → OPEN → CLOSING/CLOSED → DISCONNECTED`,
//!   never reconnects on its own
//! - **Sync client**: wires the three together
//!
//! Inbound messages are dispatched one at a time, in receipt order, on the
//! connection's session task. Handlers must not block.
//!
//! ## Example
//!
//! ```ignore
//! use entsync_client::protocol::{CommandKind, Envelope};
//! use entsync_client::{ConnectionState, SyncClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SyncClient::builder()
//!         .on_event(CommandKind::Create, "user", |env: &Envelope| {
//!             println!("new user {:?}", env.id());
//!             Ok(())
//!         })
//!         .build();
//!
//!     client.connect("ws://localhost:8080/app/ws/", "structr")?;
//!     client.wait_for(ConnectionState::Open).await?;
//!     client.wait_for(ConnectionState::Disconnected).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod client;
mod writer;

pub use client::{ErrorReporter, SyncClient, SyncClientBuilder};
pub use config::ClientConfig;
pub use connection::{ConnectionState, LifecycleEvent};
pub use error::SyncError;
pub use handler::DispatchOutcome;
