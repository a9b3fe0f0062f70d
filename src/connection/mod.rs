//! Connection module - lifecycle state machine over one transport.
//!
//! ```text
//! DISCONNECTED ──connect()──► CONNECTING ──open──► OPEN ──close()──► CLOSING
//!                                 │                  │                  │
//!                          error/timeout     peer close/error        cleanup
//!                                 ▼                  ▼                  ▼
//!                               CLOSED ◄─────────────┘            DISCONNECTED
//!                                 │
//!                              cleanup ──► DISCONNECTED
//! ```
//!
//! There is no automatic reconnect; after `DISCONNECTED` the caller decides.

mod machine;
mod state;

pub use machine::{ConnectionStateMachine, InboundHandler};
pub use state::{ConnectionState, LifecycleEvent, StateListener};
