//! Handler module - dispatch of decoded envelopes.
//!
//! Provides:
//! - [`EventHandler`] - capability invoked with an [`Envelope`](crate::protocol::Envelope)
//! - [`DispatchTable`] - maps `(command, type)` to handlers, with per-command fallback
//!
//! # Example
//!
//! ```
//! use entsync_client::handler::DispatchTable;
//! use entsync_client::protocol::{CommandKind, Envelope, TypeKey};
//!
//! let mut table = DispatchTable::new();
//!
//! table.register(CommandKind::Create, "user", |env: &Envelope| {
//!     println!("new user {:?}", env.id());
//!     Ok(())
//! });
//!
//! // Any DELETE, whatever the type
//! table.register(CommandKind::Delete, TypeKey::Any, |env: &Envelope| {
//!     println!("remove {:?}", env.id());
//!     Ok(())
//! });
//! ```

mod registry;

pub(crate) use registry::invoke;
pub use registry::{DispatchOutcome, DispatchTable, EventHandler, HandlerResult, Route};
