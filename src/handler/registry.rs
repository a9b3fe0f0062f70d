//! Dispatch table mapping `(command, type)` to handlers.
//!
//! Resolution order for an envelope:
//! 1. exact `(command, type)` registration
//! 2. `(command, Any)` fallback
//! 3. nothing - the envelope is reported as unhandled
//!
//! # Example
//!
//! ```
//! use entsync_client::handler::{DispatchOutcome, DispatchTable, Route};
//! use entsync_client::protocol::{CommandKind, Envelope, TypeKey};
//!
//! let mut table = DispatchTable::new();
//! table.register(CommandKind::Create, "user", |env: &Envelope| {
//!     assert_eq!(env.entity_type(), "user");
//!     Ok(())
//! });
//! table.register(CommandKind::Create, TypeKey::Any, |_env: &Envelope| Ok(()));
//!
//! let outcome = table.dispatch(Envelope::create("user")).unwrap();
//! assert_eq!(outcome, DispatchOutcome::Handled(Route::Exact));
//!
//! let outcome = table.dispatch(Envelope::create("group")).unwrap();
//! assert_eq!(outcome, DispatchOutcome::Handled(Route::Fallback));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{HandlerError, Result, SyncError};
use crate::protocol::{CommandKind, DispatchKey, Envelope, TypeKey};

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Capability invoked for a dispatched envelope.
///
/// Handlers run synchronously on the session task; a slow handler delays
/// every later message on the same connection.
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one envelope.
    fn handle(&self, envelope: &Envelope) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, envelope: &Envelope) -> HandlerResult {
        (self)(envelope)
    }
}

/// How a handler was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Exact `(command, type)` registration.
    Exact,
    /// `(command, Any)` fallback.
    Fallback,
}

/// Result of dispatching one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran and returned `Ok`.
    Handled(Route),
    /// No handler matched. Not an error.
    Unhandled,
}

impl DispatchOutcome {
    #[inline]
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled(_))
    }
}

/// Registry mapping dispatch keys to handlers.
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<DispatchKey, Arc<dyn EventHandler>>,
}

impl DispatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler function for `(command, entity_type)`.
    ///
    /// Re-registering a key replaces the previous handler, which is returned.
    pub fn register<F>(
        &mut self,
        command: CommandKind,
        entity_type: impl Into<TypeKey>,
        handler: F,
    ) -> Option<Arc<dyn EventHandler>>
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(command, entity_type, handler)
    }

    /// Register any [`EventHandler`] implementation for `(command, entity_type)`.
    pub fn register_handler<H>(
        &mut self,
        command: CommandKind,
        entity_type: impl Into<TypeKey>,
        handler: H,
    ) -> Option<Arc<dyn EventHandler>>
    where
        H: EventHandler,
    {
        self.register_arc(DispatchKey::new(command, entity_type), Arc::new(handler))
    }

    /// Register an already shared handler under `key`.
    pub fn register_arc(
        &mut self,
        key: DispatchKey,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        tracing::debug!("Registering handler for {}", key);
        self.handlers.insert(key, handler)
    }

    /// Remove the handler registered under `key`.
    pub fn unregister(&mut self, key: &DispatchKey) -> Option<Arc<dyn EventHandler>> {
        self.handlers.remove(key)
    }

    /// Whether a handler is registered under exactly `key`.
    pub fn contains(&self, key: &DispatchKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve the handler for `(command, entity_type)` without invoking it.
    ///
    /// Type comparison is byte-exact.
    pub fn resolve(
        &self,
        command: &CommandKind,
        entity_type: &str,
    ) -> Option<(Route, Arc<dyn EventHandler>)> {
        let exact = DispatchKey::new(command.clone(), entity_type);
        if let Some(handler) = self.handlers.get(&exact) {
            return Some((Route::Exact, handler.clone()));
        }

        let fallback = DispatchKey::fallback(command.clone());
        self.handlers
            .get(&fallback)
            .map(|handler| (Route::Fallback, handler.clone()))
    }

    /// Dispatch an envelope to its handler.
    ///
    /// Consumes the envelope so it cannot be dispatched twice. Handler
    /// errors are returned as [`SyncError::Handler`]; a missing handler
    /// yields [`DispatchOutcome::Unhandled`].
    pub fn dispatch(&self, envelope: Envelope) -> Result<DispatchOutcome> {
        match self.resolve(envelope.command(), envelope.entity_type()) {
            Some((route, handler)) => invoke(route, handler.as_ref(), envelope),
            None => Ok(DispatchOutcome::Unhandled),
        }
    }
}

/// Invoke a resolved handler, tagging any error with the envelope's key.
pub(crate) fn invoke(
    route: Route,
    handler: &dyn EventHandler,
    envelope: Envelope,
) -> Result<DispatchOutcome> {
    match handler.handle(&envelope) {
        Ok(()) => Ok(DispatchOutcome::Handled(route)),
        Err(source) => Err(SyncError::Handler {
            command: envelope.command().to_string(),
            entity_type: envelope.entity_type().to_string(),
            source,
        }),
    }
}
