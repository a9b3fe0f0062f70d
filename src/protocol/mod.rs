//! Protocol module - the wire envelope and dispatch keys.
//!
//! Every wire message is one JSON object:
//!
//! ```text
//! { "command": "CREATE" | "UPDATE" | "DELETE" | <other>,
//!   "type":    <entity type, case-sensitive>,
//!   "id":      <entity id, required for UPDATE/DELETE>,
//!   ...        <entity fields, passed through untouched> }
//! ```
//!
//! - [`Envelope`] - one decoded message
//! - [`CommandKind`] - the operation, with an `Unknown` variant for forward compatibility
//! - [`TypeKey`] / [`DispatchKey`] - lookup keys for the dispatch table

mod command;
mod envelope;

pub use command::{CommandKind, DispatchKey, TypeKey};
pub use envelope::Envelope;

/// Wire field carrying the command.
pub const FIELD_COMMAND: &str = "command";

/// Wire field carrying the entity type.
pub const FIELD_TYPE: &str = "type";

/// Wire field carrying the entity id.
pub const FIELD_ID: &str = "id";

/// Field names owned by the envelope itself; never part of the payload map.
pub const RESERVED_FIELDS: [&str; 3] = [FIELD_COMMAND, FIELD_TYPE, FIELD_ID];

/// Returns true if `name` is one of the envelope's own fields.
#[inline]
pub fn is_reserved_field(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}
