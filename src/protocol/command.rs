//! Command kinds and dispatch keys.

use std::fmt;

/// The operation a message represents.
///
/// Wire values map case-sensitively. Anything that is not exactly
/// `CREATE`, `UPDATE` or `DELETE` becomes [`CommandKind::Unknown`] carrying
/// the raw value, so a future server command never fails decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// An entity was created.
    Create,
    /// An entity was updated.
    Update,
    /// An entity was deleted.
    Delete,
    /// Unrecognized command, raw wire value preserved.
    Unknown(String),
}

impl CommandKind {
    /// Parse a wire value. Never fails.
    pub fn parse(value: &str) -> Self {
        match value {
            "CREATE" => CommandKind::Create,
            "UPDATE" => CommandKind::Update,
            "DELETE" => CommandKind::Delete,
            other => CommandKind::Unknown(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::Create => "CREATE",
            CommandKind::Update => "UPDATE",
            CommandKind::Delete => "DELETE",
            CommandKind::Unknown(raw) => raw,
        }
    }

    /// UPDATE and DELETE address an existing entity and must carry an id.
    #[inline]
    pub fn requires_id(&self) -> bool {
        matches!(self, CommandKind::Update | CommandKind::Delete)
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, CommandKind::Unknown(_))
    }
}

impl From<&str> for CommandKind {
    fn from(value: &str) -> Self {
        CommandKind::parse(value)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity-type half of a dispatch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Matches exactly this type string (byte-for-byte, case-sensitive).
    Exact(String),
    /// Fallback for any type without an exact registration.
    Any,
}

impl TypeKey {
    /// Fallback key matching any entity type.
    pub const fn any() -> Self {
        TypeKey::Any
    }

    /// Key matching exactly `entity_type`.
    pub fn exact(entity_type: impl Into<String>) -> Self {
        TypeKey::Exact(entity_type.into())
    }
}

impl From<&str> for TypeKey {
    fn from(value: &str) -> Self {
        TypeKey::Exact(value.to_string())
    }
}

impl From<String> for TypeKey {
    fn from(value: String) -> Self {
        TypeKey::Exact(value)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKey::Exact(name) => f.write_str(name),
            TypeKey::Any => f.write_str("*"),
        }
    }
}

/// Lookup key of the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub command: CommandKind,
    pub entity_type: TypeKey,
}

impl DispatchKey {
    pub fn new(command: CommandKind, entity_type: impl Into<TypeKey>) -> Self {
        Self {
            command,
            entity_type: entity_type.into(),
        }
    }

    /// The `(command, Any)` fallback key for `command`.
    pub fn fallback(command: CommandKind) -> Self {
        Self {
            command,
            entity_type: TypeKey::Any,
        }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.command, self.entity_type)
    }
}
