//! The decoded message envelope.

use serde_json::{Map, Value};

use super::{CommandKind, DispatchKey};

/// One decoded protocol message.
///
/// `command` and `entity_type` drive dispatch; `id` addresses an existing
/// entity; every other wire field lives in `fields` in wire order and is
/// opaque to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    command: CommandKind,
    entity_type: String,
    id: Option<String>,
    fields: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope with no id and no payload fields.
    pub fn new(command: CommandKind, entity_type: impl Into<String>) -> Self {
        Self {
            command,
            entity_type: entity_type.into(),
            id: None,
            fields: Map::new(),
        }
    }

    pub fn create(entity_type: impl Into<String>) -> Self {
        Self::new(CommandKind::Create, entity_type)
    }

    pub fn update(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(CommandKind::Update, entity_type).with_id(id)
    }

    pub fn delete(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(CommandKind::Delete, entity_type).with_id(id)
    }

    pub(crate) fn from_parts(
        command: CommandKind,
        entity_type: String,
        id: Option<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            command,
            entity_type,
            id,
            fields,
        }
    }

    /// Set the entity id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a payload field. Later values for the same name replace earlier ones.
    ///
    /// Reserved names (`command`, `type`, `id`) are rejected by the encoder.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[inline]
    pub fn command(&self) -> &CommandKind {
        &self.command
    }

    #[inline]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Look up one payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// String value of a payload field, if present and a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// All payload fields in wire order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The exact `(command, type)` key for this envelope.
    pub fn dispatch_key(&self) -> DispatchKey {
        DispatchKey::new(self.command.clone(), self.entity_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_accessors() {
        let env = Envelope::create("user")
            .with_id("u1")
            .with_field("groupId", "g1")
            .with_field("age", 42);

        assert_eq!(env.command(), &CommandKind::Create);
        assert_eq!(env.entity_type(), "user");
        assert_eq!(env.id(), Some("u1"));
        assert_eq!(env.field_str("groupId"), Some("g1"));
        assert_eq!(env.field("age"), Some(&json!(42)));
        assert!(env.field("missing").is_none());
    }

    #[test]
    fn test_fields_keep_insertion_order() {
        let env = Envelope::create("group")
            .with_field("z", 1)
            .with_field("a", 2)
            .with_field("m", 3);

        let names: Vec<&str> = env.fields().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_delete_constructor_sets_id() {
        let env = Envelope::delete("user", "u9");
        assert_eq!(env.command(), &CommandKind::Delete);
        assert_eq!(env.id(), Some("u9"));
        assert!(env.fields().is_empty());
    }

    #[test]
    fn test_dispatch_key_is_exact() {
        let env = Envelope::delete("User", "u1");
        assert_eq!(
            env.dispatch_key(),
            DispatchKey::new(CommandKind::Delete, "User")
        );
    }
}
