//! JSON codec using `serde_json`.
//!
//! Decoding is two-staged: the text must first parse as JSON
//! ([`SyncError::Parse`]), then the value must be an object with string
//! `command` and `type` fields ([`SyncError::Schema`]). Unknown fields are
//! kept in wire order (`serde_json` is built with `preserve_order`).

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::protocol::{is_reserved_field, CommandKind, Envelope, FIELD_COMMAND, FIELD_ID, FIELD_TYPE};

/// Borrowed wire view of an envelope, used for encoding without copying fields.
#[derive(Serialize)]
struct WireEnvelope<'a> {
    command: &'a str,
    #[serde(rename = "type")]
    entity_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(flatten)]
    fields: &'a Map<String, Value>,
}

/// JSON codec for protocol envelopes.
pub struct JsonCodec;

impl JsonCodec {
    /// Decode one wire message.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Parse`] if `text` is not well-formed JSON.
    /// - [`SyncError::Schema`] if it is not an object, if `command` or `type`
    ///   is missing or not a string, if `type` is empty, if `id` is not a
    ///   string, or if an UPDATE/DELETE carries no `id`.
    pub fn decode(text: &str) -> Result<Envelope> {
        let value: Value = serde_json::from_str(text)?;

        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(SyncError::Schema(format!(
                    "message must be a JSON object, got {}",
                    kind_of(&other)
                )))
            }
        };

        let mut command = None;
        let mut entity_type = None;
        let mut id = None;
        let mut fields = Map::new();

        // Rebuild rather than remove so the remaining fields keep wire order.
        for (name, value) in object {
            match name.as_str() {
                FIELD_COMMAND => command = Some(require_string(FIELD_COMMAND, value)?),
                FIELD_TYPE => entity_type = Some(require_string(FIELD_TYPE, value)?),
                FIELD_ID => id = Some(require_string(FIELD_ID, value)?),
                _ => {
                    fields.insert(name, value);
                }
            }
        }

        let command = command
            .map(|raw| CommandKind::parse(&raw))
            .ok_or_else(|| missing(FIELD_COMMAND))?;
        let entity_type = entity_type.ok_or_else(|| missing(FIELD_TYPE))?;

        if entity_type.is_empty() {
            return Err(SyncError::Schema("`type` must not be empty".to_string()));
        }
        if command.requires_id() && id.is_none() {
            return Err(SyncError::Schema(format!("{} requires an `id`", command)));
        }

        Ok(Envelope::from_parts(command, entity_type, id, fields))
    }

    /// Encode an envelope to wire text.
    ///
    /// Field order is `command`, `type`, `id`, then payload fields in
    /// insertion order. Only envelopes that [`decode`](Self::decode) would
    /// reproduce exactly are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Schema`] if the envelope has an empty type, a
    /// payload field named `command`/`type`/`id`, an UPDATE/DELETE without
    /// id, or an `Unknown` command whose raw value is a known command.
    pub fn encode(envelope: &Envelope) -> Result<String> {
        Self::validate(envelope)?;

        let wire = WireEnvelope {
            command: envelope.command().as_str(),
            entity_type: envelope.entity_type(),
            id: envelope.id(),
            fields: envelope.fields(),
        };

        serde_json::to_string(&wire)
            .map_err(|e| SyncError::Schema(format!("cannot encode envelope: {}", e)))
    }

    fn validate(envelope: &Envelope) -> Result<()> {
        if envelope.entity_type().is_empty() {
            return Err(SyncError::Schema("`type` must not be empty".to_string()));
        }

        if let CommandKind::Unknown(raw) = envelope.command() {
            if !CommandKind::parse(raw).is_unknown() {
                return Err(SyncError::Schema(format!(
                    "unknown command carries known value {:?}",
                    raw
                )));
            }
        }

        if envelope.command().requires_id() && envelope.id().is_none() {
            return Err(SyncError::Schema(format!(
                "{} requires an `id`",
                envelope.command()
            )));
        }

        if let Some(name) = envelope.fields().keys().find(|k| is_reserved_field(k)) {
            return Err(SyncError::Schema(format!(
                "payload field {:?} clashes with an envelope field",
                name
            )));
        }

        Ok(())
    }
}

fn require_string(field: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(SyncError::Schema(format!(
            "`{}` must be a string, got {}",
            field,
            kind_of(&other)
        ))),
    }
}

fn missing(field: &str) -> SyncError {
    SyncError::Schema(format!("missing required field `{}`", field))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
