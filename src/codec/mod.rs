//! Codec module - wire text to [`Envelope`](crate::protocol::Envelope) and back.
//!
//! - [`JsonCodec`] - one JSON object per message, validated on decode
//!
//! Codecs are marker structs with static methods.
//!
//! # Example
//!
//! ```
//! use entsync_client::codec::JsonCodec;
//! use entsync_client::protocol::{CommandKind, Envelope};
//!
//! let env = JsonCodec::decode(r#"{"command":"CREATE","type":"user","id":"u1"}"#).unwrap();
//! assert_eq!(env.command(), &CommandKind::Create);
//! assert_eq!(env.entity_type(), "user");
//!
//! let text = JsonCodec::encode(&Envelope::delete("user", "u1")).unwrap();
//! assert_eq!(text, r#"{"command":"DELETE","type":"user","id":"u1"}"#);
//! ```

mod json;

pub use json::JsonCodec;
