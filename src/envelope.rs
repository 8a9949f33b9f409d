//! The framed JSON envelope codec.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::collaborators::{Metadata, Value};

/// One inbound frame. `message` is decoded lazily: its shape depends on `kind`, which the
/// dispatcher inspects before deciding how (or whether) to parse it.
#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    /// The client-chosen operation id.
    pub id: String,

    /// The control verb (`subscribe`, `unsubscribe`, `mutate`, `echo`, `url`, or anything else).
    #[serde(rename = "type")]
    pub kind: String,

    /// The raw, not-yet-decoded payload. Absent for verbs that carry none.
    #[serde(default)]
    pub message: Option<Box<RawValue>>,
}

/// The `{query, variables}` shape carried by `subscribe` and `mutate` messages.
#[derive(Debug, Deserialize)]
pub struct OperationMessage {
    /// The raw query or mutation document text.
    pub query: String,
    /// The variables to execute it with. Accepts a missing field or an explicit `null` the same
    /// way (both become an empty map).
    #[serde(default, deserialize_with = "crate::util::default_for_null")]
    pub variables: crate::collaborators::Variables,
}

/// The recognized outbound verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    /// A subscription's result changed.
    Update,
    /// A mutation completed.
    Result,
    /// An operation failed.
    Error,
    /// Liveness reply.
    Echo,
}

/// One outbound frame.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    /// The operation id this frame is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The outbound verb.
    #[serde(rename = "type")]
    pub kind: OutboundKind,

    /// The payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,

    /// Middleware-contributed metadata, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl OutboundEnvelope {
    /// A subscription delta (or, on the initial run, the full value).
    pub fn update(id: String, diff: Value, metadata: Metadata) -> Self {
        Self {
            id: Some(id),
            kind: OutboundKind::Update,
            message: Some(diff),
            metadata: Some(metadata),
        }
    }

    /// A completed mutation's result.
    pub fn result(id: String, diff: Value, metadata: Metadata) -> Self {
        Self {
            id: Some(id),
            kind: OutboundKind::Result,
            message: Some(diff),
            metadata: Some(metadata),
        }
    }

    /// A sanitized error for a specific operation id.
    pub fn error(id: String, message: String) -> Self {
        Self {
            id: Some(id),
            kind: OutboundKind::Error,
            message: Some(Value::String(message)),
            metadata: None,
        }
    }

    /// A sanitized error not tied to any particular operation (e.g. a malformed envelope whose
    /// id couldn't be trusted).
    pub fn error_untargeted(message: String) -> Self {
        Self {
            id: None,
            kind: OutboundKind::Error,
            message: Some(Value::String(message)),
            metadata: None,
        }
    }

    /// The reply to an `echo` message.
    pub fn echo(id: String) -> Self {
        Self {
            id: Some(id),
            kind: OutboundKind::Echo,
            message: None,
            metadata: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_subscribe_envelope() {
        let raw = r#"{"id":"a","type":"subscribe","message":{"query":"{x}","variables":{}}}"#;
        let envelope: InboundEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.id, "a");
        assert_eq!(envelope.kind, "subscribe");

        let op: OperationMessage =
            serde_json::from_str(envelope.message.unwrap().get()).unwrap();
        assert_eq!(op.query, "{x}");
    }

    #[test]
    fn decodes_envelope_with_no_message() {
        let raw = r#"{"id":"a","type":"unsubscribe"}"#;
        let envelope: InboundEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.message.is_none());
    }

    #[test]
    fn serializes_error_envelope() {
        let envelope = OutboundEnvelope::error("a".into(), "duplicate subscription".into());
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(
            json,
            r#"{"id":"a","type":"error","message":"duplicate subscription"}"#
        );
    }

    #[test]
    fn serializes_echo_envelope() {
        let envelope = OutboundEnvelope::echo("q".into());
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"{"id":"q","type":"echo"}"#);
    }

    #[test]
    fn null_variables_decode_as_empty_map() {
        let raw = r#"{"query":"{x}","variables":null}"#;
        let op: OperationMessage = serde_json::from_str(raw).unwrap();
        assert!(op.variables.is_empty());
    }
}
