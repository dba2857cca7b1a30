//! Presence data model.
//!
//! A client announces itself with a [`Descriptor`], an arbitrary key-value
//! record the relay never interprets. The relay stores it as a
//! [`PresenceEntry`]: the descriptor with the sender's [`ConnectionId`] merged
//! in under [`CONNECTION_ID_KEY`].
//!
//! Both types keep their fields in the order the client sent them. CBOR maps
//! are ordered on the wire, and a record that round-trips through the relay
//! should come back looking the way it went in.

use std::fmt;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Key under which a presence entry carries its connection ID.
pub const CONNECTION_ID_KEY: &str = "connectionId";

/// Opaque connection identifier assigned by the relay when a client connects.
///
/// Scoped to the relay's process lifetime. Clients learn their own ID from the
/// `Connected` handshake frame and peers' IDs from presence snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Application-supplied user descriptor.
///
/// An order-preserving CBOR map. Keys and values are arbitrary CBOR; the relay
/// stores and rebroadcasts them without validation. The only structural
/// requirement is that the record is a map: anything else is rejected at
/// decode time and the announce is dropped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Descriptor(Vec<(Value, Value)>);

impl Descriptor {
    /// Empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text-keyed field (builder style).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((Value::Text(key.into()), value.into()));
        self
    }

    /// First value stored under a text key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.0, key)
    }

    /// All fields in wire order.
    #[must_use]
    pub fn entries(&self) -> &[(Value, Value)] {
        &self.0
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the descriptor has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(Value, Value)>> for Descriptor {
    fn from(entries: Vec<(Value, Value)>) -> Self {
        Self(entries)
    }
}

impl TryFrom<Value> for Descriptor {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(entries) => Ok(Self(entries)),
            other => Err(ProtocolError::InvalidPresence(format!(
                "descriptor must be a map, got {}",
                value_kind(&other)
            ))),
        }
    }
}

impl From<Descriptor> for Value {
    fn from(descriptor: Descriptor) -> Self {
        Value::Map(descriptor.0)
    }
}

/// One member of the Online Set: a descriptor merged with its connection ID.
///
/// # Invariants
///
/// - The fields contain exactly one [`CONNECTION_ID_KEY`] entry, and its value
///   equals [`PresenceEntry::connection_id`].
///
/// Merging follows object-spread semantics: if the descriptor already carried
/// a `connectionId` field it is overwritten in place, otherwise the field is
/// appended after the descriptor's own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct PresenceEntry {
    connection_id: ConnectionId,
    fields: Vec<(Value, Value)>,
}

impl PresenceEntry {
    /// Merge a descriptor with the connection that announced it.
    #[must_use]
    pub fn new(connection_id: ConnectionId, descriptor: Descriptor) -> Self {
        let id_value = Value::Text(connection_id.as_str().to_string());
        let mut fields = Vec::with_capacity(descriptor.len() + 1);
        let mut merged = false;

        for (key, value) in descriptor.0 {
            if key.as_text() == Some(CONNECTION_ID_KEY) {
                if !merged {
                    fields.push((key, id_value.clone()));
                    merged = true;
                }
            } else {
                fields.push((key, value));
            }
        }

        if !merged {
            fields.push((Value::Text(CONNECTION_ID_KEY.to_string()), id_value));
        }

        Self { connection_id, fields }
    }

    /// Connection this entry belongs to.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// First value stored under a text key (including `connectionId`).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.fields, key)
    }

    /// All fields in wire order, `connectionId` included.
    #[must_use]
    pub fn fields(&self) -> &[(Value, Value)] {
        &self.fields
    }

    /// The descriptor part of the entry, without `connectionId`.
    #[must_use]
    pub fn descriptor(&self) -> Descriptor {
        Descriptor(
            self.fields
                .iter()
                .filter(|(key, _)| key.as_text() != Some(CONNECTION_ID_KEY))
                .cloned()
                .collect(),
        )
    }
}

impl TryFrom<Value> for PresenceEntry {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Map(fields) = value else {
            return Err(ProtocolError::InvalidPresence(format!(
                "presence entry must be a map, got {}",
                value_kind(&value)
            )));
        };

        let mut ids = fields
            .iter()
            .filter(|(key, _)| key.as_text() == Some(CONNECTION_ID_KEY))
            .map(|(_, value)| value.as_text());

        let connection_id = match (ids.next(), ids.next()) {
            (Some(Some(id)), None) => ConnectionId::new(id),
            (None, _) => {
                return Err(ProtocolError::InvalidPresence(format!(
                    "presence entry is missing `{CONNECTION_ID_KEY}`"
                )));
            },
            (Some(None), _) => {
                return Err(ProtocolError::InvalidPresence(format!(
                    "`{CONNECTION_ID_KEY}` must be text"
                )));
            },
            (Some(Some(_)), Some(_)) => {
                return Err(ProtocolError::InvalidPresence(format!(
                    "duplicate `{CONNECTION_ID_KEY}` field"
                )));
            },
        };

        Ok(Self { connection_id, fields })
    }
}

impl From<PresenceEntry> for Value {
    fn from(entry: PresenceEntry) -> Self {
        Value::Map(entry.fields)
    }
}

fn lookup<'a>(fields: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    fields.iter().find(|(k, _)| k.as_text() == Some(key)).map(|(_, v)| v)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(..) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    }
}
