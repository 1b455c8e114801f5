//! Message payloads
//!
//! Actors exchange immutable byte payloads. Text and JSON helpers cover the
//! common cases without tying the runtime to one message type.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// An immutable, cheaply cloneable message payload
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Message(Bytes);

impl Message {
    /// Create an empty message
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Create a message from UTF-8 text
    pub fn text(text: impl Into<String>) -> Self {
        Self(Bytes::from(text.into()))
    }

    /// Serialize a value as a JSON message
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::SerializationFailed {
            reason: e.to_string(),
        })?;
        Ok(Self(Bytes::from(bytes)))
    }

    /// Deserialize this message from JSON
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.0).map_err(|e| Error::DeserializationFailed {
            reason: e.to_string(),
        })
    }

    /// View the payload as UTF-8 text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// View the raw payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the message, returning its bytes
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => write!(f, "Message({:?})", text),
            None => write!(f, "Message({} bytes)", self.0.len()),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Bytes> for Message {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl PartialEq<&str> for Message {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == other.as_bytes()
    }
}
