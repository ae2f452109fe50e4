//! JSON wire protocol between the client and the relay.
//!
//! Frames are UTF-8 text. When the relay coalesces several messages into one
//! frame they are separated by newlines, each line an independent JSON
//! object tagged by a `"type"` field:
//!
//! ```text
//! {"type":"welcome","clientId":"client_17...","version":3,"document":"..."}\n
//! {"type":"userJoined","clientId":"client_18...","username":"Alice"}\n
//! ```
//!
//! Message kinds form two closed enums: [`ClientMessage`] (outgoing) and
//! [`ServerMessage`] (incoming), so the router can match exhaustively
//! instead of string-dispatching. Unknown incoming kinds decode to
//! [`ServerMessage::Unknown`] and are skipped by the caller.
//!
//! The relay omits zero-valued fields, so every incoming numeric field
//! defaults rather than fails.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The flat `{retain, delete, insert}` operation triple carried on the wire:
/// keep `retain` chars, remove `delete` chars, splice in `insert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EditPayload {
    #[serde(default)]
    pub retain: usize,
    #[serde(default)]
    pub delete: usize,
    #[serde(default)]
    pub insert: String,
}

/// One roster entry in a `users` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    pub client_id: String,
    #[serde(default)]
    pub username: String,
}

/// Messages the client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Announce the chosen username right after the socket opens.
    Join { username: String },
    /// A local document change, stamped with the sender's sync version.
    Operation { version: u64, operation: EditPayload },
    /// Local cursor/selection update.
    Selection { from: usize, to: usize, cursor: usize },
}

/// Messages the relay sends to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Session establishment: our assigned identity plus the authoritative
    /// document and version.
    #[serde(rename_all = "camelCase")]
    Welcome {
        client_id: String,
        #[serde(default)]
        version: u64,
        #[serde(default)]
        document: Option<String>,
    },
    /// A remote document change, as a triple and/or a batch of triples.
    #[serde(rename_all = "camelCase")]
    Operation {
        client_id: String,
        #[serde(default)]
        version: u64,
        #[serde(default)]
        operation: Option<EditPayload>,
        #[serde(default)]
        updates: Option<Vec<EditPayload>>,
    },
    /// A remote participant's cursor/selection moved.
    #[serde(rename_all = "camelCase")]
    Selection {
        client_id: String,
        #[serde(default)]
        from: usize,
        #[serde(default)]
        to: usize,
        #[serde(default)]
        cursor: usize,
    },
    /// A participant connected.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        client_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    /// A participant disconnected.
    #[serde(rename_all = "camelCase")]
    UserLeft { client_id: String },
    /// Wholesale roster snapshot.
    Users { users: Vec<RosterUser> },
    /// Any kind this client does not understand; logged and ignored.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Serialize to one wire line (no trailing newline).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

impl ServerMessage {
    /// Parse one line of a frame.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Split a frame into its non-empty lines.
///
/// Each line parses independently; a bad line must not abort its siblings,
/// so this yields raw `&str` and leaves parsing to the caller.
pub fn split_frame(frame: &str) -> impl Iterator<Item = &str> {
    frame.split('\n').map(str::trim).filter(|l| !l.is_empty())
}

/// Protocol errors. All are local and non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
    ConnectionClosed,
    NotConnected,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "message encode error: {e}"),
            Self::Decode(e) => write!(f, "message decode error: {e}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl std::error::Error for ProtocolError {}
