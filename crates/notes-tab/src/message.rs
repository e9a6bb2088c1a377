//! Relay join frame.
//!
//! The first frame a client sends after connecting to the relay names the
//! channel it wants to join. It is JSON sent as a binary WebSocket frame.
//! Every frame after it is opaque to the relay.

use serde::{Deserialize, Serialize};

/// Join request sent by a relay client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinMessage {
    /// Always "join"
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Channel to join
    pub channel: String,
}

impl JoinMessage {
    pub fn new(channel: &str) -> Self {
        Self {
            msg_type: "join".to_string(),
            channel: channel.to_string(),
        }
    }

    /// Serialize to UTF-8 JSON bytes.
    pub fn to_binary(&self) -> Vec<u8> {
        // Two string fields; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Try to parse a join frame.
    ///
    /// Returns None if the data is not a join message or names no channel.
    pub fn from_binary(data: &[u8]) -> Option<Self> {
        let msg: Self = serde_json::from_slice(data).ok()?;
        if msg.msg_type == "join" && !msg.channel.is_empty() {
            Some(msg)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_wire_format() {
        let json = String::from_utf8(JoinMessage::new("notes").to_binary()).unwrap();
        assert_eq!(json, r#"{"type":"join","channel":"notes"}"#);
    }

    #[test]
    fn test_parse_join() {
        let parsed = JoinMessage::from_binary(br#"{"type":"join","channel":"notes"}"#).unwrap();
        assert_eq!(parsed.channel, "notes");
    }

    #[test]
    fn test_non_join_returns_none() {
        assert!(JoinMessage::from_binary(b"not json at all").is_none());
        assert!(JoinMessage::from_binary(br#"{"type":"DELETE_NOTE","channel":"x"}"#).is_none());
        assert!(JoinMessage::from_binary(br#"{"type":"join","channel":""}"#).is_none());
    }
}
