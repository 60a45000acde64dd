// Wire framing for stream transports
// One JSON object per line: {"verb": "...", "data": <any JSON>}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NetResult;

use super::message::NetworkMessage;

/// A single frame on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub verb: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn from_message(msg: &NetworkMessage) -> Self {
        Self {
            verb: msg.verb().to_string(),
            data: msg.data().clone(),
        }
    }

    /// Serialize to a newline-terminated JSON line
    pub fn encode(&self) -> NetResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse one line (trailing newline optional)
    pub fn decode(line: &str) -> NetResult<Self> {
        Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
    }
}
