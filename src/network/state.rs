// Connection state machine of the network dispatcher

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the dispatcher's remote connection.
///
/// `WaitingForInitialization -> Initializing -> {Connected | ConnectionError}`,
/// then `Connected <-> Reconnecting <-> Disconnected` as the transport reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    WaitingForInitialization,
    Initializing,
    Connected,
    ConnectionError,
    Reconnecting,
    Disconnected,
}

impl ConnectionState {
    /// Only a connected dispatcher accepts or sends messages
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Wire-style name, matching the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::WaitingForInitialization => "waitingForInitialization",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Connected => "connected",
            ConnectionState::ConnectionError => "connectionError",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
