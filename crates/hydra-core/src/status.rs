//! Connection and head status.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Status of the connection to a Hydra node, including the head lifecycle
/// stage last observed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No connection has been requested.
    #[default]
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Transport open, head state not yet known.
    Connected,
    /// Transport lost.
    Disconnected,
    /// Head is collecting commits.
    Initializing,
    /// Head is open for transactions.
    Open,
    /// Head closed, contestation period running.
    Closed,
    /// Contestation period over, fanout can be posted.
    FanoutPossible,
    /// Head finalized on layer 1.
    Final,
}

impl ConnectionStatus {
    /// Status implied by a head lifecycle message tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "HeadIsInitializing" => Some(ConnectionStatus::Initializing),
            "HeadIsOpen" => Some(ConnectionStatus::Open),
            "HeadIsClosed" => Some(ConnectionStatus::Closed),
            "ReadyToFanout" => Some(ConnectionStatus::FanoutPossible),
            "HeadIsFinalized" => Some(ConnectionStatus::Final),
            _ => None,
        }
    }

    /// Status implied by the `headStatus` field the node sends in `Greetings`.
    ///
    /// `Idle` carries no head information and maps to `None`.
    pub fn from_head_status(head_status: &str) -> Option<Self> {
        match head_status {
            "Initializing" => Some(ConnectionStatus::Initializing),
            "Open" => Some(ConnectionStatus::Open),
            "Closed" => Some(ConnectionStatus::Closed),
            "FanoutPossible" => Some(ConnectionStatus::FanoutPossible),
            "Final" => Some(ConnectionStatus::Final),
            _ => None,
        }
    }

    /// Status implied by a raw frame.
    ///
    /// A `headStatus` field counts on any frame and wins over the tag.
    pub fn from_frame(frame: &Json) -> Option<Self> {
        frame
            .get("headStatus")
            .and_then(Json::as_str)
            .and_then(Self::from_head_status)
            .or_else(|| frame.get("tag").and_then(Json::as_str).and_then(Self::from_tag))
    }

    /// Returns true if the status was derived from a protocol message.
    pub fn is_head_state(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Initializing
                | ConnectionStatus::Open
                | ConnectionStatus::Closed
                | ConnectionStatus::FanoutPossible
                | ConnectionStatus::Final
        )
    }

    /// Returns true while a transport is open or being opened.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionStatus::Idle | ConnectionStatus::Disconnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "IDLE",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Initializing => "INITIALIZING",
            ConnectionStatus::Open => "OPEN",
            ConnectionStatus::Closed => "CLOSED",
            ConnectionStatus::FanoutPossible => "FANOUT_POSSIBLE",
            ConnectionStatus::Final => "FINAL",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
