//! Wire messages exchanged with a Hydra node.
//!
//! Inbound frames are decoded once into [`ProtocolMessage`]; tags this client
//! does not know are kept as [`ProtocolMessage::Unrecognized`] so they still
//! reach subscribers. Outbound commands are [`HeadCommand`]s.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{HydraError, Result};
use crate::ledger::TxType;
use crate::utxo::WireUtxoSet;

/// Transaction in the node's text envelope format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "cborHex")]
    pub cbor_hex: String,
    #[serde(rename = "txId", default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

impl Transaction {
    pub fn new(tx_type: TxType, cbor_hex: impl Into<String>) -> Self {
        Self {
            tx_type,
            description: String::new(),
            cbor_hex: cbor_hex.into(),
            tx_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    /// True if both carry the same transaction bytes.
    pub fn same_bytes(&self, cbor_hex: &str) -> bool {
        self.cbor_hex.eq_ignore_ascii_case(cbor_hex)
    }
}

/// Commands a client sends to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tag")]
pub enum HeadCommand {
    Init,
    Abort,
    Close,
    Contest,
    Fanout,
    #[serde(rename = "GetUTxO")]
    GetUtxo,
    NewTx {
        transaction: Transaction,
    },
    Decommit {
        #[serde(rename = "decommitTx")]
        decommit_tx: Transaction,
    },
}

impl HeadCommand {
    pub fn tag(&self) -> &'static str {
        match self {
            HeadCommand::Init => "Init",
            HeadCommand::Abort => "Abort",
            HeadCommand::Close => "Close",
            HeadCommand::Contest => "Contest",
            HeadCommand::Fanout => "Fanout",
            HeadCommand::GetUtxo => "GetUTxO",
            HeadCommand::NewTx { .. } => "NewTx",
            HeadCommand::Decommit { .. } => "Decommit",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fields every server output carries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Greetings {
    #[serde(default)]
    pub me: Option<Json>,
    #[serde(default)]
    pub head_status: Option<String>,
    #[serde(default)]
    pub hydra_head_id: Option<String>,
    #[serde(default)]
    pub snapshot_utxo: Option<WireUtxoSet>,
    #[serde(default)]
    pub hydra_node_version: Option<String>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Peer {
    pub peer: Json,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerHandshakeFailure {
    #[serde(default)]
    pub remote_host: Option<Json>,
    #[serde(default)]
    pub our_version: Option<u64>,
    #[serde(default)]
    pub their_versions: Vec<u64>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Head lifecycle event that optionally carries parties and a UTxO set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadEvent {
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub parties: Vec<Json>,
    #[serde(default)]
    pub utxo: Option<WireUtxoSet>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadClosed {
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub snapshot_number: Option<u64>,
    #[serde(default)]
    pub contestation_deadline: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxValid {
    #[serde(default)]
    pub head_id: Option<String>,
    pub transaction: Transaction,
    /// Newer nodes report the id beside the transaction.
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

impl TxValid {
    pub fn tx_id(&self) -> Option<&str> {
        self.transaction
            .tx_id
            .as_deref()
            .or(self.transaction_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInvalid {
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub utxo: Option<WireUtxoSet>,
    pub transaction: Transaction,
    #[serde(default)]
    pub validation_error: Json,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfirmed {
    #[serde(default)]
    pub head_id: Option<String>,
    pub snapshot: Snapshot,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub snapshot_number: Option<Json>,
    #[serde(default)]
    pub utxo: WireUtxoSet,
    #[serde(default)]
    pub confirmed_transactions: Vec<Json>,
    #[serde(default)]
    pub utxo_to_decommit: Option<WireUtxoSet>,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvalidInput {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub input: String,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostTxOnChainFailed {
    #[serde(default)]
    pub post_chain_tx: Json,
    #[serde(default)]
    pub post_tx_error: Json,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailed {
    #[serde(default)]
    pub client_input: Json,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoredHeadInitializing {
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub contestation_period: Option<u64>,
    #[serde(default)]
    pub parties: Vec<Json>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Decommit lifecycle event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecommitEvent {
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub decommit_tx: Option<Transaction>,
    #[serde(default)]
    pub decommit_tx_id: Option<String>,
    #[serde(default)]
    pub utxo_to_decommit: Option<WireUtxoSet>,
    #[serde(default)]
    pub decommit_invalid_reason: Option<Json>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Every message the node pushes over the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    Greetings(Greetings),
    PeerConnected(Peer),
    PeerDisconnected(Peer),
    PeerHandshakeFailure(PeerHandshakeFailure),
    HeadIsInitializing(HeadEvent),
    Committed(HeadEvent),
    HeadIsOpen(HeadEvent),
    HeadIsClosed(HeadClosed),
    HeadIsContested(HeadClosed),
    ReadyToFanout(HeadEvent),
    HeadIsAborted(HeadEvent),
    HeadIsFinalized(HeadEvent),
    TxValid(TxValid),
    TxInvalid(TxInvalid),
    SnapshotConfirmed(SnapshotConfirmed),
    GetUtxoResponse(HeadEvent),
    InvalidInput(InvalidInput),
    PostTxOnChainFailed(PostTxOnChainFailed),
    CommandFailed(CommandFailed),
    IgnoredHeadInitializing(IgnoredHeadInitializing),
    DecommitInvalid(DecommitEvent),
    DecommitRequested(DecommitEvent),
    DecommitApproved(DecommitEvent),
    DecommitFinalized(DecommitEvent),
    /// A tag this client does not model, with the full frame.
    Unrecognized { tag: String, payload: Json },
}

impl ProtocolMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let payload: Json = serde_json::from_str(text)?;
        Self::from_json(payload)
    }

    /// Decode an already-parsed frame.
    pub fn from_json(payload: Json) -> Result<Self> {
        let tag = payload
            .get("tag")
            .and_then(Json::as_str)
            .ok_or_else(|| HydraError::decode("message", "missing tag"))?
            .to_string();

        let message = match tag.as_str() {
            "Greetings" => ProtocolMessage::Greetings(body(&tag, payload)?),
            "PeerConnected" => ProtocolMessage::PeerConnected(body(&tag, payload)?),
            "PeerDisconnected" => ProtocolMessage::PeerDisconnected(body(&tag, payload)?),
            "PeerHandshakeFailure" => ProtocolMessage::PeerHandshakeFailure(body(&tag, payload)?),
            "HeadIsInitializing" => ProtocolMessage::HeadIsInitializing(body(&tag, payload)?),
            "Committed" => ProtocolMessage::Committed(body(&tag, payload)?),
            "HeadIsOpen" => ProtocolMessage::HeadIsOpen(body(&tag, payload)?),
            "HeadIsClosed" => ProtocolMessage::HeadIsClosed(body(&tag, payload)?),
            "HeadIsContested" => ProtocolMessage::HeadIsContested(body(&tag, payload)?),
            "ReadyToFanout" => ProtocolMessage::ReadyToFanout(body(&tag, payload)?),
            "HeadIsAborted" => ProtocolMessage::HeadIsAborted(body(&tag, payload)?),
            "HeadIsFinalized" => ProtocolMessage::HeadIsFinalized(body(&tag, payload)?),
            "TxValid" => ProtocolMessage::TxValid(body(&tag, payload)?),
            "TxInvalid" => ProtocolMessage::TxInvalid(body(&tag, payload)?),
            "SnapshotConfirmed" => ProtocolMessage::SnapshotConfirmed(body(&tag, payload)?),
            "GetUTxOResponse" => ProtocolMessage::GetUtxoResponse(body(&tag, payload)?),
            "InvalidInput" => ProtocolMessage::InvalidInput(body(&tag, payload)?),
            "PostTxOnChainFailed" => ProtocolMessage::PostTxOnChainFailed(body(&tag, payload)?),
            "CommandFailed" => ProtocolMessage::CommandFailed(body(&tag, payload)?),
            "IgnoredHeadInitializing" => {
                ProtocolMessage::IgnoredHeadInitializing(body(&tag, payload)?)
            }
            "DecommitInvalid" => ProtocolMessage::DecommitInvalid(body(&tag, payload)?),
            "DecommitRequested" => ProtocolMessage::DecommitRequested(body(&tag, payload)?),
            "DecommitApproved" => ProtocolMessage::DecommitApproved(body(&tag, payload)?),
            "DecommitFinalized" => ProtocolMessage::DecommitFinalized(body(&tag, payload)?),
            _ => ProtocolMessage::Unrecognized { tag, payload },
        };
        Ok(message)
    }

    /// The wire tag, verbatim.
    pub fn tag(&self) -> &str {
        match self {
            ProtocolMessage::Greetings(_) => "Greetings",
            ProtocolMessage::PeerConnected(_) => "PeerConnected",
            ProtocolMessage::PeerDisconnected(_) => "PeerDisconnected",
            ProtocolMessage::PeerHandshakeFailure(_) => "PeerHandshakeFailure",
            ProtocolMessage::HeadIsInitializing(_) => "HeadIsInitializing",
            ProtocolMessage::Committed(_) => "Committed",
            ProtocolMessage::HeadIsOpen(_) => "HeadIsOpen",
            ProtocolMessage::HeadIsClosed(_) => "HeadIsClosed",
            ProtocolMessage::HeadIsContested(_) => "HeadIsContested",
            ProtocolMessage::ReadyToFanout(_) => "ReadyToFanout",
            ProtocolMessage::HeadIsAborted(_) => "HeadIsAborted",
            ProtocolMessage::HeadIsFinalized(_) => "HeadIsFinalized",
            ProtocolMessage::TxValid(_) => "TxValid",
            ProtocolMessage::TxInvalid(_) => "TxInvalid",
            ProtocolMessage::SnapshotConfirmed(_) => "SnapshotConfirmed",
            ProtocolMessage::GetUtxoResponse(_) => "GetUTxOResponse",
            ProtocolMessage::InvalidInput(_) => "InvalidInput",
            ProtocolMessage::PostTxOnChainFailed(_) => "PostTxOnChainFailed",
            ProtocolMessage::CommandFailed(_) => "CommandFailed",
            ProtocolMessage::IgnoredHeadInitializing(_) => "IgnoredHeadInitializing",
            ProtocolMessage::DecommitInvalid(_) => "DecommitInvalid",
            ProtocolMessage::DecommitRequested(_) => "DecommitRequested",
            ProtocolMessage::DecommitApproved(_) => "DecommitApproved",
            ProtocolMessage::DecommitFinalized(_) => "DecommitFinalized",
            ProtocolMessage::Unrecognized { tag, .. } => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ProtocolMessage::Unrecognized { .. })
    }
}

fn body<T: DeserializeOwned>(tag: &str, payload: Json) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| HydraError::decode(format!("{tag} message"), e))
}
