//! Error types for the Hydra Head client.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::status::ConnectionStatus;

/// Main error type for Hydra client operations.
#[derive(Error, Debug, Clone)]
pub enum HydraError {
    /// A command could not be written to the node before the send window closed.
    #[error("Failed to deliver {tag} command after {}ms", waited.as_millis())]
    ConnectionDeliveryFailure { tag: String, waited: Duration },

    /// The connection dropped while a caller was waiting on the node.
    #[error("Connection lost while waiting for the node (status {status})")]
    ConnectionLost { status: ConnectionStatus },

    /// The node rejected a submitted transaction.
    #[error("Transaction rejected by the node: {validation_error}")]
    ProtocolValidation { validation_error: serde_json::Value },

    /// Malformed CBOR, hex or JSON in a UTxO, datum or parameter field.
    #[error("Failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    /// Non-lovelace unit too short to contain a policy id.
    #[error("Invalid unit length: {unit}")]
    InvalidUnitLength { unit: String },

    /// Policy id slice of a unit is not 28 bytes of hex.
    #[error("Invalid policy id in unit: {unit}")]
    InvalidPolicyId { unit: String },

    /// Asset name slice of a unit is not valid hex of at most 32 bytes.
    #[error("Invalid asset name in unit: {unit}")]
    InvalidAssetName { unit: String },

    /// Negative quantity supplied for a unit.
    #[error("Negative quantity for asset {unit}: {quantity}")]
    NegativeQuantity { unit: String, quantity: i128 },

    /// Summed quantity does not fit a ledger amount.
    #[error("Quantity overflow for asset {unit}")]
    QuantityOverflow { unit: String },

    /// UTxO reference is not of the form `txHash#index`.
    #[error("Invalid TxId format: {reference}")]
    InvalidTxRefFormat { reference: String },

    /// Transaction id is not 32 bytes of hex.
    #[error("Invalid transaction id: {tx_id}")]
    InvalidTxId { tx_id: String },

    /// No UTxO at the requested reference.
    #[error("UTxO not found: {reference}")]
    UtxoNotFound { reference: String },

    /// HTTP request/response failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure on the request/response channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The node answered with a status other than 200 or 202.
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        headers: BTreeMap<String, String>,
    },

    /// The request never produced a response.
    #[error("{method} {url} failed: {message}")]
    Request {
        method: String,
        url: String,
        message: String,
    },
}

impl HydraError {
    /// Shorthand for a [`HydraError::Decode`].
    pub fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        HydraError::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            HydraError::ConnectionDeliveryFailure { .. } => true,
            HydraError::ConnectionLost { .. } => true,
            HydraError::Transport(TransportError::Request { .. }) => true,
            HydraError::Transport(TransportError::Status { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}

/// Convenience Result type for Hydra operations.
pub type Result<T> = std::result::Result<T, HydraError>;

impl From<serde_json::Error> for HydraError {
    fn from(err: serde_json::Error) -> Self {
        HydraError::Serialization(err.to_string())
    }
}
