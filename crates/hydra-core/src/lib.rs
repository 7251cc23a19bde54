//! # Hydra Core
//!
//! Data model for a Hydra Head client.
//!
//! This crate provides the pure building blocks:
//! - [`CanonicalValue`] - Unit-keyed asset bundle with validated units
//! - [`UtxoRecord`] - Wire UTxO decoding into ledger types
//! - [`ProtocolMessage`] / [`HeadCommand`] - Head WebSocket protocol
//! - [`ConnectionStatus`] - Transport and head lifecycle states
//! - [`HydraError`] - Client error types

pub mod assets;
pub mod datum;
pub mod error;
pub mod ledger;
pub mod message;
pub mod protocol_params;
pub mod script_ref;
pub mod status;
pub mod utxo;

// Re-exports for convenience
pub use assets::{AssetUnit, CanonicalValue, LOVELACE};
pub use error::{HydraError, Result, TransportError};
pub use ledger::{
    AssetName, MultiAsset, OutputDatum, PolicyId, Quantity, TransactionId, TransactionInput,
    TransactionOutput, TxType, Utxo, Value,
};
pub use message::{HeadCommand, ProtocolMessage, Transaction};
pub use protocol_params::{ProtocolParameters, Rational};
pub use script_ref::{ScriptInfo, ScriptLanguage, ScriptReference, ScriptType};
pub use status::ConnectionStatus;
pub use utxo::{DatumOption, UtxoRecord, UtxoRef, WireUtxo, WireUtxoSet};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::assets::{AssetUnit, CanonicalValue};
    pub use crate::error::{HydraError, Result};
    pub use crate::ledger::{TransactionId, TxType, Utxo};
    pub use crate::message::{HeadCommand, ProtocolMessage, Transaction};
    pub use crate::status::ConnectionStatus;
    pub use crate::utxo::{UtxoRecord, UtxoRef};
}
