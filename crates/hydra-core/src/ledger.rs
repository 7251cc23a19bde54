//! Ledger-native types handed to downstream consumers.
//!
//! These mirror the Cardano ledger shapes closely enough to build or inspect
//! transactions elsewhere. Addresses stay opaque bech32 strings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{HydraError, Result};

/// Lovelace or token quantity.
pub type Quantity = u64;

/// 32-byte transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for TransactionId {
    type Err = HydraError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HydraError::InvalidTxId { tx_id: s.to_string() };
        let bytes = hex::decode(s).map_err(|_| invalid())?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 28-byte minting policy hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyId([u8; 28]);

impl PolicyId {
    /// Length of a policy id in hex characters.
    pub const HEX_LEN: usize = 56;

    pub fn new(bytes: [u8; 28]) -> Self {
        Self(bytes)
    }

    /// Parse 56 hex characters. Returns `None` on any other input.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 28] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Asset name, up to 32 raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    pub const MAX_LEN: usize = 32;

    /// Build from raw bytes. Returns `None` if longer than 32 bytes.
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() <= Self::MAX_LEN).then_some(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().and_then(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Token bundle keyed by policy, then asset name.
pub type MultiAsset = BTreeMap<PolicyId, BTreeMap<AssetName, Quantity>>;

/// Ledger value: coin plus multi-asset bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Value {
    pub coin: Quantity,
    pub multi_asset: MultiAsset,
}

impl Value {
    pub fn lovelace(coin: Quantity) -> Self {
        Self {
            coin,
            multi_asset: MultiAsset::new(),
        }
    }

    /// Add a token quantity, summing with any existing entry.
    pub fn with_asset(mut self, policy: PolicyId, name: AssetName, quantity: Quantity) -> Self {
        *self
            .multi_asset
            .entry(policy)
            .or_default()
            .entry(name)
            .or_default() += quantity;
        self
    }
}

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionInput {
    pub transaction_id: TransactionId,
    pub index: u32,
}

/// Datum attached to an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDatum {
    /// 32-byte datum hash.
    Hash([u8; 32]),
    /// Inline datum CBOR.
    Inline(Vec<u8>),
    /// Datum CBOR supplied alongside a hash-only output.
    Attached(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub address: String,
    pub amount: Value,
    pub datum: Option<OutputDatum>,
    /// Raw script reference envelope (tag-24 CBOR).
    pub script_ref: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: TransactionInput,
    pub output: TransactionOutput,
}

/// Text envelope type of a transaction relayed to the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TxType {
    Tx,
    Unwitnessed,
    #[default]
    Witnessed,
    /// Envelope type from another era, kept verbatim.
    Other(String),
}

impl TxType {
    pub fn as_str(&self) -> &str {
        match self {
            TxType::Tx => "Tx ConwayEra",
            TxType::Unwitnessed => "Unwitnessed Tx ConwayEra",
            TxType::Witnessed => "Witnessed Tx ConwayEra",
            TxType::Other(label) => label,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "Tx ConwayEra" => TxType::Tx,
            "Unwitnessed Tx ConwayEra" => TxType::Unwitnessed,
            "Witnessed Tx ConwayEra" => TxType::Witnessed,
            other => TxType::Other(other.to_string()),
        }
    }
}

impl Serialize for TxType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TxType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(TxType::from_label(&label))
    }
}
