//! UTxO translation between the node's JSON shape and the ledger model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::assets::{AssetUnit, CanonicalValue, LOVELACE};
use crate::datum;
use crate::error::{HydraError, Result};
use crate::ledger::{OutputDatum, TransactionId, TransactionInput, TransactionOutput, Utxo};
use crate::script_ref::{self, ScriptReference};

/// UTxO set as the node sends it, keyed by `txHash#index`.
pub type WireUtxoSet = BTreeMap<String, WireUtxo>;

/// A single output in the node's JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUtxo {
    pub address: String,

    /// `lovelace` plus either flat `unit → n` or nested `policy → {name → n}`.
    #[serde(default)]
    pub value: Map<String, Json>,

    #[serde(default)]
    pub datum: Option<String>,

    #[serde(default, rename = "datumhash")]
    pub datum_hash: Option<String>,

    #[serde(default)]
    pub inline_datum: Option<Json>,

    #[serde(default)]
    pub inline_datum_raw: Option<String>,

    #[serde(default, rename = "inlineDatumhash")]
    pub inline_datum_hash: Option<String>,

    #[serde(default)]
    pub reference_script: Option<WireScriptRef>,
}

/// Reference script field: a bare envelope hex or the node's text-envelope object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireScriptRef {
    Envelope(String),
    Described {
        #[serde(rename = "scriptLanguage")]
        script_language: String,
        script: WireScript,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireScript {
    #[serde(rename = "cborHex")]
    pub cbor_hex: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub script_type: String,
}

impl WireScriptRef {
    pub fn cbor_hex(&self) -> &str {
        match self {
            WireScriptRef::Envelope(hex_str) => hex_str,
            WireScriptRef::Described { script, .. } => &script.cbor_hex,
        }
    }
}

/// Datum carried by an output. At most one form is ever present.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DatumOption {
    #[default]
    None,
    /// Inline datum: raw CBOR hex, its decoded detailed-schema form and the
    /// hash if the node reported one.
    Inline {
        raw_hex: String,
        value: Json,
        hash: Option<String>,
    },
    /// Only a datum hash is known.
    Hash(String),
    /// Legacy datum CBOR hex without a hash.
    Legacy(String),
}

/// Output reference `txHash#index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtxoRef {
    pub tx_id: TransactionId,
    pub index: u32,
}

impl UtxoRef {
    pub fn new(tx_id: TransactionId, index: u32) -> Self {
        Self { tx_id, index }
    }

    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || HydraError::InvalidTxRefFormat {
            reference: reference.to_string(),
        };
        let (tx_hash, index) = reference.split_once('#').ok_or_else(invalid)?;
        if index.contains('#') {
            return Err(invalid());
        }
        let index = index.parse::<u32>().map_err(|_| invalid())?;
        let tx_id = tx_hash.parse::<TransactionId>()?;
        Ok(Self { tx_id, index })
    }

    pub fn to_input(&self) -> TransactionInput {
        TransactionInput {
            transaction_id: self.tx_id,
            index: self.index,
        }
    }
}

impl FromStr for UtxoRef {
    type Err = HydraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

impl From<TransactionInput> for UtxoRef {
    fn from(input: TransactionInput) -> Self {
        Self::new(input.transaction_id, input.index)
    }
}

/// Decoded output in the canonical value model.
#[derive(Debug, Clone, PartialEq)]
pub struct UtxoRecord {
    pub address: String,
    pub value: CanonicalValue,
    pub datum: DatumOption,
    pub script_ref: Option<ScriptReference>,
}

impl UtxoRecord {
    /// Decode the node's JSON shape.
    pub fn decode(wire: &WireUtxo) -> Result<Self> {
        Ok(Self {
            address: wire.address.clone(),
            value: CanonicalValue::canonicalize(wire_value_entries(&wire.value)?)?,
            datum: decode_datum_option(wire)?,
            script_ref: script_ref::decode(wire.reference_script.as_ref().map(|s| s.cbor_hex())),
        })
    }

    /// Encode into the node's JSON shape, with the value nested by policy.
    pub fn to_wire(&self) -> Result<WireUtxo> {
        let mut value = Map::new();
        for (unit, quantity) in self.value.iter() {
            match AssetUnit::parse(unit)? {
                AssetUnit::Lovelace => {
                    value.insert(LOVELACE.to_string(), Json::from(quantity));
                }
                AssetUnit::Token { policy, name } => {
                    let assets = value
                        .entry(policy.to_hex())
                        .or_insert_with(|| Json::Object(Map::new()));
                    if let Json::Object(assets) = assets {
                        assets.insert(name.to_hex(), Json::from(quantity));
                    }
                }
            }
        }

        let mut wire = WireUtxo {
            address: self.address.clone(),
            value,
            ..Default::default()
        };
        match &self.datum {
            DatumOption::None => {}
            DatumOption::Inline {
                raw_hex,
                value,
                hash,
            } => {
                wire.inline_datum = Some(value.clone());
                wire.inline_datum_raw = Some(raw_hex.clone());
                wire.inline_datum_hash = hash.clone();
            }
            DatumOption::Hash(hash) => wire.datum_hash = Some(hash.clone()),
            DatumOption::Legacy(datum) => wire.datum = Some(datum.clone()),
        }
        wire.reference_script = self.script_ref.as_ref().map(|reference| WireScriptRef::Described {
            script_language: reference.language.node_label(),
            script: WireScript {
                cbor_hex: reference.envelope_hex.clone(),
                description: String::new(),
                script_type: reference.script_type().to_string(),
            },
        });
        Ok(wire)
    }

    /// Convert into a ledger UTxO at `reference`.
    ///
    /// Only the raw envelope of a script reference is forwarded.
    pub fn to_ledger(&self, reference: &str) -> Result<Utxo> {
        let input = UtxoRef::parse(reference)?.to_input();
        let datum = match &self.datum {
            DatumOption::None => None,
            DatumOption::Inline { raw_hex, .. } => {
                Some(OutputDatum::Inline(decode_hex("inlineDatumRaw", raw_hex)?))
            }
            DatumOption::Hash(hash) => {
                let bytes = decode_hex("datumhash", hash)?;
                let hash: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| HydraError::decode("datumhash", "expected 32 bytes"))?;
                Some(OutputDatum::Hash(hash))
            }
            DatumOption::Legacy(datum) => Some(OutputDatum::Attached(decode_hex("datum", datum)?)),
        };
        Ok(Utxo {
            input,
            output: TransactionOutput {
                address: self.address.clone(),
                amount: self.value.to_ledger_value()?,
                datum,
                script_ref: self.script_ref.as_ref().map(ScriptReference::envelope_bytes),
            },
        })
    }

    /// Build from a ledger UTxO.
    pub fn from_ledger(utxo: &Utxo) -> Result<(UtxoRef, Self)> {
        let output = &utxo.output;
        let datum = match &output.datum {
            None => DatumOption::None,
            Some(OutputDatum::Inline(bytes)) => DatumOption::Inline {
                raw_hex: hex::encode(bytes),
                value: datum::decode_datum(bytes)?,
                hash: None,
            },
            Some(OutputDatum::Hash(hash)) => DatumOption::Hash(hex::encode(hash)),
            Some(OutputDatum::Attached(bytes)) => DatumOption::Legacy(hex::encode(bytes)),
        };
        let script_hex = output.script_ref.as_ref().map(hex::encode);
        let record = Self {
            address: output.address.clone(),
            value: CanonicalValue::from_ledger_value(&output.amount)?,
            datum,
            script_ref: script_ref::decode(script_hex.as_deref()),
        };
        Ok((UtxoRef::from(utxo.input), record))
    }
}

/// Decode a whole UTxO set into ledger UTxOs, in reference order.
pub fn decode_utxo_set(set: &WireUtxoSet) -> Result<Vec<Utxo>> {
    set.iter()
        .map(|(reference, wire)| UtxoRecord::decode(wire)?.to_ledger(reference))
        .collect()
}

fn decode_datum_option(wire: &WireUtxo) -> Result<DatumOption> {
    if let Some(raw_hex) = wire.inline_datum_raw.as_deref() {
        return Ok(DatumOption::Inline {
            raw_hex: raw_hex.to_ascii_lowercase(),
            value: datum::decode_datum_hex(raw_hex)?,
            hash: wire.inline_datum_hash.clone(),
        });
    }
    if wire.inline_datum.is_some() {
        return Err(HydraError::decode(
            "inlineDatumRaw",
            "inline datum present without its raw CBOR",
        ));
    }
    if let Some(hash) = &wire.datum_hash {
        return Ok(DatumOption::Hash(hash.clone()));
    }
    if let Some(datum) = &wire.datum {
        return Ok(DatumOption::Legacy(datum.clone()));
    }
    Ok(DatumOption::None)
}

fn wire_value_entries(value: &Map<String, Json>) -> Result<Vec<(String, i128)>> {
    let mut entries = Vec::new();
    for (key, amount) in value {
        match amount {
            Json::Object(assets) => {
                for (name, quantity) in assets {
                    let unit = format!("{key}{name}");
                    let quantity = wire_quantity(&unit, quantity)?;
                    entries.push((unit, quantity));
                }
            }
            quantity => entries.push((key.clone(), wire_quantity(key, quantity)?)),
        }
    }
    Ok(entries)
}

fn wire_quantity(unit: &str, quantity: &Json) -> Result<i128> {
    let parsed = match quantity {
        Json::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Json::String(s) => s.parse::<i128>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| HydraError::decode(format!("value of {unit}"), quantity))
}

fn decode_hex(context: &str, hex_str: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str).map_err(|e| HydraError::decode(context, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_ref::{encode_envelope, ScriptLanguage};
    use serde_json::json;

    const TX: &str = "8a2c5e1b0d4f3e9a7c6b5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f40";
    const POLICY: &str = "5c5c318d01f729e205c95eb1b02d623dd10e78ea58f72d0c13f892b2";

    fn wire(value: Json) -> WireUtxo {
        serde_json::from_value(json!({
            "address": "addr_test1vz0vexample",
            "value": value,
        }))
        .unwrap()
    }

    #[test]
    fn test_utxo_ref_parse() {
        let reference = UtxoRef::parse(&format!("{TX}#3")).unwrap();
        assert_eq!(reference.index, 3);
        assert_eq!(reference.to_string(), format!("{TX}#3"));

        assert!(matches!(
            UtxoRef::parse("abc"),
            Err(HydraError::InvalidTxRefFormat { .. })
        ));
        assert!(matches!(
            UtxoRef::parse("abc#1"),
            Err(HydraError::InvalidTxId { .. })
        ));
        for bad in [format!("{TX}#"), format!("{TX}#-1"), format!("{TX}#1#2")] {
            assert!(
                matches!(UtxoRef::parse(&bad), Err(HydraError::InvalidTxRefFormat { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_decode_nested_and_flat_values() {
        let nested = wire(json!({ "lovelace": 2000000, POLICY: { "74657374": 5 } }));
        let flat = wire(json!({ "lovelace": 2000000, format!("{POLICY}74657374"): 5 }));

        let nested = UtxoRecord::decode(&nested).unwrap();
        let flat = UtxoRecord::decode(&flat).unwrap();
        assert_eq!(nested.value, flat.value);
        assert_eq!(nested.value.lovelace(), 2_000_000);
        assert_eq!(nested.value.get(&format!("{POLICY}74657374")), 5);
        assert_eq!(nested.datum, DatumOption::None);
        assert!(nested.script_ref.is_none());
    }

    #[test]
    fn test_decode_rejects_bad_quantities() {
        let negative = wire(json!({ "lovelace": -5 }));
        assert!(matches!(
            UtxoRecord::decode(&negative),
            Err(HydraError::NegativeQuantity { .. })
        ));

        let text = wire(json!({ "lovelace": "lots" }));
        assert!(matches!(UtxoRecord::decode(&text), Err(HydraError::Decode { .. })));
    }

    #[test]
    fn test_datum_precedence() {
        let mut record = wire(json!({ "lovelace": 1 }));
        record.datum = Some("d87980".to_string());
        record.datum_hash = Some("11".repeat(32));
        record.inline_datum = Some(json!({ "constructor": 0, "fields": [] }));
        record.inline_datum_raw = Some("D87980".to_string());

        let decoded = UtxoRecord::decode(&record).unwrap();
        assert_eq!(
            decoded.datum,
            DatumOption::Inline {
                raw_hex: "d87980".to_string(),
                value: json!({ "constructor": 0, "fields": [] }),
                hash: None,
            }
        );

        record.inline_datum = None;
        record.inline_datum_raw = None;
        let decoded = UtxoRecord::decode(&record).unwrap();
        assert_eq!(decoded.datum, DatumOption::Hash("11".repeat(32)));

        record.datum_hash = None;
        let decoded = UtxoRecord::decode(&record).unwrap();
        assert_eq!(decoded.datum, DatumOption::Legacy("d87980".to_string()));
    }

    #[test]
    fn test_inline_datum_needs_valid_cbor() {
        let mut record = wire(json!({ "lovelace": 1 }));
        record.inline_datum_raw = Some("ff00".to_string());
        assert!(matches!(UtxoRecord::decode(&record), Err(HydraError::Decode { .. })));

        record.inline_datum_raw = None;
        record.inline_datum = Some(json!({ "int": 1 }));
        assert!(UtxoRecord::decode(&record).is_err());
    }

    #[test]
    fn test_node_json_with_script_reference() {
        let envelope = hex::encode(encode_envelope(ScriptLanguage::PlutusV2, &[1, 2, 3]));
        let record: WireUtxo = serde_json::from_value(json!({
            "address": "addr_test1wexample",
            "datum": null,
            "datumhash": null,
            "inlineDatum": null,
            "inlineDatumRaw": null,
            "referenceScript": {
                "scriptLanguage": "PlutusScriptLanguage PlutusScriptV2",
                "script": { "cborHex": envelope, "description": "", "type": "PlutusScriptV2" }
            },
            "value": { "lovelace": 10000000 }
        }))
        .unwrap();

        let decoded = UtxoRecord::decode(&record).unwrap();
        let script = decoded.script_ref.as_ref().unwrap();
        assert_eq!(script.language, ScriptLanguage::PlutusV2);

        let utxo = decoded.to_ledger(&format!("{TX}#0")).unwrap();
        assert_eq!(utxo.output.script_ref, Some(hex::decode(&envelope).unwrap()));
        assert_eq!(utxo.output.amount.coin, 10_000_000);
    }

    #[test]
    fn test_unclassifiable_script_does_not_fail() {
        let mut record = wire(json!({ "lovelace": 1 }));
        record.reference_script = Some(WireScriptRef::Envelope("82014d01".to_string()));
        let decoded = UtxoRecord::decode(&record).unwrap();
        assert!(decoded.script_ref.is_none());
    }

    #[test]
    fn test_to_ledger_and_back() {
        let mut record = wire(json!({ "lovelace": 5, POLICY: { "": 1, "6e6674": 2 } }));
        record.datum_hash = Some("ab".repeat(32));
        let decoded = UtxoRecord::decode(&record).unwrap();

        let utxo = decoded.to_ledger(&format!("{TX}#7")).unwrap();
        assert_eq!(utxo.input.index, 7);
        assert_eq!(utxo.output.datum, Some(OutputDatum::Hash([0xab; 32])));

        let (reference, back) = UtxoRecord::from_ledger(&utxo).unwrap();
        assert_eq!(reference.to_string(), format!("{TX}#7"));
        assert_eq!(back, decoded);
    }

    #[test]
    fn test_to_ledger_rejects_bad_reference() {
        let decoded = UtxoRecord::decode(&wire(json!({ "lovelace": 1 }))).unwrap();
        assert!(matches!(
            decoded.to_ledger("no-separator"),
            Err(HydraError::InvalidTxRefFormat { .. })
        ));
    }

    #[test]
    fn test_to_wire_nests_by_policy() {
        let decoded = UtxoRecord::decode(&wire(json!({
            "lovelace": 3,
            format!("{POLICY}41"): 1,
            format!("{POLICY}42"): 2,
        })))
        .unwrap();
        let wire = decoded.to_wire().unwrap();
        assert_eq!(
            Json::Object(wire.value.clone()),
            json!({ "lovelace": 3, POLICY: { "41": 1, "42": 2 } })
        );
        assert_eq!(UtxoRecord::decode(&wire).unwrap(), decoded);

        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("datumhash").is_some());
        assert!(json.get("inlineDatumRaw").is_some());
    }

    #[test]
    fn test_to_wire_merges_hex_case() {
        let upper = POLICY.to_ascii_uppercase();
        let decoded = UtxoRecord::decode(&wire(json!({
            "lovelace": 3,
            format!("{POLICY}41"): 2,
            upper: { "41": 5 },
        })))
        .unwrap();
        let wire = decoded.to_wire().unwrap();
        assert_eq!(
            Json::Object(wire.value),
            json!({ "lovelace": 3, POLICY: { "41": 7 } })
        );
    }

    #[test]
    fn test_decode_utxo_set() {
        let mut set = WireUtxoSet::new();
        set.insert(format!("{TX}#1"), wire(json!({ "lovelace": 1 })));
        set.insert(format!("{TX}#0"), wire(json!({ "lovelace": 2 })));
        let utxos = decode_utxo_set(&set).unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].input.index, 0);
        assert_eq!(utxos[0].output.amount.coin, 2);

        set.insert("broken".to_string(), wire(json!({ "lovelace": 1 })));
        assert!(decode_utxo_set(&set).is_err());
    }
}
