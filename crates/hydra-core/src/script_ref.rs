//! Reference script classification.
//!
//! A script reference is serialized as `#6.24(bytes .cbor [type, script])`.
//! Decoding is best effort: anything unexpected classifies as
//! [`ScriptType::Unknown`] instead of failing the surrounding UTxO.

use std::fmt;

use ciborium::value::{Integer, Value as Cbor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// CBOR tag for embedded CBOR data items.
pub const ENCODED_CBOR_TAG: u64 = 24;

/// Script language of a decoded reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptLanguage {
    NativeScript,
    PlutusV1,
    PlutusV2,
    PlutusV3,
}

impl ScriptLanguage {
    fn from_type_id(id: i128) -> Option<Self> {
        match id {
            0 => Some(ScriptLanguage::NativeScript),
            1 => Some(ScriptLanguage::PlutusV1),
            2 => Some(ScriptLanguage::PlutusV2),
            3 => Some(ScriptLanguage::PlutusV3),
            _ => None,
        }
    }

    /// Script type label, e.g. `SimpleScript` or `PlutusScriptV2`.
    pub fn script_type(&self) -> ScriptType {
        match self {
            ScriptLanguage::NativeScript => ScriptType::SimpleScript,
            ScriptLanguage::PlutusV1 => ScriptType::PlutusScriptV1,
            ScriptLanguage::PlutusV2 => ScriptType::PlutusScriptV2,
            ScriptLanguage::PlutusV3 => ScriptType::PlutusScriptV3,
        }
    }

    /// Language label as the node renders it.
    pub fn node_label(&self) -> String {
        match self {
            ScriptLanguage::NativeScript => "NativeScriptLanguage SimpleScript".to_string(),
            other => format!("PlutusScriptLanguage {}", other.script_type()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    SimpleScript,
    PlutusScriptV1,
    PlutusScriptV2,
    PlutusScriptV3,
    Unknown,
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScriptType::SimpleScript => "SimpleScript",
            ScriptType::PlutusScriptV1 => "PlutusScriptV1",
            ScriptType::PlutusScriptV2 => "PlutusScriptV2",
            ScriptType::PlutusScriptV3 => "PlutusScriptV3",
            ScriptType::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Classification result, including the unknown case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInfo {
    pub script_type: ScriptType,
    pub language: Option<ScriptLanguage>,
    /// Script body: CBOR of the native script, or the Plutus flat bytes.
    pub script: Option<Vec<u8>>,
}

impl ScriptInfo {
    fn unknown() -> Self {
        Self {
            script_type: ScriptType::Unknown,
            language: None,
            script: None,
        }
    }
}

/// A successfully decoded script reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReference {
    pub language: ScriptLanguage,
    pub script: Vec<u8>,
    /// Hex of the tag-24 envelope this was decoded from.
    pub envelope_hex: String,
}

impl ScriptReference {
    pub fn script_type(&self) -> ScriptType {
        self.language.script_type()
    }

    pub fn envelope_bytes(&self) -> Vec<u8> {
        // Constructed only from hex that already decoded.
        hex::decode(&self.envelope_hex).unwrap_or_default()
    }
}

/// Classify a script reference envelope.
pub fn classify(script_ref: Option<&str>) -> ScriptInfo {
    let Some(hex_str) = script_ref.filter(|s| !s.is_empty()) else {
        return ScriptInfo::unknown();
    };
    match classify_envelope(hex_str) {
        Ok(info) => info,
        Err(reason) => {
            debug!(script_ref = %hex_str, %reason, "Unreadable script reference");
            ScriptInfo::unknown()
        }
    }
}

/// Decode a script reference, or `None` if absent or not classifiable.
pub fn decode(script_ref: Option<&str>) -> Option<ScriptReference> {
    let hex_str = script_ref.filter(|s| !s.is_empty())?;
    let info = classify(Some(hex_str));
    Some(ScriptReference {
        language: info.language?,
        script: info.script?,
        envelope_hex: hex_str.to_ascii_lowercase(),
    })
}

/// Wrap a script in a tag-24 reference envelope.
pub fn encode_envelope(language: ScriptLanguage, script: &[u8]) -> Vec<u8> {
    let type_id = match language {
        ScriptLanguage::NativeScript => 0,
        ScriptLanguage::PlutusV1 => 1,
        ScriptLanguage::PlutusV2 => 2,
        ScriptLanguage::PlutusV3 => 3,
    };
    let body = match language {
        ScriptLanguage::NativeScript => from_cbor(script).unwrap_or(Cbor::Bytes(script.to_vec())),
        _ => Cbor::Bytes(script.to_vec()),
    };
    let inner = to_cbor(&Cbor::Array(vec![Cbor::Integer(Integer::from(type_id)), body]));
    to_cbor(&Cbor::Tag(ENCODED_CBOR_TAG, Box::new(Cbor::Bytes(inner))))
}

fn classify_envelope(hex_str: &str) -> std::result::Result<ScriptInfo, String> {
    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    let Cbor::Tag(ENCODED_CBOR_TAG, payload) = from_cbor(&bytes)? else {
        return Ok(ScriptInfo::unknown());
    };
    let Cbor::Bytes(inner) = *payload else {
        return Ok(ScriptInfo::unknown());
    };
    let Cbor::Array(mut items) = from_cbor(&inner)? else {
        return Ok(ScriptInfo::unknown());
    };
    if items.len() != 2 {
        return Ok(ScriptInfo::unknown());
    }
    let body = items.pop();
    let type_id = match items.pop() {
        Some(Cbor::Integer(id)) => i128::from(id),
        _ => return Ok(ScriptInfo::unknown()),
    };
    let Some(language) = ScriptLanguage::from_type_id(type_id) else {
        return Ok(ScriptInfo::unknown());
    };
    let script = match (language, body) {
        (ScriptLanguage::NativeScript, Some(native @ Cbor::Array(_))) => to_cbor(&native),
        (ScriptLanguage::NativeScript, _) => return Ok(ScriptInfo::unknown()),
        (_, Some(Cbor::Bytes(flat))) => flat,
        _ => return Ok(ScriptInfo::unknown()),
    };
    Ok(ScriptInfo {
        script_type: language.script_type(),
        language: Some(language),
        script: Some(script),
    })
}

fn from_cbor(bytes: &[u8]) -> std::result::Result<Cbor, String> {
    ciborium::de::from_reader(bytes).map_err(|e| e.to_string())
}

fn to_cbor(value: &Cbor) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = ciborium::ser::into_writer(value, &mut out);
    out
}
