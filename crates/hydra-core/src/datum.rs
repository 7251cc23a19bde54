//! Plutus data decoding into the detailed JSON schema.

use ciborium::value::Value as Cbor;
use num_bigint::{BigInt, Sign};
use serde_json::{json, Value as Json};

use crate::error::{HydraError, Result};

const CONTEXT: &str = "inline datum";

/// Decode hex-encoded Plutus data CBOR into detailed-schema JSON.
pub fn decode_datum_hex(datum_hex: &str) -> Result<Json> {
    let bytes = hex::decode(datum_hex).map_err(|e| HydraError::decode(CONTEXT, e))?;
    decode_datum(&bytes)
}

/// Decode Plutus data CBOR into detailed-schema JSON.
pub fn decode_datum(bytes: &[u8]) -> Result<Json> {
    let cbor: Cbor = ciborium::de::from_reader(bytes).map_err(|e| HydraError::decode(CONTEXT, e))?;
    to_json(cbor)
}

fn to_json(cbor: Cbor) -> Result<Json> {
    match cbor {
        Cbor::Integer(n) => Ok(json!({ "int": i128_to_json(i128::from(n)) })),
        Cbor::Bytes(bytes) => Ok(json!({ "bytes": hex::encode(bytes) })),
        Cbor::Array(items) => {
            let list = items.into_iter().map(to_json).collect::<Result<Vec<_>>>()?;
            Ok(json!({ "list": list }))
        }
        Cbor::Map(entries) => {
            let map = entries
                .into_iter()
                .map(|(k, v)| Ok(json!({ "k": to_json(k)?, "v": to_json(v)? })))
                .collect::<Result<Vec<_>>>()?;
            Ok(json!({ "map": map }))
        }
        Cbor::Tag(tag @ 121..=127, fields) => constructor(tag - 121, *fields),
        Cbor::Tag(tag @ 1280..=1400, fields) => constructor(tag - 1280 + 7, *fields),
        Cbor::Tag(102, inner) => match *inner {
            Cbor::Array(mut pair) if pair.len() == 2 => {
                let fields = pair.pop().unwrap_or(Cbor::Null);
                match pair.pop() {
                    Some(Cbor::Integer(index)) => {
                        let index = u64::try_from(i128::from(index))
                            .map_err(|_| HydraError::decode(CONTEXT, "negative constructor index"))?;
                        constructor(index, fields)
                    }
                    _ => Err(HydraError::decode(CONTEXT, "constructor index is not an integer")),
                }
            }
            _ => Err(HydraError::decode(CONTEXT, "malformed tag 102 constructor")),
        },
        Cbor::Tag(2, inner) => bignum(*inner, false),
        Cbor::Tag(3, inner) => bignum(*inner, true),
        other => Err(HydraError::decode(
            CONTEXT,
            format!("unsupported Plutus data item: {other:?}"),
        )),
    }
}

fn constructor(index: u64, fields: Cbor) -> Result<Json> {
    let Cbor::Array(fields) = fields else {
        return Err(HydraError::decode(CONTEXT, "constructor fields are not a list"));
    };
    let fields = fields.into_iter().map(to_json).collect::<Result<Vec<_>>>()?;
    Ok(json!({ "constructor": index, "fields": fields }))
}

fn bignum(inner: Cbor, negative: bool) -> Result<Json> {
    let Cbor::Bytes(bytes) = inner else {
        return Err(HydraError::decode(CONTEXT, "bignum payload is not bytes"));
    };
    let magnitude = BigInt::from_bytes_be(Sign::Plus, &bytes);
    // CBOR negative bignum is -1 - n.
    let value = if negative { BigInt::from(-1) - magnitude } else { magnitude };
    let int = match i128::try_from(&value) {
        Ok(small) => i128_to_json(small),
        Err(_) => Json::String(value.to_string()),
    };
    Ok(json!({ "int": int }))
}

fn i128_to_json(n: i128) -> Json {
    if let Ok(small) = i64::try_from(n) {
        Json::from(small)
    } else if let Ok(unsigned) = u64::try_from(n) {
        Json::from(unsigned)
    } else {
        Json::String(n.to_string())
    }
}
