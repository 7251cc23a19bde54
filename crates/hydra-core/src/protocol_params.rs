//! Protocol parameters as reported by the node.

use num_rational::Ratio;
use serde_json::{Map, Value as Json};

use crate::error::{HydraError, Result};

/// Exact non-negative fraction.
pub type Rational = Ratio<u64>;

/// Ledger protocol parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolParameters {
    pub min_fee_constant: u64,
    pub min_fee_coefficient: u64,
    pub max_block_size: u64,
    pub max_tx_size: u64,
    pub max_block_header_size: u64,
    pub key_deposit: u64,
    pub pool_deposit: u64,
    pub pool_influence: Rational,
    pub monetary_expansion: Rational,
    pub treasury_expansion: Rational,
    /// Always zero since the Babbage era.
    pub decentralization_param: Rational,
    pub extra_entropy: String,
    pub protocol_major_version: u64,
    pub protocol_minor_version: u64,
    pub min_utxo: u64,
    pub min_pool_cost: u64,
    pub price_mem: Rational,
    pub price_step: Rational,
    pub max_tx_ex_mem: u64,
    pub max_tx_ex_steps: u64,
    pub max_block_ex_mem: u64,
    pub max_block_ex_steps: u64,
    pub max_val_size: u64,
    pub collateral_percent: u64,
    pub max_collateral_inputs: u64,
    pub coins_per_utxo_word: u64,
    pub coins_per_utxo_byte: u64,
    pub cost_models: Json,
}

impl ProtocolParameters {
    /// Map the node's flat `protocol-parameters` object.
    pub fn from_node_json(data: &Json) -> Result<Self> {
        let data = object(data, "protocol-parameters")?;
        let version = object(required(data, "protocolVersion")?, "protocolVersion")?;
        let prices = object(required(data, "executionUnitPrices")?, "executionUnitPrices")?;
        let max_tx_units = object(required(data, "maxTxExecutionUnits")?, "maxTxExecutionUnits")?;
        let max_block_units =
            object(required(data, "maxBlockExecutionUnits")?, "maxBlockExecutionUnits")?;

        Ok(Self {
            min_fee_constant: uint(data, "txFeeFixed")?,
            min_fee_coefficient: uint(data, "txFeePerByte")?,
            max_block_size: uint(data, "maxBlockBodySize")?,
            max_tx_size: uint(data, "maxTxSize")?,
            max_block_header_size: uint(data, "maxBlockHeaderSize")?,
            key_deposit: uint(data, "stakeAddressDeposit")?,
            pool_deposit: uint(data, "stakePoolDeposit")?,
            pool_influence: rational(data, "poolPledgeInfluence")?,
            monetary_expansion: rational(data, "monetaryExpansion")?,
            treasury_expansion: rational(data, "treasuryCut")?,
            decentralization_param: Rational::from_integer(0),
            extra_entropy: String::new(),
            protocol_major_version: required_uint(version, "major")?,
            protocol_minor_version: required_uint(version, "minor")?,
            min_utxo: uint(data, "minUTxOValue")?,
            min_pool_cost: uint(data, "minPoolCost")?,
            price_mem: rational(prices, "priceMemory")?,
            price_step: rational(prices, "priceSteps")?,
            max_tx_ex_mem: required_uint(max_tx_units, "memory")?,
            max_tx_ex_steps: required_uint(max_tx_units, "steps")?,
            max_block_ex_mem: required_uint(max_block_units, "memory")?,
            max_block_ex_steps: required_uint(max_block_units, "steps")?,
            max_val_size: uint(data, "maxValueSize")?,
            collateral_percent: uint(data, "collateralPercentage")?,
            max_collateral_inputs: uint(data, "maxCollateralInputs")?,
            coins_per_utxo_word: 0,
            coins_per_utxo_byte: uint(data, "utxoCostPerByte")?,
            cost_models: data.get("costModels").cloned().unwrap_or_else(|| Json::Object(Map::new())),
        })
    }
}

/// Parse decimal text such as `0.0577`, `3` or `7.21e-5` into an exact fraction.
pub fn parse_decimal(text: &str) -> Option<Rational> {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(at) => (&text[..at], text[at + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let significant = digits.trim_start_matches('0');
    let mut numer: u128 = if significant.is_empty() {
        0
    } else {
        significant.parse().ok()?
    };
    let mut denom: u128 = 10u128.checked_pow(u32::try_from(frac_part.len()).ok()?)?;
    let scale = 10u128.checked_pow(exponent.unsigned_abs())?;
    if exponent >= 0 {
        numer = numer.checked_mul(scale)?;
    } else {
        denom = denom.checked_mul(scale)?;
    }

    let reduced = Ratio::<u128>::new(numer, denom);
    Some(Rational::new_raw(
        u64::try_from(*reduced.numer()).ok()?,
        u64::try_from(*reduced.denom()).ok()?,
    ))
}

fn object<'a>(value: &'a Json, context: &str) -> Result<&'a Map<String, Json>> {
    value
        .as_object()
        .ok_or_else(|| HydraError::decode(context, "expected an object"))
}

fn required<'a>(data: &'a Map<String, Json>, key: &str) -> Result<&'a Json> {
    data.get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| HydraError::decode(key, "missing field"))
}

fn uint(data: &Map<String, Json>, key: &str) -> Result<u64> {
    match data.get(key) {
        None | Some(Json::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| HydraError::decode(key, format!("expected unsigned integer, got {value}"))),
    }
}

fn required_uint(data: &Map<String, Json>, key: &str) -> Result<u64> {
    required(data, key)?;
    uint(data, key)
}

fn rational(data: &Map<String, Json>, key: &str) -> Result<Rational> {
    let text = match data.get(key) {
        None | Some(Json::Null) => return Ok(Rational::from_integer(0)),
        Some(Json::Number(n)) => n.to_string(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => return Err(HydraError::decode(key, format!("expected decimal, got {other}"))),
    };
    parse_decimal(&text).ok_or_else(|| HydraError::decode(key, format!("invalid decimal {text}")))
}
