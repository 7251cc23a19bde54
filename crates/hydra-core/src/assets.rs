//! Canonical multi-asset values.
//!
//! The node reports value as quantities keyed by *unit*: either `lovelace` or
//! a 56-character hex policy id followed by the hex asset name. A
//! [`CanonicalValue`] holds that form with every quantity summed, positive and
//! keyed once, and converts to and from the ledger [`Value`].

use std::collections::BTreeMap;

use crate::error::{HydraError, Result};
use crate::ledger::{AssetName, PolicyId, Quantity, Value};

/// Unit name of the base currency.
pub const LOVELACE: &str = "lovelace";

/// A validated asset unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetUnit {
    Lovelace,
    Token { policy: PolicyId, name: AssetName },
}

impl AssetUnit {
    /// Parse a unit string.
    pub fn parse(unit: &str) -> Result<Self> {
        if unit == LOVELACE {
            return Ok(AssetUnit::Lovelace);
        }
        if unit.len() < PolicyId::HEX_LEN || !unit.is_char_boundary(PolicyId::HEX_LEN) {
            return Err(HydraError::InvalidUnitLength {
                unit: unit.to_string(),
            });
        }
        let (policy_hex, name_hex) = unit.split_at(PolicyId::HEX_LEN);
        let policy = PolicyId::from_hex(policy_hex).ok_or_else(|| HydraError::InvalidPolicyId {
            unit: unit.to_string(),
        })?;
        let name = AssetName::from_hex(name_hex).ok_or_else(|| HydraError::InvalidAssetName {
            unit: unit.to_string(),
        })?;
        Ok(AssetUnit::Token { policy, name })
    }

    /// Render back to the unit string.
    pub fn to_unit(&self) -> String {
        match self {
            AssetUnit::Lovelace => LOVELACE.to_string(),
            AssetUnit::Token { policy, name } => format!("{}{}", policy.to_hex(), name.to_hex()),
        }
    }
}

/// Unit-keyed quantities with no zero entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalValue(BTreeMap<String, Quantity>);

impl CanonicalValue {
    /// Sum `(unit, quantity)` entries into canonical form.
    ///
    /// An empty unit counts as lovelace. Any negative quantity is rejected
    /// before summing; zero totals are dropped.
    pub fn canonicalize<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, i128)>,
        S: AsRef<str>,
    {
        let mut totals: BTreeMap<String, i128> = BTreeMap::new();
        for (unit, quantity) in entries {
            let unit = normalize_unit(unit.as_ref());
            if quantity < 0 {
                return Err(HydraError::NegativeQuantity { unit, quantity });
            }
            let total = totals.entry(unit.clone()).or_default();
            *total = total
                .checked_add(quantity)
                .ok_or(HydraError::QuantityOverflow { unit })?;
        }

        totals
            .into_iter()
            .filter(|(_, total)| *total != 0)
            .map(|(unit, total)| {
                let quantity =
                    Quantity::try_from(total).map_err(|_| HydraError::QuantityOverflow {
                        unit: unit.clone(),
                    })?;
                Ok((unit, quantity))
            })
            .collect::<Result<_>>()
            .map(Self)
    }

    /// Build from a ledger value.
    pub fn from_ledger_value(value: &Value) -> Result<Self> {
        let coin = std::iter::once((LOVELACE.to_string(), i128::from(value.coin)));
        let tokens = value.multi_asset.iter().flat_map(|(policy, assets)| {
            assets.iter().map(move |(name, quantity)| {
                (
                    format!("{}{}", policy.to_hex(), name.to_hex()),
                    i128::from(*quantity),
                )
            })
        });
        Self::canonicalize(coin.chain(tokens))
    }

    /// Split into coin and a policy → asset name → quantity bundle.
    pub fn to_ledger_value(&self) -> Result<Value> {
        let mut value = Value::default();
        for (unit, quantity) in &self.0 {
            match AssetUnit::parse(unit)? {
                AssetUnit::Lovelace => value.coin = *quantity,
                AssetUnit::Token { policy, name } => {
                    value.multi_asset.entry(policy).or_default().insert(name, *quantity);
                }
            }
        }
        Ok(value)
    }

    /// Lovelace amount, 0 if absent.
    pub fn lovelace(&self) -> Quantity {
        self.get(LOVELACE)
    }

    /// Quantity for a unit, 0 if absent.
    pub fn get(&self, unit: &str) -> Quantity {
        self.0.get(unit).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Quantity)> {
        self.0.iter().map(|(unit, quantity)| (unit.as_str(), *quantity))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Key a unit by the asset it names.
///
/// Hex is case-insensitive, so token units are lowercased and differently
/// cased spellings of one asset sum together. Short units are kept verbatim
/// and rejected when parsed.
fn normalize_unit(unit: &str) -> String {
    match unit {
        "" | LOVELACE => LOVELACE.to_string(),
        token if token.len() >= PolicyId::HEX_LEN => token.to_ascii_lowercase(),
        other => other.to_string(),
    }
}
