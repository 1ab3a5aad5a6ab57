//! Normalization of quoting-service transaction descriptors.
//!
//! Descriptors have no fixed schema. Each field is resolved from an ordered list of key
//! aliases; the first key holding a usable value wins. Only the destination is mandatory:
//! value, gas and fee fields degrade to defaults/absent when malformed.

use crate::errors::AttemptError;
use crate::numeric;
use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;
use std::str::FromStr as _;

const TO_KEYS: &[&str] = &["to", "to_address", "toAddress"];
const CALLDATA_KEYS: &[&str] = &["input", "calldata", "data"];
const VALUE_KEYS: &[&str] = &["value"];
const GAS_KEYS: &[&str] = &["gas"];
const MAX_FEE_KEYS: &[&str] = &["maxFeePerGas", "max_fee_per_gas"];
const MAX_PRIORITY_KEYS: &[&str] = &["maxPriorityFeePerGas", "max_priority_fee_per_gas"];
const GAS_PRICE_KEYS: &[&str] = &["gasPrice", "gas_price"];

/// Canonical form of one quoted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_hint: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub gas_price: Option<u128>,
}

impl TransactionIntent {
    /// Both EIP-1559 fee fields, when the quote supplied them.
    pub fn eip1559_fees(&self) -> Option<(u128, u128)> {
        Some((self.max_fee_per_gas?, self.max_priority_fee_per_gas?))
    }

    /// JSON view with decimal-string quantities; absent fields are `null`.
    pub fn to_json(&self) -> Value {
        let opt = |v: Option<u128>| v.map_or(Value::Null, |n| Value::String(n.to_string()));
        serde_json::json!({
            "to": format!("{:#x}", self.to),
            "data": self.data.to_string(),
            "value": self.value.to_string(),
            "gas": self.gas_hint,
            "maxFeePerGas": opt(self.max_fee_per_gas),
            "maxPriorityFeePerGas": opt(self.max_priority_fee_per_gas),
            "gasPrice": opt(self.gas_price),
        })
    }
}

/// First alias whose value is present: not missing, not null, not an empty string.
fn first_present<'a>(
    raw: &'a Value,
    keys: &'static [&'static str],
) -> Option<(&'static str, &'a Value)> {
    keys.iter().find_map(|k| {
        let v = raw.get(*k)?;
        let present = match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => true,
        };
        present.then_some((*k, v))
    })
}

/// Resolve and normalize an optional numeric field, logging and dropping malformed values.
fn optional_numeric(raw: &Value, keys: &'static [&'static str]) -> Option<U256> {
    let (key, v) = first_present(raw, keys)?;
    match numeric::normalize(v) {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::debug!(field = key, error = %e, "ignoring malformed descriptor field");
            None
        }
    }
}

/// Wei attached to the call; absent or malformed means zero.
fn native_value(raw: &Value) -> U256 {
    let Some((key, v)) = first_present(raw, VALUE_KEYS) else {
        return U256::ZERO;
    };
    numeric::normalize(v).unwrap_or_else(|e| {
        tracing::warn!(field = key, error = %e, "malformed value field; sending zero");
        U256::ZERO
    })
}

fn optional_gas(raw: &Value) -> Option<u64> {
    let n = optional_numeric(raw, GAS_KEYS)?;
    numeric::to_u64(n)
        .inspect_err(|e| tracing::debug!(error = %e, "ignoring out-of-range gas hint"))
        .ok()
}

// Zero fee fields carry no information and are treated as absent.
fn optional_fee(raw: &Value, keys: &'static [&'static str]) -> Option<u128> {
    let n = optional_numeric(raw, keys).filter(|n| !n.is_zero())?;
    numeric::to_u128(n)
        .inspect_err(|e| tracing::debug!(error = %e, "ignoring out-of-range fee field"))
        .ok()
}

fn destination(raw: &Value) -> Result<Address, AttemptError> {
    let (_, v) = first_present(raw, TO_KEYS).ok_or(AttemptError::MissingDestination)?;
    let s = v
        .as_str()
        .ok_or_else(|| AttemptError::InvalidDestination(v.to_string()))?;
    Address::from_str(s.trim()).map_err(|e| AttemptError::InvalidDestination(format!("{s}: {e}")))
}

fn calldata(raw: &Value) -> Result<Bytes, AttemptError> {
    let Some((_, v)) = first_present(raw, CALLDATA_KEYS) else {
        return Ok(Bytes::new());
    };
    let s = v
        .as_str()
        .ok_or_else(|| AttemptError::InvalidCalldata(v.to_string()))?
        .trim();
    let h = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(h)
        .map(Bytes::from)
        .map_err(|e| AttemptError::InvalidCalldata(format!("{e}")))
}

/// Normalize a raw descriptor into a [`TransactionIntent`].
///
/// Pure: the same descriptor always yields the same intent.
pub fn normalize_descriptor(raw: &Value) -> Result<TransactionIntent, AttemptError> {
    if !raw.is_object() {
        return Err(AttemptError::MissingDestination);
    }
    let to = destination(raw)?;
    let data = calldata(raw)?;
    let value = native_value(raw);

    Ok(TransactionIntent {
        to,
        data,
        value,
        gas_hint: optional_gas(raw),
        max_fee_per_gas: optional_fee(raw, MAX_FEE_KEYS),
        max_priority_fee_per_gas: optional_fee(raw, MAX_PRIORITY_KEYS),
        gas_price: optional_fee(raw, GAS_PRICE_KEYS),
    })
}
