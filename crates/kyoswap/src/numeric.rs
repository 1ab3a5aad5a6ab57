//! Canonical unsigned integers from loosely-typed JSON numbers.

use crate::errors::AttemptError;
use alloy::primitives::U256;
use serde_json::Value;

/// Normalize a JSON value holding a non-negative integer, a decimal string or a `0x` hex
/// string into a `U256`.
///
/// Defaulting is never done here; callers decide what a failure means for their field.
pub fn normalize(v: &Value) -> Result<U256, AttemptError> {
    match v {
        // Number text is kept verbatim (`arbitrary_precision`), so wei amounts past u64 survive.
        // Signs, fractions and exponents fail the digit check.
        Value::Number(n) => normalize_str(&n.to_string()),
        Value::String(s) => normalize_str(s),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => Err(
            AttemptError::InvalidNumericEncoding(format!("unsupported json type: {v}")),
        ),
    }
}

pub fn normalize_str(s: &str) -> Result<U256, AttemptError> {
    let t = s.trim();
    let invalid = || AttemptError::InvalidNumericEncoding(format!("{t:?}"));

    let (digits, radix) = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(h) => (h, 16_u64),
        None => (t, 10_u64),
    };
    let well_formed = !digits.is_empty()
        && digits.chars().all(|c| {
            if radix == 16 {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        });
    if !well_formed {
        return Err(invalid());
    }
    U256::from_str_radix(digits, radix).map_err(|_overflow| invalid())
}

/// Narrow a normalized value to `u64` (gas units).
pub fn to_u64(v: U256) -> Result<u64, AttemptError> {
    u64::try_from(v).map_err(|_overflow| AttemptError::InvalidNumericEncoding(format!("{v} > u64")))
}

/// Narrow a normalized value to `u128` (wei per gas).
pub fn to_u128(v: U256) -> Result<u128, AttemptError> {
    u128::try_from(v)
        .map_err(|_overflow| AttemptError::InvalidNumericEncoding(format!("{v} > u128")))
}
