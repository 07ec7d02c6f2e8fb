//! Permissive Field Coercion
//!
//! Numeric fields arrive as JSON strings, floats or integers depending on
//! the channel and the server version. A field that cannot be read is
//! replaced by a sentinel and logged; the rest of the frame still decodes.
//!
//! | Field type       | Sentinel      |
//! |------------------|---------------|
//! | price / volume   | `Decimal::MAX`|
//! | count / id       | `0`           |
//! | timestamp        | Unix epoch    |

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use crate::infrastructure::metrics;

/// Sentinel for an unparseable price or volume.
pub const DECIMAL_SENTINEL: Decimal = Decimal::MAX;

/// Sentinel for an unparseable count or id.
pub const COUNT_SENTINEL: u64 = 0;

/// A field that could not be coerced to its wire type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot coerce field `{field}` from {raw}")]
pub struct CoercionFailure {
    /// Field name.
    pub field: &'static str,
    /// Raw JSON text of the value, or `<missing>`.
    pub raw: String,
}

impl CoercionFailure {
    fn new(field: &'static str, value: Option<&Value>) -> Self {
        Self {
            field,
            raw: value.map_or_else(|| "<missing>".to_string(), ToString::to_string),
        }
    }

    fn report(&self) {
        tracing::warn!(field = self.field, raw = %self.raw, "Field coercion failed, using sentinel");
        metrics::record_coercion_failure(self.field);
    }
}

fn parse_decimal_text(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Read a decimal from a string, integer or float value.
#[must_use]
pub fn try_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(text) => parse_decimal_text(text),
        Value::Number(number) => {
            if let Some(i) = number.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = number.as_u64() {
                Some(Decimal::from(u))
            } else {
                parse_decimal_text(&number.to_string())
            }
        }
        _ => None,
    }
}

/// Read a non-negative integer from a string, integer or integral float.
#[must_use]
pub fn try_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| try_decimal(value).filter(|d| d.fract().is_zero())?.to_u64()),
        Value::String(text) => text
            .trim()
            .parse::<u64>()
            .ok()
            .or_else(|| parse_decimal_text(text).filter(|d| d.fract().is_zero())?.to_u64()),
        _ => None,
    }
}

/// Strict decimal read that reports the failure instead of substituting.
///
/// # Errors
///
/// Returns [`CoercionFailure`] when the value is missing or unreadable.
pub fn decimal(value: Option<&Value>, field: &'static str) -> Result<Decimal, CoercionFailure> {
    value
        .and_then(try_decimal)
        .ok_or_else(|| CoercionFailure::new(field, value))
}

/// Decimal field with the [`DECIMAL_SENTINEL`] fallback.
#[must_use]
pub fn decimal_or_sentinel(value: Option<&Value>, field: &'static str) -> Decimal {
    decimal(value, field).unwrap_or_else(|failure| {
        failure.report();
        DECIMAL_SENTINEL
    })
}

/// Count or id field with the [`COUNT_SENTINEL`] fallback.
#[must_use]
pub fn count_or_sentinel(value: Option<&Value>, field: &'static str) -> u64 {
    value.and_then(try_u64).unwrap_or_else(|| {
        CoercionFailure::new(field, value).report();
        COUNT_SENTINEL
    })
}

/// Unix-seconds timestamp with the epoch fallback.
#[must_use]
pub fn timestamp_or_sentinel(value: Option<&Value>, field: &'static str) -> DateTime<Utc> {
    value
        .and_then(try_u64)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(|| {
            CoercionFailure::new(field, value).report();
            DateTime::UNIX_EPOCH
        })
}

/// Truthy-nonzero flag: `true`, any nonzero number, or a nonzero numeric
/// string. Everything else is `false`.
#[must_use]
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(text)) if text.trim().eq_ignore_ascii_case("true") => true,
        Some(v @ (Value::Number(_) | Value::String(_))) => {
            try_decimal(v).is_some_and(|d| !d.is_zero())
        }
        _ => false,
    }
}

/// Optional sequence number: `null` or absent means unsequenced.
///
/// # Errors
///
/// Returns [`CoercionFailure`], already logged and counted, when a sequence
/// is present but is not a non-negative integer.
pub fn sequence(value: Option<&Value>) -> Result<Option<u64>, CoercionFailure> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => try_u64(v).map(Some).ok_or_else(|| {
            let failure = CoercionFailure::new("sequence", value);
            failure.report();
            failure
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!("0.0512"), "0.0512" ; "string")]
    #[test_case(json!(" 12.5 "), "12.5" ; "padded string")]
    #[test_case(json!(42), "42" ; "integer")]
    #[test_case(json!(-3), "-3" ; "negative integer")]
    #[test_case(json!(0.25), "0.25" ; "float")]
    #[test_case(json!("1e-7"), "0.0000001" ; "scientific string")]
    fn decimals(value: Value, expected: &str) {
        assert_eq!(try_decimal(&value), Decimal::from_str(expected).ok());
    }

    #[test_case(json!("abc") ; "text")]
    #[test_case(json!(null) ; "null")]
    #[test_case(json!([1]) ; "array")]
    #[test_case(json!(true) ; "bool")]
    fn undecodable_decimals(value: Value) {
        assert_eq!(try_decimal(&value), None);
    }

    #[test]
    fn sentinels_on_failure() {
        assert_eq!(decimal_or_sentinel(Some(&json!("n/a")), "last"), Decimal::MAX);
        assert_eq!(decimal_or_sentinel(None, "last"), Decimal::MAX);
        assert_eq!(count_or_sentinel(Some(&json!("x")), "trade_id"), 0);
        assert_eq!(
            timestamp_or_sentinel(Some(&json!(-1)), "trade_time"),
            DateTime::UNIX_EPOCH
        );
    }

    #[test]
    fn strict_decimal_reports_field() {
        let failure = decimal(Some(&json!({})), "rate").unwrap_err();
        assert_eq!(failure.field, "rate");
        assert_eq!(failure.raw, "{}");
    }

    #[test_case(json!(12), Some(12) ; "integer")]
    #[test_case(json!("12"), Some(12) ; "string")]
    #[test_case(json!(12.0), Some(12) ; "integral float")]
    #[test_case(json!(12.5), None ; "fractional float")]
    #[test_case(json!(-1), None ; "negative")]
    fn unsigned(value: Value, expected: Option<u64>) {
        assert_eq!(try_u64(&value), expected);
    }

    #[test_case(Some(json!(1)), true ; "one")]
    #[test_case(Some(json!(0)), false ; "zero")]
    #[test_case(Some(json!("1")), true ; "string one")]
    #[test_case(Some(json!("0")), false ; "string zero")]
    #[test_case(Some(json!(true)), true ; "bool")]
    #[test_case(Some(json!(null)), false ; "null")]
    #[test_case(None, false ; "missing")]
    fn flags(value: Option<Value>, expected: bool) {
        assert_eq!(flag(value.as_ref()), expected);
    }

    #[test]
    fn null_sequence_is_unsequenced() {
        assert_eq!(sequence(Some(&Value::Null)), Ok(None));
        assert_eq!(sequence(None), Ok(None));
        assert_eq!(sequence(Some(&json!(77))), Ok(Some(77)));
        assert_eq!(sequence(Some(&json!("78"))), Ok(Some(78)));
    }

    #[test_case(json!("abc") ; "text")]
    #[test_case(json!(-1) ; "negative")]
    #[test_case(json!(1.5) ; "fractional")]
    fn unreadable_sequence_is_a_failure(value: Value) {
        let failure = sequence(Some(&value)).unwrap_err();
        assert_eq!(failure.field, "sequence");
        assert_eq!(failure.raw, value.to_string());
    }

    proptest! {
        #[test]
        fn decimal_strings_parse_exactly(mantissa in any::<i64>(), scale in 0u32..18) {
            let expected = Decimal::new(mantissa, scale);
            let value = Value::String(expected.to_string());
            prop_assert_eq!(try_decimal(&value), Some(expected));
        }

        #[test]
        fn integers_parse_exactly(n in any::<u64>()) {
            prop_assert_eq!(try_u64(&json!(n)), Some(n));
            prop_assert_eq!(try_u64(&Value::String(n.to_string())), Some(n));
        }
    }
}
