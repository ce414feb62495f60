//! Numeric helpers shared by every row shape.
//!
//! Upstream rows arrive with nulls, strings and the occasional `NaN` in
//! numeric columns. The deserializers here coerce all of that to zero (or
//! `None` for optional metrics) so nothing malformed reaches a percentage.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Rounds half up (toward positive infinity) at `dp` decimal places.
///
/// Values too close to the representable bound to shift are rounded
/// midpoint-away-from-zero instead.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let scale = Decimal::from(10_i64.pow(dp));
    let rounded = value
        .checked_mul(scale)
        .and_then(|scaled| scaled.checked_add(Decimal::new(5, 1)))
        .map(|shifted| shifted.floor() / scale)
        .unwrap_or_else(|| value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero));
    rounded.normalize()
}

/// Division that clamps to `Decimal::MAX` / `Decimal::MIN` on overflow.
/// A zero denominator clamps the same way; callers guard it first.
pub fn saturating_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    numerator.checked_div(denominator).unwrap_or_else(|| {
        if numerator.is_sign_negative() != denominator.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        }
    })
}

pub fn saturating_sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    values.into_iter().fold(Decimal::ZERO, Decimal::saturating_add)
}

/// `amount × rate / 100` without overflow.
pub fn percent_of(amount: Decimal, rate_percent: Decimal) -> Decimal {
    saturating_div(amount.saturating_mul(rate_percent), HUNDRED)
}

/// `numerator / denominator × 100`, rounded to a whole percent.
pub fn whole_percent(numerator: Decimal, denominator: Decimal) -> Decimal {
    round_half_up(saturating_div(numerator, denominator).saturating_mul(HUNDRED), 0)
}

/// `numerator / denominator × 100`, rounded to one decimal place.
pub fn tenth_percent(numerator: Decimal, denominator: Decimal) -> Decimal {
    round_half_up(saturating_div(numerator, denominator).saturating_mul(HUNDRED), 1)
}

pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => {
            let raw = number.to_string();
            Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)).ok()
        }
        Value::String(raw) => {
            let trimmed = raw.trim().replace(',', "");
            Decimal::from_str(&trimmed).or_else(|_| Decimal::from_scientific(&trimmed)).ok()
        }
        _ => None,
    }
}

pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_decimal).unwrap_or(Decimal::ZERO))
}

pub fn lenient_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_decimal))
}

pub fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let count = value
        .as_ref()
        .and_then(parse_decimal)
        .filter(|count| count.is_sign_positive())
        .and_then(|count| u64::try_from(count.trunc()).ok());
    Ok(count.unwrap_or(0))
}

pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(raw)) => matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde::Deserialize;

    use super::{
        lenient_count, lenient_decimal, lenient_optional_decimal, percent_of, round_half_up,
        tenth_percent, whole_percent, HUNDRED,
    };

    #[derive(Deserialize)]
    struct NumericFields {
        #[serde(default, deserialize_with = "lenient_decimal")]
        amount: Decimal,
        #[serde(default, deserialize_with = "lenient_optional_decimal")]
        rate: Option<Decimal>,
        #[serde(default, deserialize_with = "lenient_count")]
        count: u64,
    }

    #[test]
    fn malformed_numbers_coerce_to_zero() {
        let fields: NumericFields =
            serde_json::from_str(r#"{"amount": null, "rate": "NaN", "count": -4}"#).expect("fields");
        assert_eq!(fields.amount, Decimal::ZERO);
        assert_eq!(fields.rate, None);
        assert_eq!(fields.count, 0);

        let missing: NumericFields = serde_json::from_str("{}").expect("fields");
        assert_eq!(missing.amount, Decimal::ZERO);
        assert_eq!(missing.count, 0);
    }

    #[test]
    fn numeric_strings_and_floats_are_accepted() {
        let fields: NumericFields =
            serde_json::from_str(r#"{"amount": "1,250.50", "rate": 12.5, "count": 3.0}"#)
                .expect("fields");
        assert_eq!(fields.amount, Decimal::new(125_050, 2));
        assert_eq!(fields.rate, Some(Decimal::new(125, 1)));
        assert_eq!(fields.count, 3);
    }

    #[test]
    fn rounding_matches_half_up_convention() {
        assert_eq!(round_half_up(Decimal::new(25, 1), 0), Decimal::from(3));
        assert_eq!(round_half_up(Decimal::new(-25, 1), 0), Decimal::from(-2));
        assert_eq!(round_half_up(Decimal::new(4_449, 3), 1), Decimal::new(44, 1));
        assert_eq!(round_half_up(Decimal::new(4_450, 3), 1), Decimal::new(45, 1));
    }

    #[test]
    fn huge_ratios_saturate_instead_of_overflowing() {
        let huge = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        let tiny = Decimal::new(1, 3);

        assert_eq!(whole_percent(huge, tiny), Decimal::MAX);
        assert_eq!(tenth_percent(-huge, tiny), Decimal::MIN);
        assert_eq!(percent_of(Decimal::MAX, Decimal::from(400)), Decimal::MAX / HUNDRED);
        assert_eq!(round_half_up(Decimal::MAX, 1), Decimal::MAX);
    }
}
