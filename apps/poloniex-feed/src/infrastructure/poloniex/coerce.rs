//! Scalar Coercion
//!
//! The feed is inconsistent about quoting numbers: prices arrive as
//! `"8190.00000000"`, side flags as bare `1`, trade ids either way. These
//! helpers work on the raw token text so no value ever passes through a float.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::codec::DecodeError;

/// Strip at most one leading and one trailing `"` from a raw token.
#[must_use]
pub fn unquote(token: &str) -> &str {
    let token = token.strip_prefix('"').unwrap_or(token);
    token.strip_suffix('"').unwrap_or(token)
}

/// Parse an integer, falling back to `0`.
///
/// Only for auxiliary fields where a bad value must not reject the record.
#[must_use]
pub fn parse_int_lenient(token: &str) -> i64 {
    unquote(token).trim().parse().unwrap_or(0)
}

/// Parse a signed integer field.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedField`] if the token is not an integer.
pub fn parse_i64(field: &'static str, token: &str) -> Result<i64, DecodeError> {
    unquote(token)
        .trim()
        .parse()
        .map_err(|_| DecodeError::malformed(field, token))
}

/// Parse a decimal field (plain or scientific notation).
///
/// # Errors
///
/// Returns [`DecodeError::MalformedField`] if the token is not a decimal.
pub fn parse_decimal(field: &'static str, token: &str) -> Result<Decimal, DecodeError> {
    let text = unquote(token).trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| DecodeError::malformed(field, token))
}

/// Parse a unix timestamp in whole seconds.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedField`] if the token is not an integer or
/// is out of range.
pub fn parse_unix_seconds(field: &'static str, token: &str) -> Result<DateTime<Utc>, DecodeError> {
    let seconds = parse_i64(field, token)?;
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| DecodeError::malformed(field, token))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(r#""8190.5""#, "8190.5" ; "quoted")]
    #[test_case("1", "1" ; "bare")]
    #[test_case("", "" ; "empty")]
    #[test_case(r#""""#, "" ; "empty quotes")]
    #[test_case(r#"""x"""#, r#""x""# ; "only one quote stripped per side")]
    #[test_case(r#""abc"#, "abc" ; "leading only")]
    #[test_case(r#"abc""#, "abc" ; "trailing only")]
    fn unquote_strips_one_quote_per_side(token: &str, expected: &str) {
        assert_eq!(unquote(token), expected);
    }

    #[test]
    fn lenient_int_defaults_to_zero() {
        assert_eq!(parse_int_lenient(r#""12345""#), 12345);
        assert_eq!(parse_int_lenient("42"), 42);
        assert_eq!(parse_int_lenient(r#""abc""#), 0);
        assert_eq!(parse_int_lenient(""), 0);
    }

    #[test]
    fn decimal_keeps_precision() {
        let price = parse_decimal("price", r#""0.00000001""#).unwrap();
        assert_eq!(price, Decimal::new(1, 8));
        assert_eq!(price.to_string(), "0.00000001");
    }

    #[test]
    fn decimal_accepts_scientific() {
        assert_eq!(
            parse_decimal("size", "1e-8").unwrap(),
            Decimal::new(1, 8)
        );
    }

    #[test]
    fn decimal_failure_is_malformed_field() {
        assert_eq!(
            parse_decimal("price", r#""n/a""#),
            Err(DecodeError::MalformedField {
                field: "price",
                raw_value: r#""n/a""#.to_string(),
            })
        );
    }

    #[test]
    fn i64_failure_is_malformed_field() {
        let err = parse_i64("eventTimeMs", r#""soon""#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedField {
                field: "eventTimeMs",
                ..
            }
        ));
    }

    #[test]
    fn unix_seconds_to_datetime() {
        let time = parse_unix_seconds("transactionTime", "1569578286").unwrap();
        assert_eq!(time.timestamp(), 1_569_578_286);
    }
}
