//! Platform payload normalization.
//!
//! Each supported platform owns one mapping from its native JSON into a
//! [`PurchaseEvent`]. Mapping never panics: anything unexpected becomes a
//! [`ParseError`] that the receiver answers with HTTP 400.
//!
//! Amounts are parsed as exact decimals from the JSON text. A JSON number is
//! read through its shortest round-trip representation, so `297.00` becomes
//! `297.00` and never `296.99999999999997`.

mod hotmart;
mod kiwify;

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{purchase::PurchaseEvent, tenant::Platform};

/// Why a payload could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload does not match the {platform} format: {reason}")]
    Schema { platform: Platform, reason: String },

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unsupported event type `{0}`")]
    UnsupportedEvent(String),
}

/// Parse a raw request body as JSON.
pub fn parse_body(body: &[u8]) -> Result<Value, ParseError> {
    serde_json::from_slice(body).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

/// Map a platform payload into the canonical purchase event.
pub fn normalize(platform: Platform, payload: &Value) -> Result<PurchaseEvent, ParseError> {
    match platform {
        Platform::Hotmart => hotmart::normalize(payload),
        Platform::Kiwify => kiwify::normalize(payload),
    }
}

/// Best-effort event name, read before full normalization so even rejected
/// deliveries are labeled in the event log.
pub fn event_type_hint(platform: Platform, payload: &Value) -> Option<String> {
    let field = match platform {
        Platform::Hotmart => payload.get("event"),
        Platform::Kiwify => payload
            .get("webhook_event_type")
            .or_else(|| payload.get("order_status")),
    };

    field.and_then(Value::as_str).map(str::to_string)
}

/// Amount as it appears on the wire: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawAmount {
    Number(serde_json::Number),
    Text(String),
}

impl RawAmount {
    pub(crate) fn to_decimal(&self, field: &'static str) -> Result<Decimal, ParseError> {
        let text = match self {
            RawAmount::Number(n) => n.to_string(),
            // "297,00" is how Brazilian exports format money
            RawAmount::Text(s) if !s.contains('.') && s.contains(',') => {
                decimal_comma(s.trim()).ok_or_else(|| ParseError::InvalidField {
                    field,
                    reason: format!("`{s}` is ambiguous; a decimal comma takes at most two digits"),
                })?
            }
            RawAmount::Text(s) => s.trim().to_string(),
        };

        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| ParseError::InvalidField {
                field,
                reason: format!("`{text}` is not a decimal amount ({e})"),
            })
    }
}

/// Largest amount a `NUMERIC(14,2)` money column holds.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// `"297,9"` and `"297,90"` read as decimals. `"1,500"` could be a thousands
/// separator, so more than two digits after the comma is refused.
fn decimal_comma(text: &str) -> Option<String> {
    let (units, cents) = text.split_once(',')?;
    if cents.is_empty() || cents.len() > 2 || cents.contains(',') {
        return None;
    }
    Some(format!("{units}.{cents}"))
}

/// Round to the two minor digits money is stored with, rejecting negatives
/// and anything the money columns cannot hold.
pub(crate) fn currency_amount(amount: Decimal, field: &'static str) -> Result<Decimal, ParseError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ParseError::InvalidField {
            field,
            reason: "amount must not be negative".to_string(),
        });
    }

    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded > MAX_AMOUNT {
        return Err(ParseError::InvalidField {
            field,
            reason: format!("amount exceeds {MAX_AMOUNT}"),
        });
    }
    rounded.rescale(2);
    Ok(rounded)
}

/// Trimmed non-empty string, or `MissingField`.
pub(crate) fn required(value: Option<&str>, field: &'static str) -> Result<String, ParseError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ParseError::MissingField(field))
}

/// Trimmed optional string, with blanks treated as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Product ids arrive as numbers (Hotmart) or strings (Kiwify).
pub(crate) fn id_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Display label for a payment method as shown on sales.
pub(crate) fn payment_method_label(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "CREDIT_CARD" => "Cartão de Crédito".to_string(),
        "BILLET" | "BOLETO" => "Boleto".to_string(),
        "PIX" => "Pix".to_string(),
        "PAYPAL" => "PayPal".to_string(),
        "DEBIT_CARD" => "Cartão de Débito".to_string(),
        _ => raw.trim().to_string(),
    }
}

pub(crate) fn from_epoch_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// RFC 3339, or the `YYYY-MM-DD HH:MM[:SS]` form some platforms send (read as UTC).
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn amount(value: Value) -> Result<Decimal, ParseError> {
        let raw: RawAmount = serde_json::from_value(value).unwrap();
        currency_amount(raw.to_decimal("price")?, "price")
    }

    #[test]
    fn json_numbers_become_exact_two_digit_amounts() {
        assert_eq!(amount(json!(297.00)).unwrap(), dec!(297.00));
        assert_eq!(amount(json!(297)).unwrap().to_string(), "297.00");
        assert_eq!(amount(json!(1500.55)).unwrap(), dec!(1500.55));
        assert_eq!(amount(json!(0.1)).unwrap(), dec!(0.10));
    }

    #[test]
    fn repeated_normalization_does_not_drift() {
        let mut value = dec!(297.00);
        for _ in 0..100 {
            value = amount(json!(value.to_string())).unwrap();
        }
        assert_eq!(value.to_string(), "297.00");
    }

    #[test]
    fn string_amounts_accept_decimal_comma() {
        assert_eq!(amount(json!("297,90")).unwrap(), dec!(297.90));
        assert_eq!(amount(json!(" 12.5 ")).unwrap(), dec!(12.50));
    }

    #[test]
    fn comma_with_three_digits_is_not_read_as_decimal() {
        assert!(matches!(
            amount(json!("1,500")),
            Err(ParseError::InvalidField { field: "price", .. })
        ));
        assert!(amount(json!("1,2,3")).is_err());
        assert_eq!(amount(json!("297,9")).unwrap(), dec!(297.90));
    }

    #[test]
    fn amounts_beyond_storage_precision_are_rejected() {
        assert_eq!(MAX_AMOUNT, dec!(999999999999.99));
        assert_eq!(amount(json!("999999999999.99")).unwrap(), MAX_AMOUNT);
        assert!(matches!(
            amount(json!("1000000000000.00")),
            Err(ParseError::InvalidField { field: "price", .. })
        ));
        assert!(amount(json!(1e15)).is_err());
    }

    #[test]
    fn bad_amounts_are_rejected() {
        assert!(matches!(
            amount(json!("abc")),
            Err(ParseError::InvalidField { field: "price", .. })
        ));
        assert!(matches!(
            amount(json!(-10)),
            Err(ParseError::InvalidField { field: "price", .. })
        ));
    }

    #[test]
    fn half_cents_round_away_from_zero() {
        assert_eq!(amount(json!("10.005")).unwrap(), dec!(10.01));
    }

    #[test]
    fn timestamps_in_both_formats() {
        let rfc = parse_timestamp(Some("2024-03-01T12:00:00-03:00")).unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-03-01T15:00:00+00:00");

        let plain = parse_timestamp(Some("2024-03-01 12:00")).unwrap();
        assert_eq!(plain.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        assert_eq!(parse_timestamp(Some("yesterday")), None);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            parse_body(b"hottok=abc"),
            Err(ParseError::InvalidJson(_))
        ));
    }
}
