//! Payload normalization.
//!
//! Every adapter funnels its provider rows through [`normalize`], so shape
//! rules (required fields, currency casing, timezone handling) live in one
//! place.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use super::transactions_model::{Direction, NormalizedTransaction, TxType};
use crate::errors::{Result, ValidationError};

/// Optional hook that renders a fiat display string for an amount.
pub type DisplayConverter<'a> = &'a dyn Fn(&Decimal, &str) -> Option<String>;

const AMOUNT_KEYS: &[&str] = &["amount", "value"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "datetime", "date", "time"];
const TX_ID_KEYS: &[&str] = &["tx_id", "transaction_id", "id", "hash"];
const CURRENCY_KEYS: &[&str] = &["currency_code", "currency", "symbol", "asset"];

/// Normalizes a loosely-typed provider payload into a canonical transaction.
pub fn normalize(payload: &Value) -> Result<NormalizedTransaction> {
    normalize_with(payload, None)
}

/// Same as [`normalize`], attaching `display_amount` when a converter is given.
pub fn normalize_with(
    payload: &Value,
    converter: Option<DisplayConverter<'_>>,
) -> Result<NormalizedTransaction> {
    let map = payload.as_object().ok_or_else(|| {
        ValidationError::InvalidInput("Transaction payload must be an object".to_string())
    })?;

    let amount_value =
        first_present(map, AMOUNT_KEYS).ok_or_else(|| missing("amount"))?;
    let amount = parse_decimal(amount_value)?;

    let timestamp_value =
        first_present(map, TIMESTAMP_KEYS).ok_or_else(|| missing("timestamp"))?;
    let timestamp = parse_timestamp(timestamp_value)?;

    let tx_id = first_present(map, TX_ID_KEYS)
        .and_then(value_as_string)
        .ok_or_else(|| missing("tx_id"))?;

    let account_id = map
        .get("account_id")
        .and_then(value_as_string)
        .ok_or_else(|| missing("account_id"))?;

    let currency_raw = first_present(map, CURRENCY_KEYS)
        .and_then(value_as_string)
        .ok_or_else(|| missing("currency_code"))?;
    let currency_code = normalize_currency(&currency_raw);

    let direction = match map.get("direction").and_then(value_as_string) {
        Some(d) => Some(Direction::from_str(&d)?),
        None => None,
    };

    let tx_type = match map.get("type").and_then(value_as_string) {
        Some(t) => TxType::from_str(&t)?,
        None => infer_type(direction, amount),
    };

    let on_chain_units = match map.get("on_chain_units") {
        Some(v) if !v.is_null() => Some(parse_decimal(v)?),
        _ => None,
    };

    let raw = match map.get("raw") {
        Some(v) if !v.is_null() => v.clone(),
        _ => payload.clone(),
    };

    let display_amount = converter.and_then(|convert| convert(&amount, &currency_code));

    Ok(NormalizedTransaction {
        amount,
        currency_code,
        timestamp,
        merchant_name: optional_string(map, "merchant_name")
            .or_else(|| optional_string(map, "merchant")),
        counterparty: optional_string(map, "counterparty"),
        tx_id,
        account_id,
        tx_type,
        direction,
        on_chain_units,
        on_chain_symbol: optional_string(map, "on_chain_symbol"),
        raw,
        display_amount,
    })
}

/// Uppercases fiat and ticker codes, leaving contract and mint addresses untouched.
pub fn normalize_currency(code: &str) -> String {
    let trimmed = code.trim();
    if is_contract_address(trimmed) {
        trimmed.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// `0x`-prefixed 40-hex EVM contracts, or long alphanumeric mints/policy ids.
pub fn is_contract_address(code: &str) -> bool {
    if let Some(hex) = code.strip_prefix("0x").or_else(|| code.strip_prefix("0X")) {
        return hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    code.len() >= 32 && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parses timestamps in RFC 3339, naive date-time, date-only or unix-epoch form.
///
/// Values without an offset are taken as UTC. Epoch numbers above 10^12 are
/// read as milliseconds.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| invalid(format!("Unreadable epoch timestamp '{}'", n)))?;
            from_epoch(secs)
        }
        Value::String(s) => parse_timestamp_str(s.trim()),
        other => Err(invalid(format!("Unsupported timestamp value '{}'", other))),
    }
}

fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>> {
    if s.is_empty() {
        return Err(missing("timestamp"));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    if let Ok(secs) = s.parse::<f64>() {
        return from_epoch(secs);
    }
    Err(invalid(format!("Unrecognized timestamp '{}'", s)))
}

fn from_epoch(value: f64) -> Result<DateTime<Utc>> {
    let secs = if value.abs() >= 1e12 { value / 1000.0 } else { value };
    let whole = secs.trunc() as i64;
    let nanos = ((secs.fract()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    Utc.timestamp_opt(whole, nanos)
        .single()
        .ok_or_else(|| invalid(format!("Epoch timestamp out of range: {}", value)))
}

/// Parses a decimal from a JSON string or number, accepting scientific notation.
pub fn parse_decimal(value: &Value) -> Result<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(invalid(format!("Unsupported amount value '{}'", other))),
    };
    if text.is_empty() {
        return Err(missing("amount"));
    }
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| ValidationError::DecimalParse(e).into())
}

fn infer_type(direction: Option<Direction>, amount: Decimal) -> TxType {
    match direction {
        Some(Direction::Inflow) => TxType::Deposit,
        Some(Direction::Outflow) => TxType::Withdrawal,
        None if amount.is_sign_negative() => TxType::Withdrawal,
        None => TxType::Deposit,
    }
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null() && v.as_str().map(|s| !s.trim().is_empty()).unwrap_or(true))
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(value_as_string)
}

fn missing(field: &str) -> crate::Error {
    ValidationError::MissingField(field.to_string()).into()
}

fn invalid(message: String) -> crate::Error {
    ValidationError::InvalidInput(message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::{Datelike, Timelike};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn base_payload() -> Value {
        json!({
            "amount": "12.50",
            "currency_code": "usd",
            "timestamp": "2024-03-01T10:15:00Z",
            "tx_id": "tx-1",
            "account_id": "acc-1",
        })
    }

    #[test]
    fn normalizes_minimal_payload() {
        let tx = normalize(&base_payload()).unwrap();
        assert_eq!(tx.amount, dec!(12.50));
        assert_eq!(tx.currency_code, "USD");
        assert_eq!(tx.tx_id, "tx-1");
        assert_eq!(tx.account_id, "acc-1");
        assert_eq!(tx.tx_type, TxType::Deposit);
        assert_eq!(tx.direction, None);
        assert_eq!(tx.raw, base_payload());
    }

    #[test]
    fn missing_amount_is_a_validation_error() {
        let mut payload = base_payload();
        payload.as_object_mut().unwrap().remove("amount");
        let err = normalize(&payload).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField(ref f)) if f == "amount"
        ));
    }

    #[test]
    fn missing_timestamp_is_a_validation_error() {
        let mut payload = base_payload();
        payload.as_object_mut().unwrap().remove("timestamp");
        let err = normalize(&payload).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField(ref f)) if f == "timestamp"
        ));
    }

    #[test]
    fn blank_amount_counts_as_missing() {
        let mut payload = base_payload();
        payload["amount"] = json!("  ");
        assert!(normalize(&payload).is_err());
    }

    #[test]
    fn evm_contract_addresses_keep_their_case() {
        let mut payload = base_payload();
        payload["currency_code"] = json!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        let tx = normalize(&payload).unwrap();
        assert_eq!(tx.currency_code, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    }

    #[test]
    fn solana_mints_keep_their_case() {
        let mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        let mut payload = base_payload();
        payload["currency_code"] = json!(mint);
        assert_eq!(normalize(&payload).unwrap().currency_code, mint);
    }

    #[test]
    fn short_symbols_are_uppercased() {
        assert_eq!(normalize_currency(" eth "), "ETH");
        assert_eq!(normalize_currency("usdc"), "USDC");
        // Not a valid contract: wrong length
        assert_eq!(normalize_currency("0xabc"), "0XABC");
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let mut payload = base_payload();
        payload["timestamp"] = json!("2024-03-01 10:15:00");
        let tx = normalize(&payload).unwrap();
        assert_eq!(tx.timestamp.hour(), 10);
        assert_eq!(tx.timestamp.timezone(), Utc);
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        let ts = parse_timestamp(&json!("2024-03-01T10:15:00+02:00")).unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn date_only_and_epoch_timestamps() {
        let date = parse_timestamp(&json!("2024-03-01")).unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 1));

        let secs = parse_timestamp(&json!(1_700_000_000)).unwrap();
        let millis = parse_timestamp(&json!(1_700_000_000_000u64)).unwrap();
        assert_eq!(secs, millis);

        let fractional = parse_timestamp(&json!("1700000000.5")).unwrap();
        assert_eq!(fractional.timestamp(), 1_700_000_000);
    }

    #[test]
    fn direction_and_type_are_parsed() {
        let mut payload = base_payload();
        payload["direction"] = json!("outflow");
        payload["type"] = json!("transfer");
        let tx = normalize(&payload).unwrap();
        assert_eq!(tx.direction, Some(Direction::Outflow));
        assert_eq!(tx.tx_type, TxType::Transfer);
    }

    #[test]
    fn type_defaults_follow_direction() {
        let mut payload = base_payload();
        payload["direction"] = json!("outflow");
        assert_eq!(normalize(&payload).unwrap().tx_type, TxType::Withdrawal);
    }

    #[test]
    fn explicit_raw_is_preserved() {
        let mut payload = base_payload();
        payload["raw"] = json!({"provider": "row"});
        assert_eq!(normalize(&payload).unwrap().raw, json!({"provider": "row"}));
    }

    #[test]
    fn converter_only_sets_display_amount() {
        let convert = |amount: &Decimal, currency: &str| Some(format!("{} {} = $25.00", amount, currency));
        let tx = normalize_with(&base_payload(), Some(&convert)).unwrap();
        assert_eq!(tx.amount, dec!(12.50));
        assert_eq!(tx.currency_code, "USD");
        assert_eq!(tx.display_amount.as_deref(), Some("12.50 USD = $25.00"));
    }

    #[test]
    fn numeric_amounts_and_scientific_notation() {
        assert_eq!(parse_decimal(&json!(0.1)).unwrap(), dec!(0.1));
        assert_eq!(parse_decimal(&json!("1e-8")).unwrap(), dec!(0.00000001));
    }
}
