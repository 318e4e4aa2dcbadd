//! Integer base units (wei, satoshi, lamports, drops) to decimals.

use rust_decimal::Decimal;

// Largest digit count that always fits the 96-bit mantissa.
const MAX_DIGITS: usize = 28;
const MAX_SCALE: i64 = 28;

/// Converts a base-10 integer string in base units to a decimal amount.
///
/// Low digits beyond the decimal's precision are truncated. Returns `None` for
/// non-numeric input or an integer part too large to represent.
pub fn units_to_decimal(raw: &str, decimals: u32) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return Some(Decimal::ZERO);
    }

    let mut keep = digits.len().min(MAX_DIGITS);
    let mut scale = decimals as i64 - (digits.len() - keep) as i64;
    if scale < 0 {
        return None;
    }
    if scale > MAX_SCALE {
        let extra = (scale - MAX_SCALE) as usize;
        if extra >= keep {
            return Some(Decimal::ZERO);
        }
        keep -= extra;
        scale = MAX_SCALE;
    }

    let mantissa: i128 = digits[..keep].parse().ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale as u32)
        .ok()
        .map(|d| d.normalize())
}

/// Same as [`units_to_decimal`] for `0x`-prefixed hex quantities.
pub fn hex_units_to_decimal(hex: &str, decimals: u32) -> Option<Decimal> {
    units_to_decimal(&hex_to_decimal_string(hex)?, decimals)
}

/// Arbitrary-length hex to base-10 digits.
pub fn hex_to_decimal_string(hex: &str) -> Option<String> {
    let hex = hex.trim();
    let body = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if body.is_empty() {
        return Some("0".to_string());
    }

    // Little-endian base-10 digits.
    let mut out: Vec<u8> = vec![0];
    for c in body.chars() {
        let mut carry = c.to_digit(16)?;
        for digit in out.iter_mut() {
            let value = *digit as u32 * 16 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            out.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while out.len() > 1 && out.last() == Some(&0) {
        out.pop();
    }
    Some(out.iter().rev().map(|d| char::from(b'0' + d)).collect())
}
