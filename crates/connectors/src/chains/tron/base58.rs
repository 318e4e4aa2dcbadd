//! Base58Check, for turning TronGrid's hex addresses into the `T...` form.

/// Raw Tron addresses are 21 bytes: the `0x41` network prefix and 20 bytes.
const ADDRESS_LEN: usize = 21;

/// `41`-prefixed hex address to base58check. Already-encoded addresses and
/// anything that isn't a 21-byte hex address pass through unchanged.
pub fn tron_address(hex_address: &str) -> String {
    if hex_address.starts_with('T') {
        return hex_address.to_string();
    }
    match hex::decode(hex_address.trim_start_matches("0x")) {
        Ok(bytes) if bytes.len() == ADDRESS_LEN => bs58::encode(bytes).with_check().into_string(),
        _ => hex_address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_tron_hex_addresses() {
        // USDT-TRC20 contract.
        assert_eq!(
            tron_address("41a614f803b6fd780986a42c78ec9c7f77e6ded13c"),
            "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
        );
        assert_eq!(
            tron_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"),
            "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
        );
    }

    #[test]
    fn leaves_garbage_untouched() {
        let multibyte = format!("41a{}", "€".repeat(13));
        assert_eq!(multibyte.len(), 42);
        assert_eq!(tron_address(&multibyte), multibyte);
        assert_eq!(tron_address("41zz"), "41zz");
        assert_eq!(tron_address("41a614f803"), "41a614f803");
    }
}
