//! Request signatures for the exchange private APIs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{ConnectorError, Result};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Kraken `API-Sign`: base64(HMAC-SHA512(base64-decoded secret,
/// path + SHA256(nonce + post data))).
pub fn kraken_signature(path: &str, nonce: u64, post_data: &str, secret_b64: &str) -> Result<String> {
    let secret = STANDARD.decode(secret_b64.trim()).map_err(|e| {
        ConnectorError::Validation(format!("API secret is not valid base64: {}", e))
    })?;
    let digest = Sha256::digest(format!("{}{}", nonce, post_data).as_bytes());

    let mut mac = HmacSha512::new_from_slice(&secret)
        .map_err(|e| ConnectorError::Validation(format!("Invalid HMAC secret length: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(&digest);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Bitstamp v2 `X-Auth-Signature`: uppercase hex HMAC-SHA256 over the
/// concatenated request description.
pub fn bitstamp_signature(secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ConnectorError::Validation(format!("Invalid HMAC secret length: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Strictly increasing millisecond nonces, even for calls within the same
/// millisecond.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn next(&self) -> u64 {
        let now = now_millis();
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kraken_reference_signature() {
        let signature = kraken_signature(
            "/0/private/AddOrder",
            1616492376594,
            "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
            "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==",
        )
        .unwrap();
        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn bitstamp_signature_is_uppercase_hex() {
        let message = "BITSTAMP keyPOSTwww.bitstamp.net/api/v2/user_transactions/\
application/x-www-form-urlencoded00000000-0000-0000-0000-0000000000001700000000000v2limit=1";
        assert_eq!(
            bitstamp_signature("secret", message).unwrap(),
            "B884A5466FFCA78A3214F7EC5842CD2A21168E10559AC10DF1CB40E167490D47"
        );
    }

    #[test]
    fn nonces_strictly_increase() {
        let nonces = NonceSource::default();
        let a = nonces.next();
        let b = nonces.next();
        let c = nonces.next();
        assert!(a < b && b < c);
    }

    #[test]
    fn rejects_non_base64_secret() {
        assert!(matches!(
            kraken_signature("/0/private/Ledgers", 1, "nonce=1", "***"),
            Err(ConnectorError::Validation(_))
        ));
    }
}
