//! Secret store boundary.
//!
//! Provider credentials never touch the ledger database; accounts only carry an
//! opaque `secret_ref` resolved through a [`SecretStore`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Error, Result, ValidationError};

/// Storage for credential blobs, keyed by an opaque reference.
pub trait SecretStore: Send + Sync {
    /// Returns the blob stored under `secret_ref` for `owner`.
    fn get_secret(&self, secret_ref: &str, owner: &str) -> Result<Option<String>>;

    /// Stores `payload` and returns the reference to persist on the account.
    fn store_secret(&self, payload: &str, owner: &str, purpose: &str) -> Result<String>;
}

/// Parsed credential blob.
///
/// Field names follow the aggregator and exchange conventions; anything else
/// lands in `extra`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Credentials {
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "Credential blob is not valid JSON: {}",
                e
            )))
        })
    }

    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// Keep secrets out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "***" } else { "-" };
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &mask(&self.api_secret))
            .field("access_token", &mask(&self.access_token))
            .field("client_id", &mask(&self.client_id))
            .field("client_secret", &mask(&self.client_secret))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves an account's credentials, if it references any.
pub fn load_credentials(
    store: &dyn SecretStore,
    secret_ref: Option<&str>,
    owner: &str,
) -> Result<Option<Credentials>> {
    let Some(secret_ref) = secret_ref else {
        return Ok(None);
    };
    match store.get_secret(secret_ref, owner)? {
        Some(blob) => Ok(Some(Credentials::from_blob(&blob)?)),
        None => Err(Error::Secret(format!(
            "No secret stored under reference '{}'",
            secret_ref
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_extra_fields() {
        let creds = Credentials::from_blob(
            r#"{"api_key":"k","api_secret":"s","passphrase":"p"}"#,
        )
        .unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("k"));
        assert_eq!(creds.extra.get("passphrase").map(String::as_str), Some("p"));
    }

    #[test]
    fn debug_output_masks_values() {
        let creds = Credentials {
            api_secret: Some("very-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn invalid_blob_is_a_validation_error() {
        assert!(matches!(
            Credentials::from_blob("not json"),
            Err(Error::Validation(_))
        ));
    }
}
