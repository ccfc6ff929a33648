//! Account credentials.
//!
//! A `Credentials` value is constructed once at the trust boundary and passed
//! by value (or shared behind `Arc`) afterwards. Construction validates that the
//! triple is complete; nothing downstream rebuilds credentials ad hoc.
//!
//! Security notes:
//! - Secret key and passphrase are held in `Zeroizing` buffers.
//! - `Debug` never prints secret material.
//! - Display paths use [`Credentials::masked_id`].

use std::fmt;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};

/// Number of leading access-key characters kept by [`mask_identifier`].
const MASK_VISIBLE_CHARS: usize = 6;

/// Validated API credential triple for one exchange account.
#[derive(Clone)]
pub struct Credentials {
    access_key: String,
    secret_key: Zeroizing<String>,
    passphrase: Zeroizing<String>,
    label: Option<String>,
}

impl Credentials {
    /// Build credentials, failing fast on an incomplete triple.
    ///
    /// Each component is trimmed; an empty component is a `CoreError::Credential`.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Result<Self> {
        let access_key = access_key.into().trim().to_string();
        let secret_key = Zeroizing::new(secret_key.into().trim().to_string());
        let passphrase = Zeroizing::new(passphrase.into().trim().to_string());

        let mut missing = Vec::new();
        if access_key.is_empty() {
            missing.push("accessKey");
        }
        if secret_key.is_empty() {
            missing.push("secretKey");
        }
        if passphrase.is_empty() {
            missing.push("passphrase");
        }
        if !missing.is_empty() {
            return Err(CoreError::Credential(format!(
                "incomplete credential record, missing: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            access_key,
            secret_key,
            passphrase,
            label: None,
        })
    }

    /// Attach a human-readable label, shown before the masked key.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = (!label.trim().is_empty()).then(|| label.trim().to_string());
        self
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Account identifier safe for logs and notifications: the masked key,
    /// prefixed by the label when one is set.
    pub fn masked_id(&self) -> String {
        let masked = mask_identifier(&self.access_key);
        match &self.label {
            Some(label) => format!("{label} ({masked})"),
            None => masked,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.masked_id())
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Raw credential record as handed over by the credential store.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCredentials {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl TryFrom<RawCredentials> for Credentials {
    type Error = CoreError;

    fn try_from(raw: RawCredentials) -> Result<Self> {
        let label = raw.label;
        let creds = Credentials::new(raw.access_key, raw.secret_key, raw.passphrase)?;
        Ok(match label {
            Some(label) => creds.with_label(label),
            None => creds,
        })
    }
}

/// Truncate an identifier for display: `abcdef...`.
pub fn mask_identifier(id: &str) -> String {
    let visible: String = id.chars().take(MASK_VISIBLE_CHARS).collect();
    if id.chars().count() <= MASK_VISIBLE_CHARS {
        format!("{visible}...")
    } else {
        format!("{visible}...{}", id.chars().count() - MASK_VISIBLE_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_triple_accepted() {
        let creds = Credentials::new("ak-123456789", "secret", "pass").unwrap();
        assert_eq!(creds.access_key(), "ak-123456789");
        assert_eq!(creds.secret_key(), "secret");
        assert_eq!(creds.passphrase(), "pass");
    }

    #[test]
    fn test_incomplete_triple_rejected() {
        let err = Credentials::new("ak", "  ", "").unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, CoreError::Credential(_)));
        assert!(msg.contains("secretKey"));
        assert!(msg.contains("passphrase"));
        assert!(!msg.contains("accessKey"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("ak-123456789", "topsecret", "hunter2").unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("ak-123456789"));
    }

    #[test]
    fn test_masking() {
        assert_eq!(mask_identifier("abcdefghijkl"), "abcdef...6");
        assert_eq!(mask_identifier("abc"), "abc...");
    }

    #[test]
    fn test_masked_id_shows_label() {
        let creds = Credentials::new("ak-123456789", "secret", "pass").unwrap();
        assert_eq!(creds.masked_id(), "ak-123...6");

        let labelled = creds.with_label("  main  ");
        assert_eq!(labelled.masked_id(), "main (ak-123...6)");
        assert!(!labelled.masked_id().contains("ak-123456789"));

        let blank = Credentials::new("ak-123456789", "s", "p").unwrap().with_label(" ");
        assert_eq!(blank.label(), None);
        assert_eq!(blank.masked_id(), "ak-123...6");
    }

    #[test]
    fn test_raw_record_conversion() {
        let raw: RawCredentials = serde_json::from_str(
            r#"{"accessKey":"k1","secretKey":"s1","passphrase":"p1","label":"main"}"#,
        )
        .unwrap();
        let creds = Credentials::try_from(raw).unwrap();
        assert_eq!(creds.label(), Some("main"));

        let raw: RawCredentials =
            serde_json::from_str(r#"{"accessKey":"k1","secretKey":"s1"}"#).unwrap();
        assert!(Credentials::try_from(raw).is_err());
    }
}
