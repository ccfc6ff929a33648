//! Request signing for OKX v5 private endpoints.
//!
//! The canonical message is `timestamp + METHOD + request_path + body`:
//! - `timestamp`: ISO-8601 UTC, whole seconds, trailing `Z`
//! - `request_path`: versioned path including the query string for GETs
//! - `body`: exact JSON sent, or the empty string when there is no payload
//!
//! The signature is base64(HMAC-SHA256(secret, message)). The exchange rejects
//! timestamps more than 30 seconds away from server time, so headers are built
//! immediately before each send and never reused.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::RequestBuilder;
use sha2::Sha256;

use fanout_core::Credentials;

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ACCESS_KEY: &str = "ACCESS-KEY";
pub const HEADER_ACCESS_SIGN: &str = "ACCESS-SIGN";
pub const HEADER_ACCESS_TIMESTAMP: &str = "ACCESS-TIMESTAMP";
pub const HEADER_ACCESS_PASSPHRASE: &str = "ACCESS-PASSPHRASE";

// =============================================================================
// Canonical message
// =============================================================================

/// Format a signing timestamp: `2020-12-08T09:08:57Z`.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Normalize a request body for signing.
///
/// An empty object carries no payload and signs as the empty string.
fn normalize_body(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        ""
    } else {
        body
    }
}

/// Build the canonical message for one request.
pub fn canonical_message(timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    format!(
        "{timestamp}{}{request_path}{}",
        method.to_ascii_uppercase(),
        normalize_body(body)
    )
}

/// Sign a request. Identical inputs always produce an identical signature.
pub fn sign(
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
    secret: &str,
) -> ExchangeResult<String> {
    let message = canonical_message(timestamp, method, request_path, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(format!("invalid HMAC key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

// =============================================================================
// Auth headers
// =============================================================================

/// Authentication headers for one private request.
#[derive(Clone)]
pub struct AuthHeaders {
    access_key: String,
    signature: String,
    timestamp: String,
    passphrase: String,
}

impl AuthHeaders {
    /// Sign `method request_path body` for `creds` at `now`.
    pub fn build(
        creds: &Credentials,
        method: &str,
        request_path: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> ExchangeResult<Self> {
        let timestamp = format_timestamp(now);
        let signature = sign(&timestamp, method, request_path, body, creds.secret_key())?;
        Ok(Self {
            access_key: creds.access_key().to_string(),
            signature,
            timestamp,
            passphrase: creds.passphrase().to_string(),
        })
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Attach the four `ACCESS-*` headers.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(HEADER_ACCESS_KEY, &self.access_key)
            .header(HEADER_ACCESS_SIGN, &self.signature)
            .header(HEADER_ACCESS_TIMESTAMP, &self.timestamp)
            .header(HEADER_ACCESS_PASSPHRASE, &self.passphrase)
    }
}

impl std::fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHeaders")
            .field("access_key", &fanout_core::mask_identifier(&self.access_key))
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
