//! Tracking token codec
//!
//! Tokens are self-verifying bearer credentials binding a message (and
//! optionally a contact/account) to an engagement channel. The envelope is
//! `base64url(payload_json) + "." + base64url(hmac_sha256(payload_json))`,
//! so any process replica holding the signing secret can validate a token
//! with no shared lookup state, however long a mail client has cached it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reachly_common::types::{AccountId, ContactId, MessageId};
use reachly_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub message_id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<ContactId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    /// Issuance time in epoch milliseconds; advisory unless a max-age
    /// policy is configured
    pub issued_at: i64,
}

/// Signs and verifies tracking tokens
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    /// Create a codec from the configured signing secret.
    ///
    /// An empty secret is refused here so a misconfigured deployment fails
    /// at startup instead of signing tokens with an empty key.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(Error::Config(
                "token signing secret must be non-empty".to_string(),
            ));
        }

        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid HMAC key: {}", e)))?;

        Ok(Self { mac })
    }

    /// Issue a token for a message and optional correlation ids
    pub fn issue(
        &self,
        message_id: MessageId,
        contact_id: Option<ContactId>,
        account_id: Option<AccountId>,
    ) -> String {
        let payload = TokenPayload {
            message_id,
            contact_id,
            account_id,
            issued_at: Utc::now().timestamp_millis(),
        };

        // Serializing a plain struct into a buffer cannot fail
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        let mac = self.mac_for(&bytes);

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&bytes),
            URL_SAFE_NO_PAD.encode(mac)
        )
    }

    /// Verify a token and return its payload.
    ///
    /// Returns `None` for anything that is not a well-formed, correctly
    /// signed token: structural garbage and a forged MAC are treated
    /// identically, and the comparison is constant-time.
    pub fn verify(&self, token: &str) -> Option<TokenPayload> {
        let (payload_part, mac_part) = token.split_once('.')?;

        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
        let mac_bytes = URL_SAFE_NO_PAD.decode(mac_part).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&payload_bytes);
        mac.verify_slice(&mac_bytes).ok()?;

        serde_json::from_slice(&payload_bytes).ok()
    }

    /// Verify a token, additionally rejecting tokens older than `max_age`
    pub fn verify_with_max_age(&self, token: &str, max_age: Duration) -> Option<TokenPayload> {
        let payload = self.verify(token)?;

        let age_ms = Utc::now().timestamp_millis() - payload.issued_at;
        if age_ms < 0 || age_ms as u128 > max_age.as_millis() {
            return None;
        }

        Some(payload)
    }

    fn mac_for(&self, bytes: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(bytes);
        mac.finalize().into_bytes().to_vec()
    }
}
