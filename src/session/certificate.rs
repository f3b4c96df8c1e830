use crate::modules::crypto::{self, base64_encode};
use crate::modules::secure_keys::KeyError;
use crate::session::wallet::{address_from_public_key, WalletSignature};
use crate::types::{Address, ObjectId};
use serde::{Deserialize, Serialize};

/// Milliseconds per TTL minute.
pub const MINUTE_MS: u64 = 60_000;

/// Render the canonical personal message a wallet signs for a session key.
///
/// The timestamp is ISO-8601 UTC truncated to the second, so a given
/// `(scope, ttl, creation_time, session_vk)` always renders identically.
pub fn personal_message(
    scope: &ObjectId,
    ttl_min: u16,
    creation_time: u64,
    session_vk: &[u8],
) -> String {
    let timestamp = i64::try_from(creation_time)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| creation_time.to_string());
    format!(
        "Accessing keys of package {} for {} mins from {}, session key {}",
        scope.to_hex_literal(),
        ttl_min,
        timestamp,
        base64_encode(session_vk)
    )
}

/// Wallet-signed binding of a session public key to a chain address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub user: Address,
    #[serde(with = "crypto::serde_base64")]
    pub session_vk: Vec<u8>,
    pub creation_time: u64,
    pub ttl_min: u16,
    pub signature: WalletSignature,
}

impl Certificate {
    /// End of the validity window, in epoch milliseconds.
    pub fn expires_at(&self) -> u64 {
        self.creation_time
            .saturating_add(u64::from(self.ttl_min) * MINUTE_MS)
    }

    /// Strict expiry, with no skew allowance.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        now_millis > self.expires_at()
    }

    pub fn personal_message(&self, scope: &ObjectId) -> String {
        personal_message(scope, self.ttl_min, self.creation_time, &self.session_vk)
    }

    /// Check the wallet signature over the message for `scope` and that the
    /// signing key belongs to `user`.
    pub fn verify_signature(&self, scope: &ObjectId) -> Result<(), KeyError> {
        if address_from_public_key(self.signature.public_key()) != self.user {
            return Err(KeyError::InvalidFormat(format!(
                "signature key does not belong to {}",
                self.user
            )));
        }
        self.signature
            .verify_personal_message(self.personal_message(scope).as_bytes())
    }
}
