//! Wallet signer capability and the wallet signature envelope.
//!
//! A wallet signature is carried as `base64(flag || r||s || public_key)`. The
//! flag selects the scheme (only secp256r1 is accepted), and the chain address
//! of a key is `blake2b_256(flag || public_key)`. Personal messages are signed
//! behind a 3-byte intent prefix so they can never be confused with a
//! transaction.

use crate::modules::crypto::{self, blake2b_256};
use crate::modules::secure_keys::{
    verify_p256, KeyError, SecureSigningKey, COMPRESSED_POINT_LEN, SIGNATURE_LEN,
};
use crate::types::Address;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Scheme flag for secp256r1 wallet keys.
pub const SECP256R1_FLAG: u8 = 0x02;

/// Intent prefix for personal messages (scope, version, app id).
pub const PERSONAL_MESSAGE_INTENT: [u8; 3] = [3, 0, 0];

/// Errors reported by a wallet when asked to sign.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("User rejected the signature request")]
    Rejected,

    #[error("Signature request timed out")]
    Timeout,

    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
}

/// External wallet capability. Implementations may prompt a user and can take
/// arbitrarily long; callers race them against cancellation.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address of the account that will sign.
    fn address(&self) -> Address;

    /// Sign a personal message. The wallet adds the intent prefix itself.
    async fn sign_personal_message(&self, message: &[u8]) -> Result<WalletSignature, SignerError>;
}

/// Derive the chain address for a secp256r1 public key.
pub fn address_from_public_key(public_key: &[u8; COMPRESSED_POINT_LEN]) -> Address {
    Address::new(blake2b_256(&[&[SECP256R1_FLAG][..], &public_key[..]]))
}

/// Bytes actually signed for a personal message.
pub fn personal_message_signing_bytes(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PERSONAL_MESSAGE_INTENT.len() + message.len());
    out.extend_from_slice(&PERSONAL_MESSAGE_INTENT);
    out.extend_from_slice(message);
    out
}

#[derive(Clone, PartialEq, Eq)]
pub struct WalletSignature {
    signature: [u8; SIGNATURE_LEN],
    public_key: [u8; COMPRESSED_POINT_LEN],
}

impl WalletSignature {
    pub const ENCODED_LEN: usize = 1 + SIGNATURE_LEN + COMPRESSED_POINT_LEN;

    pub fn new(signature: [u8; SIGNATURE_LEN], public_key: [u8; COMPRESSED_POINT_LEN]) -> Self {
        Self {
            signature,
            public_key,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.push(SECP256R1_FLAG);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(KeyError::InvalidKeySize {
                expected: Self::ENCODED_LEN,
                got: bytes.len(),
            });
        }
        if bytes[0] != SECP256R1_FLAG {
            return Err(KeyError::InvalidFormat(format!(
                "Unsupported signature scheme flag 0x{:02x}",
                bytes[0]
            )));
        }
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[1..1 + SIGNATURE_LEN]);
        let mut public_key = [0u8; COMPRESSED_POINT_LEN];
        public_key.copy_from_slice(&bytes[1 + SIGNATURE_LEN..]);
        Ok(Self {
            signature,
            public_key,
        })
    }

    pub fn to_base64(&self) -> String {
        crypto::base64_encode(&self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes =
            crypto::base64_decode(encoded).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn public_key(&self) -> &[u8; COMPRESSED_POINT_LEN] {
        &self.public_key
    }

    /// Address of the key that produced this signature.
    pub fn signer_address(&self) -> Address {
        address_from_public_key(&self.public_key)
    }

    /// Verify this signature over a personal message.
    pub fn verify_personal_message(&self, message: &[u8]) -> Result<(), KeyError> {
        verify_p256(
            &self.public_key,
            &personal_message_signing_bytes(message),
            &self.signature,
        )
    }
}

impl fmt::Debug for WalletSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletSignature({})", self.to_base64())
    }
}

impl Serialize for WalletSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WalletSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// In-process wallet backed by a secp256r1 key. Used by the CLI tooling and
/// tests; browser and hardware wallets implement [`WalletSigner`] themselves.
#[derive(Debug)]
pub struct LocalWallet {
    key: SecureSigningKey,
    address: Address,
}

impl LocalWallet {
    pub fn generate() -> Self {
        let key = SecureSigningKey::generate();
        let address = address_from_public_key(&key.public_key_bytes());
        Self { key, address }
    }

    /// Synchronous signing, for callers that hold the wallet directly.
    pub fn sign(&self, message: &[u8]) -> Result<WalletSignature, KeyError> {
        let signature = self.key.sign(&personal_message_signing_bytes(message))?;
        Ok(WalletSignature::new(signature, self.key.public_key_bytes()))
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<WalletSignature, SignerError> {
        self.sign(message)
            .map_err(|e| SignerError::Unavailable(e.to_string()))
    }
}
