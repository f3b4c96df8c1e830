//! Secure key handling with automatic zeroization.
//!
//! Private scalars live inside `secrecy::Secret` and are only exposed for the
//! duration of a single signing or derivation call.

use crate::modules::crypto::hkdf_sha256;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::SecretKey;
use rand_core::OsRng;
use secrecy::{ExposeSecret, Secret};
use std::fmt;

/// Length of a compressed SEC1 P-256 public key.
pub const COMPRESSED_POINT_LEN: usize = 33;

/// Length of a fixed-size `r || s` ECDSA P-256 signature.
pub const SIGNATURE_LEN: usize = 64;

/// HKDF salt for keys derived from the verifier master secret.
const MASTER_KDF_SALT: &[u8] = b"passport-auth/master/v1";

/// Error type for key operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid key size: expected {expected}, got {got}")]
    InvalidKeySize { expected: usize, got: usize },

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Cryptographic operation failed: {0}")]
    CryptoError(String),
}

/// ECDSA P-256 keypair whose private half stays inside a zeroizing wrapper.
///
/// The private half is never serialized and never leaves this process.
pub struct SecureSigningKey {
    inner: Secret<[u8; 32]>,
    verifying_key: VerifyingKey,
}

impl SecureSigningKey {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        Self {
            inner: Secret::new(signing_key.to_bytes().into()),
            verifying_key,
        }
    }

    /// Compressed SEC1 encoding of the public half.
    pub fn public_key_bytes(&self) -> [u8; COMPRESSED_POINT_LEN] {
        let mut out = [0u8; COMPRESSED_POINT_LEN];
        out.copy_from_slice(self.verifying_key.to_encoded_point(true).as_bytes());
        out
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Sign `message` (SHA-256 digest, deterministic RFC 6979 nonce).
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], KeyError> {
        let signing_key = SigningKey::from_bytes(self.inner.expose_secret().into())
            .map_err(|e| KeyError::CryptoError(e.to_string()))?;
        let signature: Signature = signing_key.sign(message);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

impl fmt::Debug for SecureSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureSigningKey([REDACTED])")
    }
}

/// Verify an ECDSA P-256 signature against a SEC1-encoded public key.
pub fn verify_p256(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| KeyError::InvalidFormat(format!("Invalid P-256 public key: {}", e)))?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| KeyError::InvalidFormat(format!("Invalid ES256 signature format: {}", e)))?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| KeyError::CryptoError("signature does not verify".to_string()))
}

/// Verifier master secret (P-256 scalar) from which the token signing key and
/// per-resource keys are derived.
pub struct MasterSecret {
    inner: Secret<[u8; 32]>,
}

impl MasterSecret {
    /// Create from raw bytes.
    ///
    /// The input bytes are copied and the original should be zeroized by the caller.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidKeySize {
                expected: 32,
                got: bytes.len(),
            });
        }

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(bytes);

        Ok(Self {
            inner: Secret::new(key_array),
        })
    }

    /// Create from SEC1-encoded PEM.
    pub fn from_sec1_pem(pem_content: &str) -> Result<Self, KeyError> {
        let parsed =
            pem::parse(pem_content.as_bytes()).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;

        if parsed.tag() != "EC PRIVATE KEY" {
            return Err(KeyError::InvalidFormat(format!(
                "Expected EC PRIVATE KEY, got {}",
                parsed.tag()
            )));
        }

        let secret_key = SecretKey::from_sec1_der(parsed.contents())
            .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;

        Self::from_bytes(secret_key.to_bytes().as_slice())
    }

    /// Generate a random master secret, for development and tests.
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        Self {
            inner: Secret::new(secret_key.to_bytes().into()),
        }
    }

    /// HMAC key used to sign session tokens.
    pub fn token_signing_key(&self) -> Result<[u8; 32], KeyError> {
        self.derive(b"session-token")
    }

    /// Symmetric key released to holders of the capability for `resource_id`.
    pub fn resource_key(&self, resource_id: &[u8]) -> Result<[u8; 32], KeyError> {
        let mut info = b"resource-key:".to_vec();
        info.extend_from_slice(resource_id);
        self.derive(&info)
    }

    /// Secret for integrity tags on cached chain reads.
    pub fn cache_integrity_secret(&self) -> Result<[u8; 32], KeyError> {
        self.derive(b"chain-cache")
    }

    fn derive(&self, info: &[u8]) -> Result<[u8; 32], KeyError> {
        hkdf_sha256(self.inner.expose_secret(), MASTER_KDF_SALT, info)
            .map_err(|e| KeyError::CryptoError(e.to_string()))
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}
