use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::{Aead, Key};
use aes_gcm::Aes256Gcm;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use hkdf::Hkdf;
use p256::{NonZeroScalar, PublicKey};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Errors raised by the symmetric wrapping helpers.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("HKDF expansion failed: {0}")]
    Hkdf(String),

    #[error("AES-GCM encryption failed")]
    Encrypt,

    #[error("AES-GCM decryption failed")]
    Decrypt,

    #[error("Invalid nonce length: expected {NONCE_LEN}, got {0}")]
    NonceLength(usize),
}

/// Performs ECDH and returns the x-coordinate of the shared point (32 bytes).
pub fn custom_ecdh(private_scalar: &NonZeroScalar, public_key: &PublicKey) -> [u8; 32] {
    use elliptic_curve::point::AffineCoordinates;
    let shared_point = (public_key.to_projective() * **private_scalar).to_affine();
    let mut out = [0u8; 32];
    out.copy_from_slice(shared_point.x().as_slice());
    out
}

/// Derive a 32-byte symmetric key with HKDF-SHA256.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hkdf.expand(info, &mut okm)
        .map_err(|e| CryptoError::Hkdf(e.to_string()))?;
    Ok(okm)
}

/// Wrap `plaintext` under a key derived from `shared_secret`.
///
/// Returns `(nonce, ciphertext)`; the ciphertext carries the 16-byte GCM tag.
pub fn wrap_key(
    shared_secret: &[u8],
    salt: &[u8],
    info: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let derived_key = hkdf_sha256(shared_secret, salt, info)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let nonce_ga = GenericArray::from_slice(&nonce);

    let key = Key::<Aes256Gcm>::from(derived_key);
    let cipher = Aes256Gcm::new(&key);
    let ciphertext = cipher
        .encrypt(nonce_ga, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    Ok((nonce.to_vec(), ciphertext))
}

/// Inverse of [`wrap_key`].
pub fn unwrap_key(
    shared_secret: &[u8],
    salt: &[u8],
    info: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::NonceLength(nonce.len()));
    }
    let derived_key = hkdf_sha256(shared_secret, salt, info)?;
    let key = Key::<Aes256Gcm>::from(derived_key);
    let cipher = Aes256Gcm::new(&key);
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Blake2b with a 256-bit output, as used for chain addresses and storage keys.
pub fn blake2b_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Base64 encode data using standard encoding
pub fn base64_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(data)
}

/// Base64 decode data using standard encoding
pub fn base64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(data)
}

/// Serde adapter for byte fields carried as standard base64 strings.
pub mod serde_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&super::base64_encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::base64_decode(&encoded).map_err(serde::de::Error::custom)
    }
}
