//! Per-request key encapsulation.
//!
//! A [`DecryptionKey`] is a one-time P-256 scalar `d`. From it we derive
//!
//! * the encryption public key `E = d·G`, to which the verifier seals the
//!   released resource key, and
//! * the verification key `V = d·H` together with a Chaum–Pedersen proof that
//!   `log_G(E) = log_H(V)`. `H` is an independent generator obtained by
//!   hash-to-curve, so nobody knows its discrete log relative to `G`.
//!
//! The proof nonce is derived from `d`, so [`derive`] is a pure function.

use crate::modules::crypto::{self, custom_ecdh, CryptoError};
use crate::modules::secure_keys::COMPRESSED_POINT_LEN;
use elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use elliptic_curve::sec1::ToEncodedPoint;
use elliptic_curve::PrimeField;
use once_cell::sync::OnceCell;
use p256::{FieldBytes, NistP256, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

const GENERATOR_DST: &[u8] = b"PASSPORT-AUTH-V1_P256_XMD:SHA-256_SSWU_RO_H";
const CHALLENGE_DST: &[u8] = b"PASSPORT-AUTH-V1_DLEQ_CHALLENGE";
const NONCE_DST: &[u8] = b"PASSPORT-AUTH-V1_DLEQ_NONCE";
const SEAL_INFO: &[u8] = b"passport-auth/seal/v1";

const SCALAR_LEN: usize = 32;

/// Encoded length of a [`VerificationKey`]: `V || c || s`.
pub const VERIFICATION_KEY_LEN: usize = COMPRESSED_POINT_LEN + 2 * SCALAR_LEN;

static SECOND_GENERATOR: OnceCell<ProjectivePoint> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum EncapsulationError {
    #[error("Invalid encoding length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid curve point")]
    InvalidPoint,

    #[error("Invalid scalar encoding")]
    InvalidScalar,

    #[error("Hash-to-curve failed")]
    HashToCurve,

    #[error("Verification key proof does not match encryption key")]
    ProofMismatch,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// One-time secret scalar. Not `Clone`; the scalar is zeroized on drop.
pub struct DecryptionKey {
    secret: SecretKey,
}

impl DecryptionKey {
    /// Fresh full-entropy key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    fn scalar(&self) -> NonZeroScalar {
        self.secret.to_nonzero_scalar()
    }

    /// Encryption public key for this secret.
    pub fn encryption_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey(self.secret.public_key())
    }

    /// Open a key sealed to [`Self::encryption_key`].
    pub fn open(&self, sealed: &SealedKey) -> Result<Vec<u8>, EncapsulationError> {
        let ephemeral = PublicKey::from_sec1_bytes(&sealed.ephemeral_key)
            .map_err(|_| EncapsulationError::InvalidPoint)?;
        let shared = custom_ecdh(&self.scalar(), &ephemeral);
        let plaintext = crypto::unwrap_key(
            &shared,
            &sealed.ephemeral_key,
            SEAL_INFO,
            &sealed.nonce,
            &sealed.ciphertext,
        )?;
        Ok(plaintext)
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey([REDACTED])")
    }
}

/// `E = d·G`, compressed SEC1.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionPublicKey(PublicKey);

impl EncryptionPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncapsulationError> {
        if bytes.len() != COMPRESSED_POINT_LEN {
            return Err(EncapsulationError::InvalidLength {
                expected: COMPRESSED_POINT_LEN,
                got: bytes.len(),
            });
        }
        PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| EncapsulationError::InvalidPoint)
    }

    pub fn to_bytes(&self) -> [u8; COMPRESSED_POINT_LEN] {
        encode_point(&self.0.to_projective())
    }

    pub fn as_public_key(&self) -> &PublicKey {
        &self.0
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// `V = d·H` plus the DLEQ proof `(c, s)`.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationKey {
    point: PublicKey,
    challenge: Scalar,
    response: Scalar,
}

impl VerificationKey {
    pub fn to_bytes(&self) -> [u8; VERIFICATION_KEY_LEN] {
        let mut out = [0u8; VERIFICATION_KEY_LEN];
        out[..COMPRESSED_POINT_LEN].copy_from_slice(&encode_point(&self.point.to_projective()));
        out[COMPRESSED_POINT_LEN..COMPRESSED_POINT_LEN + SCALAR_LEN]
            .copy_from_slice(&self.challenge.to_repr());
        out[COMPRESSED_POINT_LEN + SCALAR_LEN..].copy_from_slice(&self.response.to_repr());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncapsulationError> {
        if bytes.len() != VERIFICATION_KEY_LEN {
            return Err(EncapsulationError::InvalidLength {
                expected: VERIFICATION_KEY_LEN,
                got: bytes.len(),
            });
        }
        let point = PublicKey::from_sec1_bytes(&bytes[..COMPRESSED_POINT_LEN])
            .map_err(|_| EncapsulationError::InvalidPoint)?;
        let challenge =
            decode_scalar(&bytes[COMPRESSED_POINT_LEN..COMPRESSED_POINT_LEN + SCALAR_LEN])?;
        let response = decode_scalar(&bytes[COMPRESSED_POINT_LEN + SCALAR_LEN..])?;
        Ok(Self {
            point,
            challenge,
            response,
        })
    }

    /// Check that this key was derived from the same secret as `encryption_key`.
    pub fn verify(&self, encryption_key: &EncryptionPublicKey) -> Result<(), EncapsulationError> {
        let h = second_generator()?;
        let e = encryption_key.0.to_projective();
        let v = self.point.to_projective();

        let a1 = ProjectivePoint::GENERATOR * self.response - e * self.challenge;
        let a2 = h * self.response - v * self.challenge;
        let expected = challenge(&e, &v, &a1, &a2)?;

        if expected != self.challenge {
            return Err(EncapsulationError::ProofMismatch);
        }
        Ok(())
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({})", hex::encode(self.to_bytes()))
    }
}

/// Derive the public encapsulation outputs for `key`. Pure and deterministic.
pub fn derive(
    key: &DecryptionKey,
) -> Result<(EncryptionPublicKey, VerificationKey), EncapsulationError> {
    let h = second_generator()?;
    let d: Scalar = *key.scalar();

    let e = ProjectivePoint::GENERATOR * d;
    let v = h * d;

    let k = NistP256::hash_to_scalar::<ExpandMsgXmd<Sha256>>(
        &[d.to_repr().as_slice(), encode_point(&v).as_slice()],
        &[NONCE_DST],
    )
    .map_err(|_| EncapsulationError::HashToCurve)?;
    let a1 = ProjectivePoint::GENERATOR * k;
    let a2 = h * k;
    let c = challenge(&e, &v, &a1, &a2)?;
    let s = k + c * d;

    let point = PublicKey::from_affine(v.to_affine()).map_err(|_| EncapsulationError::InvalidPoint)?;
    Ok((
        key.encryption_key(),
        VerificationKey {
            point,
            challenge: c,
            response: s,
        },
    ))
}

/// A key sealed to an [`EncryptionPublicKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    #[serde(with = "crypto::serde_base64")]
    pub ephemeral_key: Vec<u8>,
    #[serde(with = "crypto::serde_base64")]
    pub nonce: Vec<u8>,
    #[serde(with = "crypto::serde_base64")]
    pub ciphertext: Vec<u8>,
}

/// Seal `plaintext` so that only the holder of the matching [`DecryptionKey`]
/// can open it.
pub fn seal(
    recipient: &EncryptionPublicKey,
    plaintext: &[u8],
) -> Result<SealedKey, EncapsulationError> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_key = encode_point(&ephemeral.public_key().to_projective()).to_vec();
    let shared = custom_ecdh(&ephemeral.to_nonzero_scalar(), &recipient.0);
    let (nonce, ciphertext) = crypto::wrap_key(&shared, &ephemeral_key, SEAL_INFO, plaintext)?;
    Ok(SealedKey {
        ephemeral_key,
        nonce,
        ciphertext,
    })
}

fn second_generator() -> Result<ProjectivePoint, EncapsulationError> {
    SECOND_GENERATOR
        .get_or_try_init(|| {
            NistP256::hash_from_bytes::<ExpandMsgXmd<Sha256>>(
                &[b"passport-auth second generator".as_slice()],
                &[GENERATOR_DST],
            )
            .map_err(|_| EncapsulationError::HashToCurve)
        })
        .copied()
}

fn challenge(
    e: &ProjectivePoint,
    v: &ProjectivePoint,
    a1: &ProjectivePoint,
    a2: &ProjectivePoint,
) -> Result<Scalar, EncapsulationError> {
    NistP256::hash_to_scalar::<ExpandMsgXmd<Sha256>>(
        &[
            encode_point(e).as_slice(),
            encode_point(v).as_slice(),
            encode_point(a1).as_slice(),
            encode_point(a2).as_slice(),
        ],
        &[CHALLENGE_DST],
    )
    .map_err(|_| EncapsulationError::HashToCurve)
}

fn encode_point(point: &ProjectivePoint) -> [u8; COMPRESSED_POINT_LEN] {
    let encoded = point.to_affine().to_encoded_point(true);
    let mut out = [0u8; COMPRESSED_POINT_LEN];
    // Identity encodes as a single zero byte and is left as all zeros.
    let bytes = encoded.as_bytes();
    if bytes.len() == COMPRESSED_POINT_LEN {
        out.copy_from_slice(bytes);
    }
    out
}

fn decode_scalar(bytes: &[u8]) -> Result<Scalar, EncapsulationError> {
    let repr = FieldBytes::clone_from_slice(bytes);
    Option::from(Scalar::from_repr(repr)).ok_or(EncapsulationError::InvalidScalar)
}
