//! Client-facing error surface for the login flow.

use crate::encapsulation::EncapsulationError;
use crate::modules::secure_keys::KeyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why the verifier refused a certificate or sealed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    InvalidCertificate,
    CertificateExpired,
    InvalidSignature,
    InvalidSessionSignature,
    InvalidEncryptionKey,
    InvalidTransaction,
    ScopeMismatch,
    InvalidToken,
    /// Body could not be parsed into a request.
    InvalidInput,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvalidCertificate => "invalid_certificate",
            RejectionReason::CertificateExpired => "certificate_expired",
            RejectionReason::InvalidSignature => "invalid_signature",
            RejectionReason::InvalidSessionSignature => "invalid_session_signature",
            RejectionReason::InvalidEncryptionKey => "invalid_encryption_key",
            RejectionReason::InvalidTransaction => "invalid_ptb",
            RejectionReason::ScopeMismatch => "scope_mismatch",
            RejectionReason::InvalidToken => "invalid_token",
            RejectionReason::InvalidInput => "invalid_input",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let reason = match code {
            "invalid_certificate" => RejectionReason::InvalidCertificate,
            "certificate_expired" => RejectionReason::CertificateExpired,
            "invalid_signature" => RejectionReason::InvalidSignature,
            "invalid_session_signature" => RejectionReason::InvalidSessionSignature,
            "invalid_encryption_key" => RejectionReason::InvalidEncryptionKey,
            "invalid_ptb" => RejectionReason::InvalidTransaction,
            "scope_mismatch" => RejectionReason::ScopeMismatch,
            "invalid_token" => RejectionReason::InvalidToken,
            "invalid_input" => RejectionReason::InvalidInput,
            _ => return None,
        };
        Some(reason)
    }

    /// Whether recovery requires a fresh session key and wallet signature.
    ///
    /// The remaining reasons concern a single request; the identity is fine and
    /// a new request built from the same certificate may succeed.
    pub fn needs_new_session_key(&self) -> bool {
        matches!(
            self,
            RejectionReason::InvalidCertificate
                | RejectionReason::CertificateExpired
                | RejectionReason::InvalidSignature
                | RejectionReason::InvalidSessionSignature
                | RejectionReason::InvalidToken
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every login call resolves to a token, a missing capability, or one of these.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Session key has not been signed by the wallet")]
    NotSigned,

    #[error("Wallet signature denied: {0}")]
    SignatureDenied(String),

    #[error("Session key expired")]
    Expired,

    #[error("Failed to build transaction fragment: {0}")]
    ChainBuildError(String),

    #[error("Verifier rejected the request: {reason}")]
    VerificationRejected { reason: RejectionReason },

    #[error("Passport capability not found for this address")]
    CapabilityMissing,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Encapsulation error: {0}")]
    Encapsulation(#[from] EncapsulationError),
}

impl AuthError {
    /// Rebuild a typed error from a verifier `{error, message}` body.
    pub fn from_error_code(code: &str, message: &str) -> Self {
        if let Some(reason) = RejectionReason::from_code(code) {
            return AuthError::VerificationRejected { reason };
        }
        match code {
            "no_access" => AuthError::CapabilityMissing,
            _ => AuthError::Transport(format!("{}: {}", code, message)),
        }
    }

    /// Failure should be handled by creating and signing a new session key.
    pub fn needs_new_session_key(&self) -> bool {
        match self {
            AuthError::Expired | AuthError::SignatureDenied(_) => true,
            AuthError::VerificationRejected { reason } => reason.needs_new_session_key(),
            _ => false,
        }
    }
}
