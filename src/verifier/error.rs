//! Error types for the verifier.

use crate::chain::error::ChainError;
use crate::error::{AuthError, RejectionReason};
use thiserror::Error;

/// Errors that can occur while verifying a certificate or sealed request.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Certificate expired at {expired_at}, now {now}")]
    CertificateExpired { expired_at: u64, now: u64 },

    #[error("Wallet signature invalid: {0}")]
    InvalidSignature(String),

    #[error("Request signature does not match session key")]
    InvalidSessionSignature,

    #[error("Invalid encryption key: {0}")]
    InvalidEncryptionKey(String),

    #[error("Invalid transaction fragment: {0}")]
    InvalidTransaction(String),

    #[error("Call not permitted for this scope: {0}")]
    ScopeMismatch(String),

    #[error("No passport capability for {0}")]
    NoAccess(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerifyError {
    /// Stable machine-readable code, used as the `error` field on the wire.
    pub fn as_str(&self) -> &'static str {
        match self.rejection_reason() {
            Some(reason) => reason.as_str(),
            None => match self {
                VerifyError::NoAccess(_) => "no_access",
                VerifyError::Chain(_) => "chain_unavailable",
                _ => "internal_error",
            },
        }
    }

    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        let reason = match self {
            VerifyError::InvalidCertificate(_) => RejectionReason::InvalidCertificate,
            VerifyError::CertificateExpired { .. } => RejectionReason::CertificateExpired,
            VerifyError::InvalidSignature(_) => RejectionReason::InvalidSignature,
            VerifyError::InvalidSessionSignature => RejectionReason::InvalidSessionSignature,
            VerifyError::InvalidEncryptionKey(_) => RejectionReason::InvalidEncryptionKey,
            VerifyError::InvalidTransaction(_) => RejectionReason::InvalidTransaction,
            VerifyError::ScopeMismatch(_) => RejectionReason::ScopeMismatch,
            VerifyError::InvalidToken(_) => RejectionReason::InvalidToken,
            VerifyError::NoAccess(_) | VerifyError::Chain(_) | VerifyError::Internal(_) => {
                return None
            }
        };
        Some(reason)
    }
}

impl From<VerifyError> for AuthError {
    fn from(e: VerifyError) -> Self {
        if let Some(reason) = e.rejection_reason() {
            return AuthError::VerificationRejected { reason };
        }
        match e {
            VerifyError::NoAccess(_) => AuthError::CapabilityMissing,
            other => AuthError::Transport(other.to_string()),
        }
    }
}
