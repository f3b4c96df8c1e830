//! Sealed token requests.
//!
//! A request bundles the approval-call fragment, fresh encapsulation outputs
//! and the certificate. The session key signs all three together, so none of
//! them can be swapped under a different certificate.

use crate::chain::fragment::{MoveCall, TransactionFragmentBuilder};
use crate::encapsulation::{self, DecryptionKey};
use crate::error::AuthError;
use crate::modules::crypto;
use crate::modules::secure_keys::{verify_p256, KeyError};
use crate::session::{Certificate, SessionKey};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

const REQUEST_SIGNING_DOMAIN: &[u8] = b"passport-auth/sealed-token-request/v1";

/// Body of `POST /auth/session_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedTokenRequest {
    #[serde(with = "crypto::serde_base64")]
    pub ptb: Vec<u8>,
    #[serde(with = "crypto::serde_base64")]
    pub enc_key: Vec<u8>,
    #[serde(with = "crypto::serde_base64")]
    pub enc_verification_key: Vec<u8>,
    #[serde(with = "crypto::serde_base64")]
    pub request_signature: Vec<u8>,
    pub certificate: Certificate,
}

impl SealedTokenRequest {
    /// Canonical bytes covered by `request_signature`.
    pub fn signing_payload(ptb: &[u8], enc_key: &[u8], enc_verification_key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            REQUEST_SIGNING_DOMAIN.len() + 12 + ptb.len() + enc_key.len() + enc_verification_key.len(),
        );
        out.extend_from_slice(REQUEST_SIGNING_DOMAIN);
        for part in [ptb, enc_key, enc_verification_key] {
            out.extend_from_slice(&(part.len() as u32).to_le_bytes());
            out.extend_from_slice(part);
        }
        out
    }

    pub fn payload(&self) -> Vec<u8> {
        Self::signing_payload(&self.ptb, &self.enc_key, &self.enc_verification_key)
    }

    /// Check `request_signature` against the certificate's session key.
    pub fn verify_request_signature(&self) -> Result<(), KeyError> {
        verify_p256(
            &self.certificate.session_vk,
            &self.payload(),
            &self.request_signature,
        )
    }
}

/// A built request and the one-time secret that opens its response.
#[derive(Debug)]
pub struct PreparedRequest {
    pub request: SealedTokenRequest,
    pub decryption_key: DecryptionKey,
}

/// Build a sealed token request for `call`.
///
/// Local preconditions are checked before the fragment builder runs. Either a
/// complete request is returned or nothing is.
pub fn build_request(
    session_key: &SessionKey,
    fragments: &dyn TransactionFragmentBuilder,
    call: &MoveCall,
) -> Result<PreparedRequest, AuthError> {
    let certificate = session_key.certificate()?;

    if session_key.is_expired() {
        warn!("Refusing to build request with expired session key");
        return Err(AuthError::Expired);
    }

    let ptb = fragments
        .build_call(&call.target(), &call.args)
        .map_err(|e| AuthError::ChainBuildError(e.to_string()))?;

    let decryption_key = DecryptionKey::generate();
    let (enc_key, verification_key) = encapsulation::derive(&decryption_key)?;
    let enc_key = enc_key.to_bytes().to_vec();
    let enc_verification_key = verification_key.to_bytes().to_vec();

    let payload = SealedTokenRequest::signing_payload(&ptb, &enc_key, &enc_verification_key);
    let request_signature = session_key.sign_request(&payload)?.to_vec();

    debug!("Built sealed token request for {}", call);
    Ok(PreparedRequest {
        request: SealedTokenRequest {
            ptb,
            enc_key,
            enc_verification_key,
            request_signature,
            certificate,
        },
        decryption_key,
    })
}
