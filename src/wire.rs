//! JSON bodies exchanged with the verifier.

use crate::encapsulation::SealedKey;
use crate::modules::crypto;
use crate::session::{Certificate, WalletSignature};
use crate::types::{Address, ObjectId, Profile};
use serde::{Deserialize, Serialize};

/// Body of `POST /auth/session-key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyRequest {
    pub signature: WalletSignature,
    #[serde(with = "crypto::serde_base64")]
    pub session_key: Vec<u8>,
    pub address: Address,
    pub timestamp: u64,
    pub ttl_min: u16,
}

impl From<&Certificate> for SessionKeyRequest {
    fn from(certificate: &Certificate) -> Self {
        Self {
            signature: certificate.signature.clone(),
            session_key: certificate.session_vk.clone(),
            address: certificate.user,
            timestamp: certificate.creation_time,
            ttl_min: certificate.ttl_min,
        }
    }
}

impl From<SessionKeyRequest> for Certificate {
    fn from(request: SessionKeyRequest) -> Self {
        Certificate {
            user: request.address,
            session_vk: request.session_key,
            creation_time: request.timestamp,
            ttl_min: request.ttl_min,
            signature: request.signature,
        }
    }
}

/// What the verifier knows about a registered session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_address: Address,
    pub session_vk: String,
    pub expires_at: u64,
    pub passport_id: Option<ObjectId>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyResponse {
    pub credentials: Option<Credentials>,
    pub has_game_entry: bool,
    pub is_new_user: bool,
}

/// Response to a sealed token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokenResponse {
    pub auth_token: String,
    /// Epoch milliseconds.
    pub expires_at: u64,
    pub profile: Option<Profile>,
    /// Resource key sealed to the request's `enc_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<SealedKey>,
}

/// Body of `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_address: Address,
    pub session_vk: String,
    /// Epoch milliseconds.
    pub token_expires_at: u64,
    pub profile: Option<Profile>,
}

/// Error body returned by every verifier endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
