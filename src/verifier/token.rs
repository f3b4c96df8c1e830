//! HS256 session tokens.

use crate::session::Certificate;
use crate::modules::crypto::base64_encode;
use crate::types::{Address, Profile};
use crate::verifier::error::VerifyError;
use crate::wire::AuthenticatedUser;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    /// Expiry, epoch seconds, rounded up so the token lives at least as long
    /// as the `expires_at` reported to the client.
    pub exp: u64,
    /// Issue time, epoch seconds.
    pub iat: u64,
    pub user_address: Address,
    pub session_vk: String,
    pub creation_time: u64,
    pub ttl_min: u16,
    pub profile: Option<Profile>,
}

impl TokenClaims {
    pub fn for_certificate(
        issuer: &str,
        certificate: &Certificate,
        issued_at_ms: u64,
        expires_at_ms: u64,
        profile: Option<Profile>,
    ) -> Self {
        Self {
            iss: issuer.to_string(),
            sub: certificate.user.to_hex_literal(),
            exp: expires_at_ms.div_ceil(1000),
            iat: issued_at_ms / 1000,
            user_address: certificate.user,
            session_vk: base64_encode(&certificate.session_vk),
            creation_time: certificate.creation_time,
            ttl_min: certificate.ttl_min,
            profile,
        }
    }
}

impl From<TokenClaims> for AuthenticatedUser {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_address: claims.user_address,
            session_vk: claims.session_vk,
            token_expires_at: claims.exp * 1000,
            profile: claims.profile,
        }
    }
}

/// Mints and checks session tokens with a key derived from the master secret.
pub struct TokenIssuer {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(issuer: impl Into<String>, secret: &[u8; 32]) -> Self {
        Self {
            issuer: issuer.into(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn mint(&self, claims: &TokenClaims) -> Result<String, VerifyError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| VerifyError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Decode and validate a token. Expiry is checked against `now_ms` rather
    /// than the system clock.
    pub fn decode(&self, token: &str, now_ms: u64) -> Result<TokenClaims, VerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!("Token validation failed: {:?}", e);
                VerifyError::InvalidToken(e.to_string())
            })?
            .claims;

        if claims.exp.saturating_mul(1000) <= now_ms {
            return Err(VerifyError::InvalidToken("token expired".to_string()));
        }
        Ok(claims)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Result<&str, VerifyError> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| VerifyError::InvalidToken("expected Bearer token".to_string()))
}
