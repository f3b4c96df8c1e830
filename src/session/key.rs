use crate::error::AuthError;
use crate::modules::crypto::base64_encode;
use crate::modules::secure_keys::{SecureSigningKey, COMPRESSED_POINT_LEN, SIGNATURE_LEN};
use crate::session::certificate::{personal_message, Certificate, MINUTE_MS};
use crate::session::wallet::{WalletSignature, WalletSigner};
use crate::types::{Address, Clock, ObjectId, SystemClock};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_TTL_MINUTES: u16 = 10;

/// Local expiry fires this long before the certificate really ends.
pub const CLOCK_SKEW_TOLERANCE_MS: u64 = 10_000;

/// Ephemeral signing key for a single login attempt.
///
/// The private half never leaves this struct. The wallet signature is set at
/// most once; afterwards the key is immutable.
pub struct SessionKey {
    address: Address,
    scope_id: ObjectId,
    created_at: u64,
    ttl_minutes: u16,
    keypair: SecureSigningKey,
    signature: Option<WalletSignature>,
    clock: Arc<dyn Clock>,
}

impl SessionKey {
    pub fn create(address: Address, scope_id: ObjectId, ttl_minutes: u16) -> Self {
        Self::create_with_clock(address, scope_id, ttl_minutes, Arc::new(SystemClock))
    }

    pub fn create_with_clock(
        address: Address,
        scope_id: ObjectId,
        ttl_minutes: u16,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let created_at = clock.now_millis();
        Self {
            address,
            scope_id,
            created_at,
            ttl_minutes,
            keypair: SecureSigningKey::generate(),
            signature: None,
            clock,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn scope_id(&self) -> &ObjectId {
        &self.scope_id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn ttl_minutes(&self) -> u16 {
        self.ttl_minutes
    }

    pub fn session_public_key(&self) -> [u8; COMPRESSED_POINT_LEN] {
        self.keypair.public_key_bytes()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// The text the wallet is asked to sign.
    pub fn personal_message(&self) -> String {
        personal_message(
            &self.scope_id,
            self.ttl_minutes,
            self.created_at,
            &self.session_public_key(),
        )
    }

    /// Ask the wallet to sign [`Self::personal_message`].
    ///
    /// A no-op when already signed. On any failure the key stays unsigned and
    /// can be retried; dropping the returned future has the same effect.
    pub async fn request_signature(
        &mut self,
        signer: &dyn WalletSigner,
    ) -> Result<&Self, AuthError> {
        if self.signature.is_some() {
            return Ok(self);
        }

        if signer.address() != self.address {
            warn!(
                "Wallet address {} does not match session key address {}",
                signer.address(),
                self.address
            );
            return Err(AuthError::SignatureDenied(
                "wallet address does not match session key".to_string(),
            ));
        }

        let message = self.personal_message();
        let signature = signer
            .sign_personal_message(message.as_bytes())
            .await
            .map_err(|e| AuthError::SignatureDenied(e.to_string()))?;

        if signature.signer_address() != self.address
            || signature.verify_personal_message(message.as_bytes()).is_err()
        {
            warn!("Wallet returned a signature that does not verify");
            return Err(AuthError::SignatureDenied(
                "wallet returned an invalid signature".to_string(),
            ));
        }

        debug!("Session key for {} signed by wallet", self.address);
        self.signature = Some(signature);
        Ok(self)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(self.clock.now_millis())
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        let lifetime = u64::from(self.ttl_minutes) * MINUTE_MS;
        now_millis
            >= self
                .created_at
                .saturating_add(lifetime)
                .saturating_sub(CLOCK_SKEW_TOLERANCE_MS)
    }

    pub fn certificate(&self) -> Result<Certificate, AuthError> {
        let signature = self.signature.clone().ok_or(AuthError::NotSigned)?;
        Ok(Certificate {
            user: self.address,
            session_vk: self.session_public_key().to_vec(),
            creation_time: self.created_at,
            ttl_min: self.ttl_minutes,
            signature,
        })
    }

    /// Sign request bytes with the session keypair.
    pub fn sign_request(&self, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN], AuthError> {
        Ok(self.keypair.sign(payload)?)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("address", &self.address)
            .field("scope_id", &self.scope_id)
            .field("created_at", &self.created_at)
            .field("ttl_minutes", &self.ttl_minutes)
            .field("session_vk", &base64_encode(&self.session_public_key()))
            .field("signed", &self.is_signed())
            .finish()
    }
}
