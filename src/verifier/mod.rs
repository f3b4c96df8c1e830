//! Server-side verification of certificates and sealed token requests.
//!
//! Checks run cheapest first. The chain is read only after every signature
//! and proof has verified, so unauthenticated traffic never costs an RPC.

pub mod error;
pub mod token;

use crate::chain::client::ChainReader;
use crate::chain::fragment::CallFragment;
use crate::chain::types::{capability_object_id, PassportObject};
use crate::encapsulation::{self, EncryptionPublicKey, VerificationKey};
use crate::modules::crypto::base64_encode;
use crate::modules::secure_keys::{MasterSecret, COMPRESSED_POINT_LEN};
use crate::request::SealedTokenRequest;
use crate::session::certificate::MINUTE_MS;
use crate::session::Certificate;
use crate::types::{Address, Clock, ObjectId, SystemClock};
use crate::wire::{AuthenticatedUser, Credentials, SessionKeyRequest, SessionKeyResponse, SessionTokenResponse};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;

pub use error::VerifyError;
pub use token::{bearer_token, TokenClaims, TokenIssuer};

/// Default upper bound on a session key TTL.
pub const DEFAULT_MAX_TTL_MIN: u16 = 10;

/// Default `module::function` a fragment must call.
pub const DEFAULT_APPROVE_FUNCTION: &str = "passport::seal_approve";

pub const DEFAULT_TOKEN_ISSUER: &str = "passport-verifier";

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Package whose passports gate access. Certificates are bound to it.
    pub scope: ObjectId,
    pub approve_function: String,
    pub max_ttl_min: u16,
    pub issuer: String,
}

impl VerifierConfig {
    pub fn new(scope: ObjectId) -> Self {
        Self {
            scope,
            approve_function: DEFAULT_APPROVE_FUNCTION.to_string(),
            max_ttl_min: DEFAULT_MAX_TTL_MIN,
            issuer: DEFAULT_TOKEN_ISSUER.to_string(),
        }
    }
}

/// Verification API consumed by the HTTP layer.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// Validate a freshly signed certificate and report whether the user holds
    /// a passport.
    async fn verify_session_key(
        &self,
        request: SessionKeyRequest,
    ) -> Result<SessionKeyResponse, VerifyError>;

    /// Validate a sealed request and, if the passport exists, mint a token and
    /// release the resource key.
    async fn issue_session_token(
        &self,
        request: &SealedTokenRequest,
    ) -> Result<SessionTokenResponse, VerifyError>;

    /// Validate a bearer token.
    fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, VerifyError>;
}

pub struct Verifier<R> {
    config: VerifierConfig,
    chain: R,
    master: MasterSecret,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl<R: ChainReader> Verifier<R> {
    pub fn new(config: VerifierConfig, chain: R, master: MasterSecret) -> Result<Self, VerifyError> {
        let token_key = master
            .token_signing_key()
            .map_err(|e| VerifyError::Internal(e.to_string()))?;
        let tokens = TokenIssuer::new(config.issuer.clone(), &token_key);
        Ok(Self {
            config,
            chain,
            master,
            tokens,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn chain(&self) -> &R {
        &self.chain
    }

    fn check_certificate(&self, certificate: &Certificate, now: u64) -> Result<(), VerifyError> {
        if certificate.ttl_min == 0 || certificate.ttl_min > self.config.max_ttl_min {
            return Err(VerifyError::InvalidCertificate(format!(
                "ttl {} outside 1..={} minutes",
                certificate.ttl_min, self.config.max_ttl_min
            )));
        }

        if certificate.session_vk.len() != COMPRESSED_POINT_LEN {
            return Err(VerifyError::InvalidCertificate(format!(
                "session key must be {} bytes, got {}",
                COMPRESSED_POINT_LEN,
                certificate.session_vk.len()
            )));
        }

        if certificate.creation_time > now {
            return Err(VerifyError::InvalidCertificate(
                "certificate is dated in the future".to_string(),
            ));
        }

        if certificate.is_expired_at(now) {
            return Err(VerifyError::CertificateExpired {
                expired_at: certificate.expires_at(),
                now,
            });
        }

        certificate
            .verify_signature(&self.config.scope)
            .map_err(|e| VerifyError::InvalidSignature(e.to_string()))
    }

    /// Decode the fragment and return `(resource_id, passport_id)`.
    fn check_fragment(&self, ptb: &[u8]) -> Result<(ObjectId, ObjectId), VerifyError> {
        let call = CallFragment::decode_bytes(ptb)
            .map_err(|e| VerifyError::InvalidTransaction(e.to_string()))?
            .into_call();

        if call.package != self.config.scope {
            return Err(VerifyError::ScopeMismatch(format!(
                "package {} is not {}",
                call.package, self.config.scope
            )));
        }

        if call.function_path() != self.config.approve_function {
            return Err(VerifyError::ScopeMismatch(format!(
                "function {} is not {}",
                call.function_path(),
                self.config.approve_function
            )));
        }

        match call.args.as_slice() {
            [resource_id, passport_id] => Ok((*resource_id, *passport_id)),
            args => Err(VerifyError::InvalidTransaction(format!(
                "expected 2 arguments, got {}",
                args.len()
            ))),
        }
    }

    /// Read a passport and return it only if `user` owns it.
    async fn owned_passport(
        &self,
        id: &ObjectId,
        user: &Address,
    ) -> Result<Option<PassportObject>, VerifyError> {
        let Some(bytes) = self.chain.read_object(id).await? else {
            return Ok(None);
        };
        let passport = PassportObject::decode_bytes(&bytes)?;
        if passport.owner() != *user {
            warn!("Passport {} is owned by {}, not {}", id, passport.owner(), user);
            return Ok(None);
        }
        Ok(Some(passport))
    }
}

#[async_trait]
impl<R: ChainReader> SessionVerifier for Verifier<R> {
    async fn verify_session_key(
        &self,
        request: SessionKeyRequest,
    ) -> Result<SessionKeyResponse, VerifyError> {
        let certificate = Certificate::from(request);
        let now = self.clock.now_millis();

        self.check_certificate(&certificate, now)?;
        debug!("Certificate for {} verified", certificate.user);

        let passport_id = capability_object_id(&self.config.scope, &certificate.user);
        let passport = self.owned_passport(&passport_id, &certificate.user).await?;

        let has_game_entry = passport.is_some();
        let is_new_user = passport.as_ref().map_or(true, |p| p.played == 0);
        info!(
            "Session key registered for {} (passport: {})",
            certificate.user, has_game_entry
        );

        Ok(SessionKeyResponse {
            credentials: Some(Credentials {
                user_address: certificate.user,
                session_vk: base64_encode(&certificate.session_vk),
                expires_at: certificate.expires_at(),
                passport_id: passport.as_ref().map(|_| passport_id),
                profile: passport.as_ref().map(PassportObject::profile),
            }),
            has_game_entry,
            is_new_user,
        })
    }

    async fn issue_session_token(
        &self,
        request: &SealedTokenRequest,
    ) -> Result<SessionTokenResponse, VerifyError> {
        let certificate = &request.certificate;
        let now = self.clock.now_millis();

        // 1. Certificate
        self.check_certificate(certificate, now)?;

        // 2. Request signature by the session key
        request.verify_request_signature().map_err(|e| {
            warn!("Request signature failed for {}: {}", certificate.user, e);
            VerifyError::InvalidSessionSignature
        })?;

        // 3. Encapsulation proof
        let enc_key = EncryptionPublicKey::from_bytes(&request.enc_key)
            .map_err(|e| VerifyError::InvalidEncryptionKey(e.to_string()))?;
        VerificationKey::from_bytes(&request.enc_verification_key)
            .and_then(|vk| vk.verify(&enc_key))
            .map_err(|e| VerifyError::InvalidEncryptionKey(e.to_string()))?;

        // 4. Fragment target
        let (resource_id, passport_id) = self.check_fragment(&request.ptb)?;

        // 5. Capability, only now touching the chain
        let passport = self
            .owned_passport(&passport_id, &certificate.user)
            .await?
            .ok_or_else(|| VerifyError::NoAccess(certificate.user.to_hex_literal()))?;

        // 6. Release the resource key to the requester
        let resource_key = self
            .master
            .resource_key(resource_id.as_bytes())
            .map_err(|e| VerifyError::Internal(e.to_string()))?;
        let encrypted_key = encapsulation::seal(&enc_key, &resource_key)
            .map_err(|e| VerifyError::Internal(e.to_string()))?;

        // 7. Session token
        let expires_at = now + u64::from(certificate.ttl_min) * MINUTE_MS;
        let profile = Some(passport.profile());
        let claims = TokenClaims::for_certificate(
            self.tokens.issuer(),
            certificate,
            now,
            expires_at,
            profile,
        );
        let auth_token = self.tokens.mint(&claims)?;

        info!(
            "Issued session token for {} (resource {})",
            certificate.user, resource_id
        );

        Ok(SessionTokenResponse {
            auth_token,
            expires_at,
            profile,
            encrypted_key: Some(encrypted_key),
        })
    }

    fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, VerifyError> {
        let claims = self.tokens.decode(token, self.clock.now_millis())?;
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::error::ChainError;
    use crate::chain::fragment::{MoveCall, ScaleCallBuilder};
    use crate::request::build_request;
    use crate::session::{LocalWallet, SessionKey, WalletSigner};
    use crate::types::{ManualClock, Profile};
    use scale::Encode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const T0: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct MockChain {
        objects: Mutex<HashMap<ObjectId, Vec<u8>>>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ChainReader for MockChain {
        async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.objects.lock().unwrap().get(id).cloned())
        }

        async fn latest_block(&self) -> Result<u64, ChainError> {
            Ok(100)
        }
    }

    fn scope() -> ObjectId {
        ObjectId::from_hex_literal("0x5c09e").unwrap()
    }

    fn verifier(clock: Arc<ManualClock>) -> Verifier<MockChain> {
        Verifier::new(
            VerifierConfig::new(scope()),
            MockChain::default(),
            MasterSecret::from_bytes(&[0x11; 32]).unwrap(),
        )
        .unwrap()
        .with_clock(clock)
    }

    fn give_passport(verifier: &Verifier<MockChain>, user: Address, played: u32) -> ObjectId {
        let id = capability_object_id(&scope(), &user);
        let passport = PassportObject::new(
            user,
            Profile {
                rating: 1000,
                played,
                won: 0,
                lost: 0,
            },
        );
        verifier
            .chain()
            .objects
            .lock()
            .unwrap()
            .insert(id, passport.encode());
        id
    }

    async fn signed_key(wallet: &LocalWallet, clock: Arc<ManualClock>) -> SessionKey {
        let mut key = SessionKey::create_with_clock(wallet.address(), scope(), 10, clock);
        key.request_signature(wallet).await.unwrap();
        key
    }

    fn approve_call(passport_id: ObjectId) -> MoveCall {
        MoveCall {
            package: scope(),
            module: "passport".to_string(),
            function: "seal_approve".to_string(),
            args: vec![ObjectId::new([0xaa; 32]), passport_id],
        }
    }

    #[tokio::test]
    async fn test_session_key_without_passport() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let key = signed_key(&wallet, clock).await;

        let response = verifier
            .verify_session_key(SessionKeyRequest::from(&key.certificate().unwrap()))
            .await
            .unwrap();
        assert!(!response.has_game_entry);
        assert!(response.is_new_user);
        let credentials = response.credentials.unwrap();
        assert_eq!(credentials.user_address, wallet.address());
        assert_eq!(credentials.passport_id, None);
    }

    #[tokio::test]
    async fn test_session_key_with_passport() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let passport_id = give_passport(&verifier, wallet.address(), 4);
        let key = signed_key(&wallet, clock).await;

        let response = verifier
            .verify_session_key(SessionKeyRequest::from(&key.certificate().unwrap()))
            .await
            .unwrap();
        assert!(response.has_game_entry);
        assert!(!response.is_new_user);
        assert_eq!(response.credentials.unwrap().passport_id, Some(passport_id));
    }

    #[tokio::test]
    async fn test_rejects_certificate_for_other_scope() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let mut key = SessionKey::create_with_clock(
            wallet.address(),
            ObjectId::from_hex_literal("0xbad").unwrap(),
            10,
            clock,
        );
        key.request_signature(&wallet).await.unwrap();

        let result = verifier
            .verify_session_key(SessionKeyRequest::from(&key.certificate().unwrap()))
            .await;
        assert!(matches!(result, Err(VerifyError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_rejects_long_ttl_and_future_certificates() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();

        let mut long = SessionKey::create_with_clock(wallet.address(), scope(), 60, clock.clone());
        long.request_signature(&wallet).await.unwrap();
        let result = verifier
            .verify_session_key(SessionKeyRequest::from(&long.certificate().unwrap()))
            .await;
        assert!(matches!(result, Err(VerifyError::InvalidCertificate(_))));

        let future_clock = Arc::new(ManualClock::new(T0 + 5_000));
        let future = signed_key(&wallet, future_clock).await;
        let result = verifier
            .verify_session_key(SessionKeyRequest::from(&future.certificate().unwrap()))
            .await;
        assert!(matches!(result, Err(VerifyError::InvalidCertificate(_))));
    }

    #[tokio::test]
    async fn test_server_expiry_has_no_grace() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let key = signed_key(&wallet, clock.clone()).await;
        let request = SessionKeyRequest::from(&key.certificate().unwrap());

        clock.set(T0 + 10 * MINUTE_MS);
        assert!(verifier.verify_session_key(request.clone()).await.is_ok());

        clock.set(T0 + 10 * MINUTE_MS + 1);
        assert!(matches!(
            verifier.verify_session_key(request).await,
            Err(VerifyError::CertificateExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_issue_token_releases_resource_key() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let passport_id = give_passport(&verifier, wallet.address(), 0);
        let key = signed_key(&wallet, clock).await;

        let prepared = build_request(&key, &ScaleCallBuilder, &approve_call(passport_id)).unwrap();
        let response = verifier.issue_session_token(&prepared.request).await.unwrap();

        assert_eq!(response.expires_at, T0 + 10 * MINUTE_MS);
        assert_eq!(response.profile.unwrap().rating, 1000);

        let released = prepared
            .decryption_key
            .open(response.encrypted_key.as_ref().unwrap())
            .unwrap();
        let expected = MasterSecret::from_bytes(&[0x11; 32])
            .unwrap()
            .resource_key(&[0xaa; 32])
            .unwrap();
        assert_eq!(released, expected);

        let user = verifier.authenticate(&response.auth_token).unwrap();
        assert_eq!(user.user_address, wallet.address());
        assert_eq!(user.token_expires_at, T0 + 10 * MINUTE_MS);
    }

    #[tokio::test]
    async fn test_missing_passport_is_no_access() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let key = signed_key(&wallet, clock).await;
        let passport_id = capability_object_id(&scope(), &wallet.address());

        let prepared = build_request(&key, &ScaleCallBuilder, &approve_call(passport_id)).unwrap();
        let result = verifier.issue_session_token(&prepared.request).await;
        assert!(matches!(result, Err(VerifyError::NoAccess(_))));
    }

    #[tokio::test]
    async fn test_foreign_passport_is_no_access() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let other = LocalWallet::generate();
        let foreign = give_passport(&verifier, other.address(), 1);
        let key = signed_key(&wallet, clock).await;

        let prepared = build_request(&key, &ScaleCallBuilder, &approve_call(foreign)).unwrap();
        let result = verifier.issue_session_token(&prepared.request).await;
        assert!(matches!(result, Err(VerifyError::NoAccess(_))));
    }

    #[tokio::test]
    async fn test_bad_request_signature_never_reads_chain() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let passport_id = give_passport(&verifier, wallet.address(), 1);
        let key = signed_key(&wallet, clock).await;

        let mut request = build_request(&key, &ScaleCallBuilder, &approve_call(passport_id))
            .unwrap()
            .request;
        request.request_signature[10] ^= 0x01;

        let result = verifier.issue_session_token(&request).await;
        assert!(matches!(result, Err(VerifyError::InvalidSessionSignature)));
        assert_eq!(verifier.chain().reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_function_is_scope_mismatch() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let passport_id = give_passport(&verifier, wallet.address(), 1);
        let key = signed_key(&wallet, clock).await;

        let mut call = approve_call(passport_id);
        call.function = "withdraw".to_string();
        let prepared = build_request(&key, &ScaleCallBuilder, &call).unwrap();
        let result = verifier.issue_session_token(&prepared.request).await;
        assert!(matches!(result, Err(VerifyError::ScopeMismatch(_))));
        assert_eq!(verifier.chain().reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mismatched_verification_key_rejected() {
        let clock = Arc::new(ManualClock::new(T0));
        let verifier = verifier(clock.clone());
        let wallet = LocalWallet::generate();
        let passport_id = give_passport(&verifier, wallet.address(), 1);
        let key = signed_key(&wallet, clock).await;

        let a = build_request(&key, &ScaleCallBuilder, &approve_call(passport_id))
            .unwrap()
            .request;
        let b = build_request(&key, &ScaleCallBuilder, &approve_call(passport_id))
            .unwrap()
            .request;

        // Re-sign so only the proof is inconsistent.
        let mut forged = a.clone();
        forged.enc_verification_key = b.enc_verification_key;
        forged.request_signature = key.sign_request(&forged.payload()).unwrap().to_vec();

        let result = verifier.issue_session_token(&forged).await;
        assert!(matches!(result, Err(VerifyError::InvalidEncryptionKey(_))));
    }
}
