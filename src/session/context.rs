//! Login state machine.
//!
//! ```text
//! Unauthenticated ─▶ KeyCreated ─▶ Signed ─▶ TokenRequested ─▶ Authenticated
//!                         │           │             │                 │
//!                         └─▶ Expired ◀┘             └─▶ Unauthenticated ◀┘ (logout)
//! ```
//!
//! A context owns at most one session key. Logins are serialized, so
//! concurrent callers share one wallet prompt and one signed certificate.

use crate::chain::fragment::{MoveCall, TransactionFragmentBuilder};
use crate::chain::types::capability_object_id;
use crate::client::VerifierTransport;
use crate::error::AuthError;
use crate::request::build_request;
use crate::session::key::{SessionKey, DEFAULT_TTL_MINUTES};
use crate::session::wallet::WalletSigner;
use crate::session::Certificate;
use crate::types::{Clock, ObjectId, Profile, SystemClock};
use crate::wire::{Credentials, SessionKeyRequest};
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretVec};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    KeyCreated,
    Signed,
    TokenRequested,
    Authenticated,
    Expired,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Package scope the session key is bound to.
    pub scope: ObjectId,
    /// `module::function` of the approval call.
    pub approve_function: String,
    pub ttl_minutes: u16,
}

impl ContextConfig {
    pub fn new(scope: ObjectId) -> Self {
        Self {
            scope,
            approve_function: crate::verifier::DEFAULT_APPROVE_FUNCTION.to_string(),
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }
}

/// A verified session, with the released resource key if the verifier sent one.
pub struct SessionToken {
    pub auth_token: String,
    pub expires_at: u64,
    pub profile: Option<Profile>,
    resource_key: Option<SecretVec<u8>>,
}

impl SessionToken {
    pub fn resource_key(&self) -> Option<&[u8]> {
        self.resource_key
            .as_ref()
            .map(|key| key.expose_secret().as_slice())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("expires_at", &self.expires_at)
            .field("profile", &self.profile)
            .field("resource_key", &self.resource_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(SessionToken),
    /// Identity verified but no passport exists yet. The signed key is kept,
    /// so a later `login` goes straight to the token exchange.
    CapabilityMissing { credentials: Option<Credentials> },
}

pub struct SessionContext {
    config: ContextConfig,
    transport: Arc<dyn VerifierTransport>,
    fragments: Arc<dyn TransactionFragmentBuilder>,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<SessionKey>>,
    state: watch::Sender<SessionState>,
    /// Fired by `logout` to abort logins that hold `current`.
    interrupt: watch::Sender<CancellationToken>,
}

async fn cancelled(cancel: &CancellationToken, interrupt: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = interrupt.cancelled() => {}
    }
}

impl SessionContext {
    pub fn new(
        config: ContextConfig,
        transport: Arc<dyn VerifierTransport>,
        fragments: Arc<dyn TransactionFragmentBuilder>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        let (interrupt, _) = watch::channel(CancellationToken::new());
        Self {
            config,
            transport,
            fragments,
            clock: Arc::new(SystemClock),
            current: Mutex::new(None),
            state,
            interrupt,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Certificate of the current key, if it has been signed.
    pub async fn certificate(&self) -> Option<Certificate> {
        let current = self.current.lock().await;
        current.as_ref().and_then(|key| key.certificate().ok())
    }

    fn publish(&self, state: SessionState) {
        debug!("Session state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Run the login flow for `resource_id` as far as it can go.
    pub async fn login(
        &self,
        signer: &dyn WalletSigner,
        resource_id: ObjectId,
        cancel: &CancellationToken,
    ) -> Result<LoginOutcome, AuthError> {
        let interrupt = self.interrupt.borrow().clone();
        let mut current = self.current.lock().await;
        let address = signer.address();

        if let Some(key) = current.as_ref() {
            if key.is_expired() {
                info!("Session key for {} expired", key.address());
                *current = None;
                self.publish(SessionState::Expired);
            } else if *key.address() != address {
                debug!("Wallet changed, discarding session key");
                *current = None;
            }
        }

        let created = current.is_none();
        let key = current.get_or_insert_with(|| {
            SessionKey::create_with_clock(
                address,
                self.config.scope,
                self.config.ttl_minutes,
                self.clock.clone(),
            )
        });
        if created {
            self.publish(SessionState::KeyCreated);
        }

        if !key.is_signed() {
            let signed = tokio::select! {
                biased;
                _ = cancelled(cancel, &interrupt) => Err(AuthError::Cancelled),
                result = key.request_signature(signer) => result.map(|_| ()),
            };
            if let Err(e) = signed {
                warn!("Session key not signed: {}", e);
                self.publish(SessionState::KeyCreated);
                return Err(e);
            }
            self.publish(SessionState::Signed);
        }

        match self.exchange(key, resource_id, cancel, &interrupt).await {
            Ok(LoginOutcome::Authenticated(token)) => {
                info!("Authenticated {}", address);
                self.publish(SessionState::Authenticated);
                Ok(LoginOutcome::Authenticated(token))
            }
            Ok(missing) => {
                info!("No passport for {}; keeping signed session key", address);
                self.publish(SessionState::Signed);
                Ok(missing)
            }
            Err(AuthError::CapabilityMissing) => {
                self.publish(SessionState::Signed);
                Ok(LoginOutcome::CapabilityMissing { credentials: None })
            }
            Err(AuthError::Cancelled) => {
                self.publish(SessionState::Signed);
                Err(AuthError::Cancelled)
            }
            Err(AuthError::Expired) => {
                *current = None;
                self.publish(SessionState::Expired);
                Err(AuthError::Expired)
            }
            Err(e) => {
                warn!("Login failed, discarding session key: {}", e);
                *current = None;
                self.publish(SessionState::Unauthenticated);
                Err(e)
            }
        }
    }

    /// Register the signed key and trade it for a token.
    async fn exchange(
        &self,
        key: &SessionKey,
        resource_id: ObjectId,
        cancel: &CancellationToken,
        interrupt: &CancellationToken,
    ) -> Result<LoginOutcome, AuthError> {
        if key.is_expired() {
            return Err(AuthError::Expired);
        }

        let registration = SessionKeyRequest::from(&key.certificate()?);
        let registered = tokio::select! {
            biased;
            _ = cancelled(cancel, interrupt) => Err(AuthError::Cancelled),
            result = self.transport.register_session_key(&registration) => result,
        }?;

        if !registered.has_game_entry {
            return Ok(LoginOutcome::CapabilityMissing {
                credentials: registered.credentials,
            });
        }

        let passport_id = registered
            .credentials
            .as_ref()
            .and_then(|c| c.passport_id)
            .unwrap_or_else(|| capability_object_id(&self.config.scope, key.address()));

        let target = format!("{}::{}", self.config.scope, self.config.approve_function);
        let call = MoveCall::parse_target(&target, vec![resource_id, passport_id])
            .map_err(|e| AuthError::ChainBuildError(e.to_string()))?;

        let prepared = build_request(key, self.fragments.as_ref(), &call)?;
        self.publish(SessionState::TokenRequested);

        let response = tokio::select! {
            biased;
            _ = cancelled(cancel, interrupt) => Err(AuthError::Cancelled),
            result = self.transport.exchange_token(&prepared.request) => result,
        }?;

        let resource_key = match &response.encrypted_key {
            Some(sealed) => Some(SecretVec::new(prepared.decryption_key.open(sealed)?)),
            None => None,
        };

        Ok(LoginOutcome::Authenticated(SessionToken {
            auth_token: response.auth_token,
            expires_at: response.expires_at,
            profile: response.profile,
            resource_key,
        }))
    }

    /// Discard a key whose local TTL has run out. Returns the resulting state.
    pub async fn check_expiry(&self) -> SessionState {
        let mut current = self.current.lock().await;
        let expired = current.as_ref().is_some_and(|key| key.is_expired());
        if expired && matches!(self.state(), SessionState::KeyCreated | SessionState::Signed) {
            *current = None;
            self.publish(SessionState::Expired);
        }
        self.state()
    }

    /// Forget the session key. Also used when the server rejects the token.
    ///
    /// A login in progress is cancelled first and returns
    /// [`AuthError::Cancelled`].
    pub async fn logout(&self) {
        self.interrupt.send_replace(CancellationToken::new()).cancel();
        let mut current = self.current.lock().await;
        *current = None;
        self.publish(SessionState::Unauthenticated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::error::FragmentError;
    use crate::chain::fragment::ScaleCallBuilder;
    use crate::session::wallet::{LocalWallet, SignerError, WalletSignature};
    use crate::types::{Address, ManualClock};
    use crate::wire::{SessionKeyResponse, SessionTokenResponse};
    use crate::request::SealedTokenRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedTransport {
        has_game_entry: bool,
        exchange_error: Option<fn() -> AuthError>,
        exchanges: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(has_game_entry: bool) -> Self {
            Self {
                has_game_entry,
                exchange_error: None,
                exchanges: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VerifierTransport for ScriptedTransport {
        async fn register_session_key(
            &self,
            request: &SessionKeyRequest,
        ) -> Result<SessionKeyResponse, AuthError> {
            Ok(SessionKeyResponse {
                credentials: Some(Credentials {
                    user_address: request.address,
                    session_vk: String::new(),
                    expires_at: 0,
                    passport_id: None,
                    profile: None,
                }),
                has_game_entry: self.has_game_entry,
                is_new_user: !self.has_game_entry,
            })
        }

        async fn exchange_token(
            &self,
            request: &SealedTokenRequest,
        ) -> Result<SessionTokenResponse, AuthError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if let Some(make_error) = self.exchange_error {
                return Err(make_error());
            }
            assert!(request.verify_request_signature().is_ok());
            Ok(SessionTokenResponse {
                auth_token: "token".to_string(),
                expires_at: 1,
                profile: None,
                encrypted_key: None,
            })
        }
    }

    struct PendingWallet {
        address: Address,
    }

    #[async_trait]
    impl WalletSigner for PendingWallet {
        fn address(&self) -> Address {
            self.address
        }

        async fn sign_personal_message(
            &self,
            _message: &[u8],
        ) -> Result<WalletSignature, SignerError> {
            std::future::pending().await
        }
    }

    struct BrokenBuilder;

    impl TransactionFragmentBuilder for BrokenBuilder {
        fn build_call(&self, target: &str, _args: &[ObjectId]) -> Result<Vec<u8>, FragmentError> {
            Err(FragmentError::InvalidTarget(target.to_string()))
        }
    }

    struct RejectingWallet(LocalWallet);

    #[async_trait]
    impl WalletSigner for RejectingWallet {
        fn address(&self) -> Address {
            self.0.address()
        }

        async fn sign_personal_message(
            &self,
            _message: &[u8],
        ) -> Result<WalletSignature, SignerError> {
            Err(SignerError::Rejected)
        }
    }

    fn context(transport: ScriptedTransport) -> (SessionContext, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let context = SessionContext::new(
            ContextConfig::new(ObjectId::from_hex_literal("0x5c09e").unwrap()),
            transport.clone(),
            Arc::new(ScaleCallBuilder),
        );
        (context, transport)
    }

    #[tokio::test]
    async fn test_login_authenticates() {
        let (context, transport) = context(ScriptedTransport::new(true));
        let wallet = LocalWallet::generate();
        let mut states = context.subscribe();

        let outcome = context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        assert_eq!(context.state(), SessionState::Authenticated);
        assert_eq!(*states.borrow_and_update(), SessionState::Authenticated);
        assert_eq!(transport.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_capability_keeps_signed_key() {
        let (context, transport) = context(ScriptedTransport::new(false));
        let wallet = LocalWallet::generate();

        let outcome = context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::CapabilityMissing { .. }));
        assert_eq!(context.state(), SessionState::Signed);
        assert!(context.certificate().await.is_some());
        assert_eq!(transport.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejection_discards_key() {
        let mut transport = ScriptedTransport::new(true);
        transport.exchange_error = Some(|| AuthError::VerificationRejected {
            reason: crate::error::RejectionReason::InvalidSessionSignature,
        });
        let (context, _) = context(transport);
        let wallet = LocalWallet::generate();

        let result = context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AuthError::VerificationRejected { .. })));
        assert_eq!(context.state(), SessionState::Unauthenticated);
        assert!(context.certificate().await.is_none());
    }

    #[tokio::test]
    async fn test_fragment_failure_discards_key() {
        let transport = Arc::new(ScriptedTransport::new(true));
        let context = SessionContext::new(
            ContextConfig::new(ObjectId::from_hex_literal("0x5c09e").unwrap()),
            transport.clone(),
            Arc::new(BrokenBuilder),
        );
        let wallet = LocalWallet::generate();

        let result = context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AuthError::ChainBuildError(_))));
        assert_eq!(context.state(), SessionState::Unauthenticated);
        assert!(context.certificate().await.is_none());
        assert_eq!(transport.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capability_missing_at_exchange_is_an_outcome() {
        let mut transport = ScriptedTransport::new(true);
        transport.exchange_error = Some(|| AuthError::CapabilityMissing);
        let (context, _) = context(transport);
        let wallet = LocalWallet::generate();

        let outcome = context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::CapabilityMissing { .. }));
        assert_eq!(context.state(), SessionState::Signed);
    }

    #[tokio::test]
    async fn test_denied_signature_keeps_unsigned_key() {
        let (context, _) = context(ScriptedTransport::new(true));
        let wallet = RejectingWallet(LocalWallet::generate());

        let result = context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AuthError::SignatureDenied(_))));
        assert_eq!(context.state(), SessionState::KeyCreated);
        assert!(context.certificate().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_prompt_is_retryable() {
        let (context, _) = context(ScriptedTransport::new(true));
        let local = LocalWallet::generate();
        let pending = PendingWallet {
            address: local.address(),
        };

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = context.login(&pending, ObjectId::new([1; 32]), &cancel).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert_eq!(context.state(), SessionState::KeyCreated);

        // Same address, real wallet: the retained key is signed and used.
        let outcome = context
            .login(&local, ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_logout_cancels_login_in_progress() {
        let (context, _) = context(ScriptedTransport::new(true));
        let wallet = PendingWallet {
            address: LocalWallet::generate().address(),
        };

        let cancel = CancellationToken::new();
        let (result, _) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(context.login(&wallet, ObjectId::new([1; 32]), &cancel), async {
                tokio::task::yield_now().await;
                context.logout().await;
            })
        })
        .await
        .unwrap();

        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert!(!cancel.is_cancelled());
        assert_eq!(context.state(), SessionState::Unauthenticated);
        assert!(context.certificate().await.is_none());

        // Later logins are not affected by the earlier logout.
        let outcome = context
            .login(&LocalWallet::generate(), ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_local_expiry() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (context, _) = context(ScriptedTransport::new(false));
        let mut config = context.config.clone();
        config.ttl_minutes = 1;
        let context = SessionContext {
            config,
            ..context
        }
        .with_clock(clock.clone());
        let wallet = LocalWallet::generate();

        context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(context.state(), SessionState::Signed);

        clock.advance(61_000);
        assert_eq!(context.check_expiry().await, SessionState::Expired);
        assert!(context.certificate().await.is_none());
    }

    #[tokio::test]
    async fn test_logout() {
        let (context, _) = context(ScriptedTransport::new(true));
        let wallet = LocalWallet::generate();
        context
            .login(&wallet, ObjectId::new([1; 32]), &CancellationToken::new())
            .await
            .unwrap();

        context.logout().await;
        assert_eq!(context.state(), SessionState::Unauthenticated);
        assert!(context.certificate().await.is_none());
    }
}
