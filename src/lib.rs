//! Chain-identity-bound session authentication.
//!
//! A wallet signs a short-lived session key once. The session key then signs
//! sealed token requests, which a verifier checks against an on-chain passport
//! before releasing a session token and an encrypted resource key.

pub mod chain;
pub mod client;
pub mod config;
pub mod encapsulation;
pub mod error;
pub mod modules;
pub mod request;
pub mod session;
pub mod types;
pub mod verifier;
pub mod wire;

pub use client::{HttpTransport, VerifierTransport};
pub use error::{AuthError, RejectionReason};
pub use request::{build_request, PreparedRequest, SealedTokenRequest};
pub use session::{
    Certificate, ContextConfig, LocalWallet, LoginOutcome, SessionContext, SessionKey,
    SessionState, SessionToken, WalletSigner,
};
pub use types::{Address, ObjectId, Profile};
pub use verifier::{SessionVerifier, Verifier, VerifierConfig, VerifyError};
