//! Client side of the login: session keys, certificates and the state machine
//! that drives them.

pub mod certificate;
pub mod context;
pub mod key;
pub mod wallet;

pub use certificate::{personal_message, Certificate};
pub use context::{ContextConfig, LoginOutcome, SessionContext, SessionState, SessionToken};
pub use key::{SessionKey, CLOCK_SKEW_TOLERANCE_MS, DEFAULT_TTL_MINUTES};
pub use wallet::{LocalWallet, SignerError, WalletSignature, WalletSigner};
