//! Chain access for passport capability checks.
//!
//! The verifier never trusts the client's claim that it holds a passport; it
//! reads the object from chain after all signature checks have passed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────────┐     ┌──────────┐
//! │ ChainClient │────▶│ CachedChainReader │────▶│ Verifier │
//! │   (subxt)   │     │     (6s TTL)      │     │          │
//! └─────────────┘     └───────────────────┘     └──────────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ chain node  │
//! └─────────────┘
//! ```
//!
//! Transaction fragments ([`fragment`]) describe the approval call a client
//! asks the verifier to honour.

pub mod cache;
pub mod client;
pub mod error;
pub mod fragment;
pub mod types;

pub use cache::CachedChainReader;
pub use client::{ChainClient, ChainReader};
pub use error::{ChainError, FragmentError};
pub use fragment::{CallFragment, MoveCall, ScaleCallBuilder, TransactionFragmentBuilder};
pub use types::{capability_object_id, PassportObject};
