//! Client-side transports to the verifier.

pub mod transport;

pub use transport::{HttpTransport, VerifierTransport};
