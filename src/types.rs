//! Shared identifiers, player profile and clock abstractions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Error returned when a `0x`-prefixed 32-byte identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid identifier {input:?}: {reason}")]
pub struct IdParseError {
    pub input: String,
    pub reason: &'static str,
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const LENGTH: usize = 32;

            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex_literal(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Parse a hex literal, with or without `0x`. Short literals are
            /// left-padded with zeros, so `0x2` names the same id as its full form.
            pub fn from_hex_literal(input: &str) -> Result<Self, IdParseError> {
                let digits = input.strip_prefix("0x").unwrap_or(input);
                if digits.is_empty() || digits.len() > 64 {
                    return Err(IdParseError {
                        input: input.to_string(),
                        reason: "expected 1 to 64 hex digits",
                    });
                }
                let padded = format!("{:0>64}", digits);
                let bytes = hex::decode(&padded).map_err(|_| IdParseError {
                    input: input.to_string(),
                    reason: "not hexadecimal",
                })?;
                let mut out = [0u8; 32];
                out.copy_from_slice(&bytes);
                Ok(Self(out))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex_literal(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex_literal())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex_literal())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex_literal())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let literal = String::deserialize(deserializer)?;
                Self::from_hex_literal(&literal).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// A chain account address.
    Address
);

hex_id!(
    /// An on-chain object or package identifier.
    ObjectId
);

/// Player statistics carried by the on-chain passport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub rating: u32,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
}

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        current_epoch_millis()
    }
}

/// Manually driven clock for deterministic expiry handling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: u64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn current_epoch_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
