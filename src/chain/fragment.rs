//! Transaction fragments naming the on-chain approval call.
//!
//! The client does not submit the fragment. It is evidence of intent: the
//! verifier decodes it, checks the target and reads the objects it names.

use crate::chain::error::FragmentError;
use crate::types::ObjectId;
use scale::{Decode, Encode};
use std::fmt;

/// Encoding version of [`CallFragment`].
pub const FRAGMENT_VERSION: u8 = 1;

/// A fully-qualified call `<package>::<module>::<function>(args..)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub args: Vec<ObjectId>,
}

impl MoveCall {
    pub fn parse_target(target: &str, args: Vec<ObjectId>) -> Result<Self, FragmentError> {
        let parts: Vec<&str> = target.split("::").collect();
        let [package, module, function] = parts.as_slice() else {
            return Err(FragmentError::InvalidTarget(target.to_string()));
        };
        if !is_identifier(module) || !is_identifier(function) {
            return Err(FragmentError::InvalidTarget(target.to_string()));
        }
        let package =
            ObjectId::from_hex_literal(package).map_err(|e| FragmentError::InvalidId(e.to_string()))?;
        Ok(Self {
            package,
            module: module.to_string(),
            function: function.to_string(),
            args,
        })
    }

    /// `module::function`, without the package.
    pub fn function_path(&self) -> String {
        format!("{}::{}", self.module, self.function)
    }

    pub fn target(&self) -> String {
        format!("{}::{}", self.package, self.function_path())
    }
}

impl fmt::Display for MoveCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Wire form of a [`MoveCall`].
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CallFragment {
    pub version: u8,
    pub package: [u8; 32],
    pub module: String,
    pub function: String,
    pub args: Vec<[u8; 32]>,
}

impl CallFragment {
    pub fn from_call(call: &MoveCall) -> Self {
        Self {
            version: FRAGMENT_VERSION,
            package: *call.package.as_bytes(),
            module: call.module.clone(),
            function: call.function.clone(),
            args: call.args.iter().map(|id| *id.as_bytes()).collect(),
        }
    }

    /// Decode fragment bytes, rejecting unknown versions and trailing data.
    pub fn decode_bytes(data: &[u8]) -> Result<Self, FragmentError> {
        let mut input = data;
        let fragment =
            Self::decode(&mut input).map_err(|e| FragmentError::Decode(e.to_string()))?;
        if !input.is_empty() {
            return Err(FragmentError::Decode(format!(
                "{} trailing bytes",
                input.len()
            )));
        }
        if fragment.version != FRAGMENT_VERSION {
            return Err(FragmentError::UnsupportedVersion(fragment.version));
        }
        Ok(fragment)
    }

    pub fn into_call(self) -> MoveCall {
        MoveCall {
            package: ObjectId::new(self.package),
            module: self.module,
            function: self.function,
            args: self.args.into_iter().map(ObjectId::new).collect(),
        }
    }
}

/// Builds the opaque fragment bytes for a call.
pub trait TransactionFragmentBuilder: Send + Sync {
    fn build_call(&self, target: &str, args: &[ObjectId]) -> Result<Vec<u8>, FragmentError>;
}

/// Builder producing SCALE-encoded [`CallFragment`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleCallBuilder;

impl TransactionFragmentBuilder for ScaleCallBuilder {
    fn build_call(&self, target: &str, args: &[ObjectId]) -> Result<Vec<u8>, FragmentError> {
        let call = MoveCall::parse_target(target, args.to_vec())?;
        Ok(CallFragment::from_call(&call).encode())
    }
}
