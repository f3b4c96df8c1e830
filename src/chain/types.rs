//! On-chain passport objects.

use crate::chain::error::ChainError;
use crate::modules::crypto::blake2b_256;
use crate::types::{Address, ObjectId, Profile};
use scale::{Decode, Encode};

/// Passport object as stored on chain (SCALE encoded).
///
/// Holding one for a package scope is the capability that gates the resource.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PassportObject {
    pub owner: [u8; 32],
    pub rating: u32,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
}

impl PassportObject {
    pub fn new(owner: Address, profile: Profile) -> Self {
        Self {
            owner: *owner.as_bytes(),
            rating: profile.rating,
            played: profile.played,
            won: profile.won,
            lost: profile.lost,
        }
    }

    /// Decode stored bytes, rejecting trailing data.
    pub fn decode_bytes(data: &[u8]) -> Result<Self, ChainError> {
        let mut input = data;
        let passport =
            Self::decode(&mut input).map_err(|e| ChainError::DecodeError(e.to_string()))?;
        if !input.is_empty() {
            return Err(ChainError::DecodeError(format!(
                "{} trailing bytes after passport",
                input.len()
            )));
        }
        Ok(passport)
    }

    pub fn owner(&self) -> Address {
        Address::new(self.owner)
    }

    pub fn profile(&self) -> Profile {
        Profile {
            rating: self.rating,
            played: self.played,
            won: self.won,
            lost: self.lost,
        }
    }
}

/// Object id of the passport `user` holds for `scope`.
///
/// Ids are derived, so a reader can look one up without an index query.
pub fn capability_object_id(scope: &ObjectId, user: &Address) -> ObjectId {
    ObjectId::new(blake2b_256(&[
        b"passport".as_slice(),
        scope.as_bytes(),
        user.as_bytes(),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passport_decode() {
        let owner = Address::new([7u8; 32]);
        let passport = PassportObject::new(
            owner,
            Profile {
                rating: 1200,
                played: 3,
                won: 2,
                lost: 1,
            },
        );
        let decoded = PassportObject::decode_bytes(&passport.encode()).unwrap();
        assert_eq!(decoded.owner(), owner);
        assert_eq!(decoded.profile().rating, 1200);
    }

    #[test]
    fn test_passport_rejects_trailing_bytes() {
        let mut bytes = PassportObject::new(Address::default(), Profile::default()).encode();
        bytes.push(0);
        assert!(matches!(
            PassportObject::decode_bytes(&bytes),
            Err(ChainError::DecodeError(_))
        ));
    }

    #[test]
    fn test_capability_id_depends_on_scope_and_user() {
        let scope_a = ObjectId::new([1u8; 32]);
        let scope_b = ObjectId::new([2u8; 32]);
        let user = Address::new([3u8; 32]);

        assert_eq!(
            capability_object_id(&scope_a, &user),
            capability_object_id(&scope_a, &user)
        );
        assert_ne!(
            capability_object_id(&scope_a, &user),
            capability_object_id(&scope_b, &user)
        );
    }
}
