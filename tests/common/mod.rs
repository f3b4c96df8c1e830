#![allow(dead_code)]

use async_trait::async_trait;
use passport_auth::chain::{capability_object_id, ChainError, ChainReader, PassportObject};
use passport_auth::modules::secure_keys::MasterSecret;
use passport_auth::session::{LocalWallet, SignerError, WalletSignature, WalletSigner};
use passport_auth::{Address, ObjectId, Profile, Verifier, VerifierConfig};
use scale::Encode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MASTER: [u8; 32] = [0x42; 32];

pub fn scope() -> ObjectId {
    ObjectId::from_hex_literal("0x5c09e").unwrap()
}

pub fn master() -> MasterSecret {
    MasterSecret::from_bytes(&MASTER).unwrap()
}

/// In-memory chain shared between the test and the verifier.
#[derive(Clone, Default)]
pub struct MockChain {
    objects: Arc<Mutex<HashMap<ObjectId, Vec<u8>>>>,
    reads: Arc<AtomicUsize>,
}

impl MockChain {
    pub fn give_passport(&self, user: Address, played: u32) -> ObjectId {
        let id = capability_object_id(&scope(), &user);
        let passport = PassportObject::new(
            user,
            Profile {
                rating: 1500,
                played,
                won: played / 2,
                lost: played - played / 2,
            },
        );
        self.objects.lock().unwrap().insert(id, passport.encode());
        id
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().unwrap().get(id).cloned())
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        Ok(1)
    }
}

pub fn verifier(chain: MockChain) -> Verifier<MockChain> {
    Verifier::new(VerifierConfig::new(scope()), chain, master()).unwrap()
}

/// Wallet that counts prompts and takes a moment to answer.
pub struct CountingWallet {
    pub inner: LocalWallet,
    prompts: AtomicUsize,
}

impl CountingWallet {
    pub fn new() -> Self {
        Self {
            inner: LocalWallet::generate(),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for CountingWallet {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<WalletSignature, SignerError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.sign_personal_message(message).await
    }
}
