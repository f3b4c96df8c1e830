//! Chain client for reading passport objects.
//!
//! This module provides the [`ChainReader`] seam used by the verifier and a
//! subxt-based implementation that reads the passport registry contract's
//! object mapping from raw storage.

use crate::chain::error::ChainError;
use crate::types::ObjectId;
use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use subxt::{OnlineClient, PolkadotConfig};
use tokio::sync::RwLock;

/// Read access to on-chain objects.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Raw bytes of an object, or `None` when it does not exist.
    async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError>;

    /// Latest block number seen by the node.
    async fn latest_block(&self) -> Result<u64, ChainError>;
}

/// Chain client for querying passport objects from the chain node.
pub struct ChainClient {
    /// The RPC URL for the chain node.
    rpc_url: String,

    /// The subxt online client (lazy-initialized).
    client: RwLock<Option<OnlineClient<PolkadotConfig>>>,

    /// Last known block number for health checking.
    last_known_block: AtomicU64,
}

impl ChainClient {
    /// Create a new chain client.
    ///
    /// Connection is established lazily on first query.
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            client: RwLock::new(None),
            last_known_block: AtomicU64::new(0),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Connect to the chain node.
    pub async fn connect(&self) -> Result<(), ChainError> {
        info!("Connecting to chain RPC at {}", self.rpc_url);

        let client = OnlineClient::<PolkadotConfig>::from_url(&self.rpc_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed {
                url: self.rpc_url.clone(),
                reason: e.to_string(),
            })?;

        self.validate_node_health_internal(&client).await?;

        let mut guard = self.client.write().await;
        *guard = Some(client);

        info!("Successfully connected to chain at {}", self.rpc_url);
        Ok(())
    }

    /// Get or create the client connection.
    async fn get_client(&self) -> Result<OnlineClient<PolkadotConfig>, ChainError> {
        {
            let guard = self.client.read().await;
            if let Some(client) = guard.as_ref() {
                return Ok(client.clone());
            }
        }

        self.connect().await?;

        let guard = self.client.read().await;
        guard.clone().ok_or_else(|| ChainError::ConnectionFailed {
            url: self.rpc_url.clone(),
            reason: "Failed to establish connection".to_string(),
        })
    }

    /// Validate that the chain node is healthy.
    pub async fn validate_node_health(&self) -> Result<(), ChainError> {
        let client = self.get_client().await?;
        self.validate_node_health_internal(&client).await
    }

    async fn validate_node_health_internal(
        &self,
        client: &OnlineClient<PolkadotConfig>,
    ) -> Result<(), ChainError> {
        let block = client
            .blocks()
            .at_latest()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        let current_block = block.number() as u64;
        let last_known = self.last_known_block.load(Ordering::Relaxed);

        // Allow some margin for block time variance
        if last_known > 0 && current_block + 2 < last_known {
            error!(
                "Block regression detected: current {} < last known {}",
                current_block, last_known
            );
            return Err(ChainError::BlockRegression {
                current: current_block,
                expected: last_known,
            });
        }

        self.last_known_block.store(current_block, Ordering::Relaxed);
        debug!("Node health OK: block {}", current_block);

        Ok(())
    }

    /// Storage key of an object in the registry contract's `objects` mapping:
    /// `blake2_256(slot_le || SCALE(object_id))`.
    fn object_storage_key(id: &ObjectId) -> Vec<u8> {
        use crate::modules::crypto::blake2b_256;
        use scale::Encode;

        // `objects` is the first field of the registry contract.
        let storage_slot: u32 = 0;
        blake2b_256(&[
            storage_slot.to_le_bytes().as_slice(),
            id.as_bytes().encode().as_slice(),
        ])
        .to_vec()
    }
}

#[async_trait]
impl ChainReader for ChainClient {
    async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError> {
        let client = self.get_client().await?;

        self.validate_node_health_internal(&client).await?;

        let storage_key = Self::object_storage_key(id);
        debug!(
            "Reading object {} with storage key {}",
            id,
            hex::encode(&storage_key)
        );

        let block = client
            .blocks()
            .at_latest()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        block
            .storage()
            .fetch_raw(storage_key)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        let client = self.get_client().await?;

        let block = client
            .blocks()
            .at_latest()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        let block_number = block.number() as u64;
        self.last_known_block.store(block_number, Ordering::Relaxed);

        Ok(block_number)
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &self.rpc_url)
            .field(
                "last_known_block",
                &self.last_known_block.load(Ordering::Relaxed),
            )
            .finish()
    }
}
