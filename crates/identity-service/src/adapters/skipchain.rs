//! In-memory skipchain engine.
//!
//! Hash-chained blocks, a forward-link index, a client-key registry and a
//! verifier registry. `store_block` runs every verifier registered for
//! the chain's verifier ids before appending, which is exactly how the
//! real engine exercises the identity service's block predicate.

use crate::error::SkipchainError;
use crate::ports::outbound::{BlockVerifierFn, SkipchainClient};
use parking_lot::Mutex;
use shared_crypto::{PublicKey, SchnorrKeyPair};
use shared_types::{Hash, Roster, SkipBlock, VerifierId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct ChainStore {
    blocks: HashMap<Hash, SkipBlock>,
    /// block hash -> successor hash
    forward: HashMap<Hash, Hash>,
}

/// Shared, process-wide skipchain fake.
#[derive(Default)]
pub struct InMemorySkipchain {
    chains: Mutex<ChainStore>,
    verifiers: Mutex<HashMap<VerifierId, Vec<Arc<dyn Fn(&SkipBlock) -> bool + Send + Sync>>>>,
    client_keys: Mutex<Vec<PublicKey>>,
}

impl InMemorySkipchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash over every field except the hash itself.
    fn block_hash(block: &SkipBlock) -> Result<Hash, SkipchainError> {
        let mut unhashed = block.clone();
        unhashed.hash = [0; 32];
        let bytes = bincode::serialize(&unhashed)
            .map_err(|e| SkipchainError::Encoding(e.to_string()))?;
        Ok(shared_crypto::hash(&bytes))
    }

    /// Store operations must be signed once any client key is registered.
    fn check_signer(&self, signer: Option<&SchnorrKeyPair>) -> Result<(), SkipchainError> {
        let keys = self.client_keys.lock();
        if keys.is_empty() {
            return Ok(());
        }
        match signer {
            Some(kp) if keys.contains(&kp.public()) => Ok(()),
            Some(_) => Err(SkipchainError::Refused(
                "signer key is not registered".into(),
            )),
            None => Err(SkipchainError::Refused(
                "store operation requires a registered client key".into(),
            )),
        }
    }

    /// Snapshot the callbacks for the given verifier ids so none of our
    /// locks are held while they run (a verifier may fetch blocks from us).
    fn verifiers_for(
        &self,
        ids: &[VerifierId],
    ) -> Vec<Arc<dyn Fn(&SkipBlock) -> bool + Send + Sync>> {
        let registry = self.verifiers.lock();
        ids.iter()
            .flat_map(|id| registry.get(id).cloned().unwrap_or_default())
            .collect()
    }
}

impl SkipchainClient for InMemorySkipchain {
    fn create_genesis(
        &self,
        roster: &Roster,
        base_height: u32,
        maximum_height: u32,
        verifiers: &[VerifierId],
        data: &[u8],
        parent: Option<Hash>,
        signer: Option<&SchnorrKeyPair>,
    ) -> Result<SkipBlock, SkipchainError> {
        self.check_signer(signer)?;

        let mut block = SkipBlock {
            index: 0,
            roster: roster.clone(),
            data: data.to_vec(),
            back_links: Vec::new(),
            verifier_ids: verifiers.to_vec(),
            parent,
            base_height,
            maximum_height,
            hash: [0; 32],
        };
        block.hash = Self::block_hash(&block)?;

        self.chains.lock().blocks.insert(block.hash, block.clone());
        debug!(hash = %hex::encode(&block.hash[..8]), "created genesis block");
        Ok(block)
    }

    fn store_block(
        &self,
        prev: &SkipBlock,
        new_roster: &Roster,
        data: &[u8],
        signer: Option<&SchnorrKeyPair>,
    ) -> Result<SkipBlock, SkipchainError> {
        self.check_signer(signer)?;

        // Build the candidate under the lock, then release it before the
        // verifiers run: they are free to fetch blocks from us.
        let mut block = {
            let chains = self.chains.lock();
            let stored_prev = chains
                .blocks
                .get(&prev.hash)
                .ok_or_else(|| SkipchainError::NotFound(hex::encode(&prev.hash[..8])))?;
            if chains.forward.contains_key(&stored_prev.hash) {
                return Err(SkipchainError::Refused(
                    "previous block already has a successor".into(),
                ));
            }
            SkipBlock {
                index: stored_prev.index + 1,
                roster: new_roster.clone(),
                data: data.to_vec(),
                back_links: vec![stored_prev.hash],
                verifier_ids: stored_prev.verifier_ids.clone(),
                parent: None,
                base_height: stored_prev.base_height,
                maximum_height: stored_prev.maximum_height,
                hash: [0; 32],
            }
        };
        block.hash = Self::block_hash(&block)?;

        for verifier in self.verifiers_for(&block.verifier_ids) {
            if !(*verifier)(&block) {
                return Err(SkipchainError::VerificationFailed(hex::encode(
                    &block.hash[..8],
                )));
            }
        }

        let mut chains = self.chains.lock();
        if chains.forward.contains_key(&prev.hash) {
            return Err(SkipchainError::Refused(
                "previous block gained a successor concurrently".into(),
            ));
        }
        chains.forward.insert(prev.hash, block.hash);
        chains.blocks.insert(block.hash, block.clone());
        debug!(
            index = block.index,
            hash = %hex::encode(&block.hash[..8]),
            "stored block"
        );
        Ok(block)
    }

    fn get_update_chain(
        &self,
        _roster: &Roster,
        id: Hash,
    ) -> Result<Vec<SkipBlock>, SkipchainError> {
        let chains = self.chains.lock();
        let mut current = chains
            .blocks
            .get(&id)
            .ok_or_else(|| SkipchainError::NotFound(hex::encode(&id[..8])))?;
        let mut update = vec![current.clone()];
        while let Some(next) = chains.forward.get(&current.hash) {
            current = &chains.blocks[next];
            update.push(current.clone());
        }
        Ok(update)
    }

    fn get_single_block(&self, _roster: &Roster, id: Hash) -> Result<SkipBlock, SkipchainError> {
        self.chains
            .lock()
            .blocks
            .get(&id)
            .cloned()
            .ok_or_else(|| SkipchainError::NotFound(hex::encode(&id[..8])))
    }

    fn register_verifier(&self, id: VerifierId, verifier: BlockVerifierFn) {
        self.verifiers
            .lock()
            .entry(id)
            .or_default()
            .push(Arc::from(verifier));
    }

    fn has_client_keys(&self) -> bool {
        !self.client_keys.lock().is_empty()
    }

    fn add_client_key(&self, key: PublicKey) {
        let mut keys = self.client_keys.lock();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
}
