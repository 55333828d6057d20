//! Outbound ports (driven side): what the identity service requires from
//! its host.

use crate::error::{KvError, PropagationError, SkipchainError};
use crate::events::PropagationMsg;
use parking_lot::Mutex;
use shared_crypto::{PublicKey, SchnorrKeyPair};
use shared_types::{Hash, Roster, SkipBlock, VerifierId};
use std::collections::HashMap;
use std::time::Duration;

/// Verification callback invoked by the skipchain before appending a
/// block. Must hold only non-owning handles to the service; see
/// `IdentityService::register_verification`.
pub type BlockVerifierFn = Box<dyn Fn(&SkipBlock) -> bool + Send + Sync>;

/// Client handle to the skipchain engine.
///
/// The engine owns consensus, forward links and collective signatures;
/// the identity service only creates chains, appends blocks and fetches
/// updates. When the engine's client-key registry is non-empty, store
/// operations must be signed by a registered key.
pub trait SkipchainClient: Send + Sync {
    /// Create a genesis block for a new chain.
    #[allow(clippy::too_many_arguments)]
    fn create_genesis(
        &self,
        roster: &Roster,
        base_height: u32,
        maximum_height: u32,
        verifiers: &[VerifierId],
        data: &[u8],
        parent: Option<Hash>,
        signer: Option<&SchnorrKeyPair>,
    ) -> Result<SkipBlock, SkipchainError>;

    /// Append a block after `prev`. Every verifier registered for the
    /// chain's verifier ids must accept the block first.
    fn store_block(
        &self,
        prev: &SkipBlock,
        new_roster: &Roster,
        data: &[u8],
        signer: Option<&SchnorrKeyPair>,
    ) -> Result<SkipBlock, SkipchainError>;

    /// The chain from `id` (inclusive) to its latest block.
    fn get_update_chain(&self, roster: &Roster, id: Hash) -> Result<Vec<SkipBlock>, SkipchainError>;

    /// Fetch one block by id.
    fn get_single_block(&self, roster: &Roster, id: Hash) -> Result<SkipBlock, SkipchainError>;

    /// Register a verification predicate under an id.
    fn register_verifier(&self, id: VerifierId, verifier: BlockVerifierFn);

    /// Whether any client key is registered with the engine.
    fn has_client_keys(&self) -> bool;

    /// Register a key allowed to sign store operations.
    fn add_client_key(&self, key: PublicKey);
}

/// Receiving side of propagation, implemented by the service itself.
pub trait PropagationHandler: Send + Sync {
    /// Apply one replicated message. Never fails: problems are logged and
    /// the message dropped, per the fire-and-forget contract.
    fn handle_propagation(&self, msg: &PropagationMsg);
}

/// Broadcast transport towards a roster.
pub trait PropagationNetwork: Send + Sync {
    /// Deliver `msg` to every roster member and return how many
    /// acknowledged within the timeout. Partial delivery is the caller's
    /// warning, not an error.
    fn propagate(
        &self,
        roster: &Roster,
        msg: &PropagationMsg,
        timeout: Duration,
    ) -> Result<usize, PropagationError>;
}

/// Checkpoint store for the service's persisted state.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        (**self).put(key, value)
    }
}

/// In-memory checkpoint store for tests and single-process setups.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.data.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
