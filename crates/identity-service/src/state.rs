//! The identity map and its persistence snapshot.

use crate::domain::{IdentityEntry, IdentityState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::IdentityId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Map from identity id to entry.
///
/// The coarse lock here covers map membership only; per-identity state is
/// guarded inside each [`IdentityEntry`]. Mutating the map and mutating
/// an identity are separable operations.
#[derive(Default)]
pub struct IdentityStore {
    identities: Mutex<HashMap<IdentityId, Arc<IdentityEntry>>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &IdentityId) -> Option<Arc<IdentityEntry>> {
        self.identities.lock().get(id).cloned()
    }

    /// Insert a newborn identity. Identities are immutable at map
    /// granularity, so an existing entry is kept and the insert refused
    /// silently; the caller decides whether that is worth a log line.
    pub fn put(&self, id: IdentityId, state: IdentityState) -> bool {
        let mut map = self.identities.lock();
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, Arc::new(IdentityEntry::new(state)));
        true
    }

    pub fn len(&self) -> usize {
        self.identities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.lock().is_empty()
    }

    /// All entries, cloned out so callers never hold the map lock while
    /// touching per-identity locks.
    pub fn entries(&self) -> Vec<(IdentityId, Arc<IdentityEntry>)> {
        self.identities
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    /// Ordered snapshot of every identity, for checkpointing.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, IdentityState> {
        self.entries()
            .into_iter()
            .map(|(id, entry)| (id.to_vec(), entry.snapshot()))
            .collect()
    }

    /// Replace the map's contents from a checkpoint.
    pub fn restore(&self, identities: BTreeMap<Vec<u8>, IdentityState>) {
        let mut map = self.identities.lock();
        map.clear();
        for (id_bytes, state) in identities {
            let mut id = [0u8; 32];
            if id_bytes.len() != 32 {
                warn!(len = id_bytes.len(), "skipping malformed identity id");
                continue;
            }
            id.copy_from_slice(&id_bytes);
            map.insert(IdentityId(id), Arc::new(IdentityEntry::new(state)));
        }
    }

    /// Administrative wipe. Normal operations never remove identities.
    pub fn clear(&self) {
        self.identities.lock().clear();
    }
}

/// The persisted checkpoint: every identity plus the optional skipchain
/// authentication keypair. Stored under the single key `"storage"`.
///
/// The map is ordered by id bytes so a checkpoint of the same state is
/// byte-identical wherever it is taken.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct StorageMap {
    pub identities: BTreeMap<Vec<u8>, IdentityState>,
    pub skipchain_keypair: Option<SkipchainKeyPairBytes>,
}

/// Serialized form of the skipchain auth keypair.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SkipchainKeyPairBytes {
    pub secret: [u8; 32],
    pub public: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Data;
    use shared_types::{Roster, SkipBlock};

    fn state(marker: u8) -> IdentityState {
        let block = SkipBlock {
            index: 0,
            roster: Roster::default(),
            data: vec![marker],
            back_links: Vec::new(),
            verifier_ids: Vec::new(),
            parent: None,
            base_height: 10,
            maximum_height: 10,
            hash: [marker; 32],
        };
        IdentityState {
            latest: Data::default(),
            proposed: None,
            chain_root: block.clone(),
            chain_data: block,
        }
    }

    #[test]
    fn test_put_refuses_overwrite() {
        let store = IdentityStore::new();
        let id = IdentityId([1; 32]);

        assert!(store.put(id, state(1)));
        assert!(!store.put(id, state(2)));

        // First insert wins.
        let entry = store.get(&id).unwrap();
        assert_eq!(entry.snapshot().chain_data.data, vec![1]);
    }

    #[test]
    fn test_snapshot_restore_roundtrip_is_byte_identical() {
        let store = IdentityStore::new();
        store.put(IdentityId([2; 32]), state(2));
        store.put(IdentityId([1; 32]), state(1));

        let snap = StorageMap {
            identities: store.snapshot(),
            skipchain_keypair: None,
        };
        let bytes = bincode::serialize(&snap).unwrap();

        let restored_map: StorageMap = bincode::deserialize(&bytes).unwrap();
        let other = IdentityStore::new();
        other.restore(restored_map.identities);

        let again = StorageMap {
            identities: other.snapshot(),
            skipchain_keypair: None,
        };
        assert_eq!(bytes, bincode::serialize(&again).unwrap());
    }

    #[test]
    fn test_clear_wipes_everything() {
        let store = IdentityStore::new();
        store.put(IdentityId([1; 32]), state(1));
        store.clear();
        assert!(store.is_empty());
    }
}
