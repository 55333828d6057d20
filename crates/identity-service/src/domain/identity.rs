//! Per-identity entry: the accepted configuration, the pending proposal
//! and the two skipblocks anchoring the identity.

use crate::domain::Data;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use shared_types::SkipBlock;

/// Mutable state of one identity.
///
/// Mutated only through [`IdentityEntry::lock`]; the fields move together
/// (a committed block updates `latest` and `chain_data` and clears
/// `proposed` in one critical section).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IdentityState {
    /// Current accepted configuration.
    pub latest: Data,
    /// Pending proposal awaiting votes, if any.
    pub proposed: Option<Data>,
    /// Genesis of the administrative root chain.
    pub chain_root: SkipBlock,
    /// Latest block of the data chain.
    pub chain_data: SkipBlock,
}

/// One identity as held in the conode's map, with its own lock.
///
/// The map's coarse lock covers only map membership; everything inside an
/// entry is guarded here. Entries are shared as `Arc<IdentityEntry>` so
/// the map lock never has to be held while an entry is being mutated.
pub struct IdentityEntry {
    inner: Mutex<IdentityState>,
}

impl IdentityEntry {
    pub fn new(state: IdentityState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Acquire the per-identity lock.
    pub fn lock(&self) -> MutexGuard<'_, IdentityState> {
        self.inner.lock()
    }

    /// Clone the state under a short-lived lock.
    pub fn snapshot(&self) -> IdentityState {
        self.inner.lock().clone()
    }
}

impl std::fmt::Debug for IdentityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Avoid taking the lock in Debug; show only the address.
        write!(f, "IdentityEntry(..)")
    }
}
