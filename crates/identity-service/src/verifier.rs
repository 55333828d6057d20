//! Block verification predicate, invoked by the skipchain on every
//! conode before it signs a new data block.

use crate::domain::Data;
use crate::error::{IdentityError, IdentityResult};
use crate::ports::outbound::{KeyValueStore, PropagationNetwork, SkipchainClient};
use crate::service::{IdentityService, SERVICE_NAME};
use shared_crypto::schnorr_verify;
use shared_types::{SkipBlock, VerifierId};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Id under which the identity predicate registers with the skipchain.
/// Derived from the service name, so every conode computes the same id.
pub fn identity_verifier_id() -> VerifierId {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, SERVICE_NAME.as_bytes())
}

impl<S, N, K> IdentityService<S, N, K>
where
    S: SkipchainClient,
    N: PropagationNetwork,
    K: KeyValueStore,
{
    /// The predicate: accept genesis unconditionally, otherwise require a
    /// threshold of valid device signatures against the previous accepted
    /// data. Details are logged locally; the skipchain only sees a bool.
    pub fn verify_block(&self, block: &SkipBlock) -> bool {
        match self.verify_block_inner(block) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "refusing block");
                false
            }
        }
    }

    fn verify_block_inner(&self, block: &SkipBlock) -> IdentityResult<()> {
        if block.is_genesis() {
            return Ok(());
        }
        let data: Data = bincode::deserialize(&block.data)
            .map_err(|e| IdentityError::DataMissing(format!("unknown packet: {}", e)))?;
        let hash = data.hash();
        let back_link = *block
            .back_link()
            .ok_or_else(|| IdentityError::BlockMissing("no backlinks stored".into()))?;

        // Look for the predecessor among our identities. The map lock is
        // only held to clone the entry list; per-entry locks are short and
        // everything is released before any remote fetch.
        let mut prev: Option<SkipBlock> = None;
        for (_, entry) in self.store.entries() {
            let state = entry.lock();
            if state.chain_data.hash == back_link {
                prev = Some(state.chain_data.clone());
                break;
            }
        }
        let prev = match prev {
            Some(block) => block,
            // Not ours yet; the block's own roster should have it.
            None => self
                .skipchain
                .get_single_block(&block.roster, back_link)
                .map_err(|e| IdentityError::BlockMissing(e.to_string()))?,
        };
        let prev_data: Data = bincode::deserialize(&prev.data)
            .map_err(|e| IdentityError::DataMissing(e.to_string()))?;

        let mut sig_count = 0usize;
        for (device, sig) in &data.votes {
            match prev_data.device.get(device) {
                Some(known) => {
                    if schnorr_verify(&known.point, &hash, sig).is_ok() {
                        debug!(%device, "found correct device signature");
                        sig_count += 1;
                    }
                }
                None => debug!(%device, "vote from non-device"),
            }
        }
        if prev_data.vote_threshold_reached(sig_count) {
            Ok(())
        } else {
            Err(IdentityError::VoteSignature(format!(
                "not enough signatures: {} of {}",
                sig_count, prev_data.threshold
            )))
        }
    }
}

impl<S, N, K> IdentityService<S, N, K>
where
    S: SkipchainClient + 'static,
    N: PropagationNetwork + 'static,
    K: KeyValueStore + 'static,
{
    /// Register the predicate with the skipchain engine.
    ///
    /// The callback holds a weak handle: when the service is torn down
    /// the skipchain keeps a dangling registration that simply refuses
    /// everything instead of leaking the service.
    pub fn register_verification(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.skipchain.register_verifier(
            identity_verifier_id(),
            Box::new(move |block| match weak.upgrade() {
                Some(service) => service.verify_block(block),
                None => false,
            }),
        );
    }
}
