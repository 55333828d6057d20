//! Receiving side of propagation: apply replicated messages to this
//! conode's state.
//!
//! Handlers are fire-and-forget: any problem is logged and the message
//! dropped, leaving prior state untouched. Re-deliveries are absorbed
//! (same proposal, same vote bytes) and votes that do not match the
//! current proposal are discarded, which tolerates reordered delivery.

use crate::domain::{Data, IdentityState};
use crate::events::PropagationMsg;
use crate::messages::{ProposeSend, ProposeVote};
use crate::ports::outbound::{KeyValueStore, PropagationHandler, PropagationNetwork, SkipchainClient};
use crate::service::IdentityService;
use shared_crypto::schnorr_verify;
use shared_types::{IdentityId, SkipBlock};
use tracing::{debug, error};

impl<S, N, K> PropagationHandler for IdentityService<S, N, K>
where
    S: SkipchainClient,
    N: PropagationNetwork,
    K: KeyValueStore,
{
    fn handle_propagation(&self, msg: &PropagationMsg) {
        debug!(kind = msg.kind(), node = %self.server().address, "applying propagation");
        match msg {
            PropagationMsg::ProposeSend(p) => self.apply_propose_send(p),
            PropagationMsg::ProposeVote(v) => self.apply_propose_vote(v),
            PropagationMsg::UpdateSkipBlock { id, latest } => {
                self.apply_update_skipblock(id, latest)
            }
            PropagationMsg::PropagateIdentity {
                state,
                tag,
                pub_str,
            } => self.apply_propagate_identity(state, tag, pub_str),
        }
    }
}

impl<S, N, K> IdentityService<S, N, K>
where
    S: SkipchainClient,
    N: PropagationNetwork,
    K: KeyValueStore,
{
    /// Replace the pending proposal; any prior pending is discarded.
    fn apply_propose_send(&self, p: &ProposeSend) {
        let Some(entry) = self.store.get(&p.id) else {
            error!(id = %p.id, "proposal for unknown identity");
            return;
        };
        entry.lock().proposed = Some(p.propose.clone());
        self.save();
    }

    /// Record one device's vote, or erase it for an absent signature.
    fn apply_propose_vote(&self, v: &ProposeVote) {
        let Some(entry) = self.store.get(&v.id) else {
            error!(id = %v.id, "vote for unknown identity");
            return;
        };
        {
            let mut state = entry.lock();
            let device_point = match state.latest.device.get(&v.signer) {
                Some(device) => device.point,
                None => {
                    error!(signer = %v.signer, "vote from unknown device");
                    return;
                }
            };
            let Some(proposed) = state.proposed.as_mut() else {
                error!(id = %v.id, "vote without a proposal");
                return;
            };
            match &v.signature {
                None => {
                    // Empty signature: the device rejected the proposal.
                    proposed.votes.remove(&v.signer);
                    debug!(signer = %v.signer, "erased vote after rejection");
                }
                Some(sig) => {
                    let hash = proposed.hash();
                    if schnorr_verify(&device_point, &hash, sig).is_err() {
                        error!(signer = %v.signer, "invalid vote signature");
                        return;
                    }
                    proposed.votes.insert(v.signer.clone(), *sig);
                }
            }
        }
        self.save();
    }

    /// Commit an accepted block: adopt it as latest, clear the proposal.
    fn apply_update_skipblock(&self, id: &IdentityId, latest: &SkipBlock) {
        let Some(entry) = self.store.get(id) else {
            error!(%id, "skipblock update for unknown identity");
            return;
        };
        let data: Data = match bincode::deserialize(&latest.data) {
            Ok(data) => data,
            Err(e) => {
                error!(%id, error = %e, "undecodable block payload");
                return;
            }
        };
        {
            let mut state = entry.lock();
            state.chain_data = latest.clone();
            state.latest = data;
            state.proposed = None;
        }
        self.save();
    }

    /// Replicate a newborn identity and charge its creation quota.
    fn apply_propagate_identity(&self, state: &IdentityState, tag: &str, pub_str: &str) {
        {
            let mut auth = self.auth.lock();
            if !tag.is_empty() {
                if !auth.decrement_tag(tag) {
                    // The request path already checked the counter, so an
                    // exhausted one here means replicas diverged.
                    error!(tag, "no more chains allowed for this token");
                    return;
                }
            } else if !pub_str.is_empty() && !auth.decrement_point(pub_str) {
                error!(pub_str, "no more chains allowed for this key");
                return;
            }
        }

        let id = IdentityId(state.chain_data.hash);
        if !self.store.put(id, state.clone()) {
            error!(%id, "couldn't store new identity");
            return;
        }
        debug!(%id, "stored new identity");
        self.save();
    }
}
