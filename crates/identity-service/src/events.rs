//! Messages replicated across the roster.
//!
//! One tagged variant per replication concern, dispatched by exhaustive
//! match in the propagation handler. Receivers apply them idempotently
//! where possible and never reply with errors.

use crate::domain::IdentityState;
use crate::messages::{ProposeSend, ProposeVote};
use serde::{Deserialize, Serialize};
use shared_types::{IdentityId, SkipBlock};

/// Everything the propagation layer carries between conodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PropagationMsg {
    /// Replace the pending proposal on every node.
    ProposeSend(ProposeSend),
    /// Record (or erase, for an absent signature) one device's vote.
    ProposeVote(ProposeVote),
    /// Commit an accepted block: adopt it as latest and clear the proposal.
    UpdateSkipBlock { id: IdentityId, latest: SkipBlock },
    /// Replicate a newborn identity and charge its creation quota.
    ///
    /// Exactly one of `tag` / `pub_str` is non-empty, naming the
    /// credential to charge.
    PropagateIdentity {
        state: IdentityState,
        tag: String,
        pub_str: String,
    },
}

impl PropagationMsg {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PropagationMsg::ProposeSend(_) => "propose-send",
            PropagationMsg::ProposeVote(_) => "propose-vote",
            PropagationMsg::UpdateSkipBlock { .. } => "update-skipblock",
            PropagationMsg::PropagateIdentity { .. } => "propagate-identity",
        }
    }
}
