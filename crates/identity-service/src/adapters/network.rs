//! Loopback propagation transport.
//!
//! Delivers messages synchronously to every registered node on the
//! caller's thread. Handlers therefore run with the same locking rules as
//! over a real transport: the caller must not hold any per-identity lock
//! while propagating.

use crate::error::PropagationError;
use crate::events::PropagationMsg;
use crate::ports::outbound::{PropagationHandler, PropagationNetwork};
use parking_lot::Mutex;
use shared_types::Roster;
use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;
use tracing::debug;

/// Registry of in-process nodes, addressed like a real roster.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: Mutex<HashMap<String, Weak<dyn PropagationHandler>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under its roster address. The network keeps a weak
    /// handle so a dropped node simply stops acknowledging.
    pub fn register(&self, address: impl Into<String>, handler: Weak<dyn PropagationHandler>) {
        self.nodes.lock().insert(address.into(), handler);
    }
}

impl PropagationNetwork for LocalNetwork {
    fn propagate(
        &self,
        roster: &Roster,
        msg: &PropagationMsg,
        _timeout: Duration,
    ) -> Result<usize, PropagationError> {
        // Resolve members first so the registry lock is not held while
        // handlers run.
        let handlers: Vec<_> = {
            let nodes = self.nodes.lock();
            roster
                .list
                .iter()
                .map(|si| nodes.get(&si.address).cloned())
                .collect()
        };

        let mut acks = 0;
        for (si, handler) in roster.list.iter().zip(handlers) {
            match handler.and_then(|weak| weak.upgrade()) {
                Some(node) => {
                    node.handle_propagation(msg);
                    acks += 1;
                }
                None => {
                    debug!(address = %si.address, kind = msg.kind(), "node unreachable");
                }
            }
        }

        if acks == 0 && !roster.is_empty() {
            return Err(PropagationError::NoReachableNode);
        }
        Ok(acks)
    }
}
