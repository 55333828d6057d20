//! # Integration Tests Crate
//!
//! Multi-conode scenarios for the identity service, run over the
//! in-memory skipchain and the loopback propagation network.
//!
//! ## Structure
//!
//! ```text
//! integration-tests/
//! ├── src/
//! │   ├── lib.rs        # This file
//! │   ├── harness.rs    # Cothority builder + client-side helpers
//! │   └── scenarios.rs  # End-to-end scenarios
//! ```
//!
//! ## Scenario Categories
//!
//! 1. **Happy paths**: single-device and threshold-of-three identities
//!    propose, vote and commit; every conode converges.
//! 2. **Rejections**: wrong signers, replayed nonces, exhausted creation
//!    quotas, forged blocks offered straight to the skipchain.
//! 3. **State discipline**: proposals replaced wholesale, rejection votes
//!    erasing earlier votes, duplicate identity propagation refused.
//! 4. **Recovery**: a conode restarted from an old checkpoint catches up
//!    over the skipchain; checkpoints are byte-stable.

pub mod harness;

#[cfg(test)]
mod scenarios;
