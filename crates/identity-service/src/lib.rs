//! # Identity Service
//!
//! A cothority-backed shared identity service. Each identity is a mutable
//! key/value record controlled jointly by a set of devices: changes are
//! proposed, voted on with Schnorr signatures, and committed to a
//! per-identity skipchain once a threshold of devices has signed.
//!
//! ## Architecture Role
//!
//! ```text
//! client ──ProposeSend/ProposeVote──→ [facade (service.rs)]
//!                                          │ propagate
//!                            ┌─────────────┴─────────────┐
//!                            ↓                           ↓
//!                       [conode B]                  [conode C]   ... roster
//!                            │
//!                  threshold reached → skipchain store_block
//!                            │
//!                   [verifier.rs] on every conode before signing
//! ```
//!
//! The skipchain engine, the network transport and the key/value
//! checkpoint store are outbound ports (`ports::outbound`); in-memory
//! adapters good enough to run full multi-node scenarios live in
//! `adapters`.

pub mod adapters;
pub mod auth;
pub mod domain;
pub mod error;
pub mod events;
pub mod messages;
pub mod ports;
pub mod propagation;
pub mod service;
pub mod state;
pub mod verifier;

pub use auth::{AuthRegistry, DEFAULT_CHAIN_QUOTA};
pub use domain::{Data, Device, FinalStatement, IdentityEntry, IdentityState};
pub use error::{IdentityError, IdentityResult};
pub use events::PropagationMsg;
pub use messages::*;
pub use service::{IdentityConfig, IdentityService, SERVICE_NAME};
pub use state::{IdentityStore, StorageMap};
pub use verifier::identity_verifier_id;
