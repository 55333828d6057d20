//! # Shared Types Crate
//!
//! Cross-crate entities for the identity cothority. Everything that crosses
//! a crate boundary lives here: skipblock headers, rosters, server
//! identities and the wire-stable error codes of the client protocol.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: types exchanged between the service, its
//!   skipchain port and the propagation layer are defined once, here.
//! - **Deterministic encodings**: every type that ends up inside a hashed
//!   or persisted structure serializes the same way on every node.

pub mod entities;
pub mod errors;

pub use entities::{Hash, IdentityId, Roster, ServerIdentity, SkipBlock, VerifierId};
pub use errors::ErrorCode;
