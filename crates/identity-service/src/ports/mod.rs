//! Ports of the identity service.
//!
//! The service drives three external collaborators: the skipchain engine,
//! the propagation transport and the checkpoint store. Each is a trait
//! here; adapters live in `crate::adapters` and in the host application.

pub mod outbound;

pub use outbound::{
    BlockVerifierFn, InMemoryKVStore, KeyValueStore, PropagationHandler, PropagationNetwork,
    SkipchainClient,
};
