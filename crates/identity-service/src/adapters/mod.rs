//! In-memory adapters for the outbound ports.
//!
//! These run the full protocol in one process: a shared skipchain that
//! invokes every registered verifier before appending, and a loopback
//! network that delivers propagation synchronously. Tests and
//! single-process deployments use them directly; a production host
//! replaces them with real transport and engine clients.

pub mod network;
pub mod skipchain;

pub use network::LocalNetwork;
pub use skipchain::InMemorySkipchain;
