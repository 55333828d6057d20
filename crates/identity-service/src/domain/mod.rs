//! Domain model: the threshold-controlled data record and the
//! per-identity entry held by every conode.

pub mod data;
pub mod identity;

pub use data::{Data, Device, FinalStatement};
pub use identity::{IdentityEntry, IdentityState};
