//! Core entities shared between the service, the skipchain port and the
//! propagation layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 256-bit hash output used for block ids and identity ids.
pub type Hash = [u8; 32];

/// Identifier of a skipchain verification predicate.
///
/// Derived as a v5 UUID from the verifier's name so that every node
/// computes the same id without coordination.
pub type VerifierId = Uuid;

/// Identity id: the hash of the identity's data genesis block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub Hash);

impl IdentityId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<Hash> for IdentityId {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityId({})", hex::encode(&self.0[..8]))
    }
}

/// A single conode: its public key and its reachable address.
///
/// The string form feeds the authentication context, so it must be stable
/// for the lifetime of the server.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub public: [u8; 32],
    pub address: String,
}

impl ServerIdentity {
    pub fn new(public: [u8; 32], address: impl Into<String>) -> Self {
        Self {
            public,
            address: address.into(),
        }
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, hex::encode(self.public))
    }
}

/// Ordered list of conodes responsible for a chain.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Roster {
    pub list: Vec<ServerIdentity>,
}

impl Roster {
    pub fn new(list: Vec<ServerIdentity>) -> Self {
        Self { list }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Look up a member by address.
    pub fn get(&self, address: &str) -> Option<&ServerIdentity> {
        self.list.iter().find(|si| si.address == address)
    }
}

/// One block of a skipchain, as seen by this service.
///
/// The skipchain layer owns forward links and collective signatures; this
/// header carries what the identity service needs: the payload, the
/// backward link used by the block verifier, and the verifier ids that
/// gate appends to the chain.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SkipBlock {
    /// Position in the chain; 0 for a genesis block.
    pub index: u64,
    /// Conodes responsible for this chain at this block.
    pub roster: Roster,
    /// Opaque payload (the identity service stores an encoded `Data` here).
    pub data: Vec<u8>,
    /// Hashes of earlier blocks; element 0 is the direct predecessor.
    pub back_links: Vec<Hash>,
    /// Verification predicates that must accept before a successor is added.
    pub verifier_ids: Vec<VerifierId>,
    /// Genesis block of the parent chain, if any.
    pub parent: Option<Hash>,
    pub base_height: u32,
    pub maximum_height: u32,
    /// Hash over all fields above.
    pub hash: Hash,
}

impl SkipBlock {
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// The direct predecessor's hash, when one exists.
    pub fn back_link(&self) -> Option<&Hash> {
        self.back_links.first()
    }
}
