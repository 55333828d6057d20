//! Builds a small cothority in one process and drives it the way a
//! client would.

use identity_service::adapters::{InMemorySkipchain, LocalNetwork};
use identity_service::ports::outbound::{InMemoryKVStore, PropagationHandler};
use identity_service::{
    AuthType, Authenticate, CreateIdentity, CreateIdentityReply, Data, Device, FinalStatement,
    IdentityConfig, IdentityResult, IdentityService, PinRequest, ProposeSend, ProposeVote,
    ProposeVoteReply, StoreKeys,
};
use shared_crypto::{ring_sign, PublicKey, SchnorrKeyPair};
use shared_types::{IdentityId, Roster, ServerIdentity};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

pub type Node = Arc<IdentityService<InMemorySkipchain, LocalNetwork, Arc<InMemoryKVStore>>>;

/// A cothority of conodes sharing one skipchain engine and one loopback
/// network.
pub struct Cothority {
    pub skipchain: Arc<InMemorySkipchain>,
    pub network: Arc<LocalNetwork>,
    pub nodes: Vec<Node>,
    pub stores: Vec<Arc<InMemoryKVStore>>,
    pub roster: Roster,
}

impl Cothority {
    /// Spin up `n` conodes, register their verifiers and wire them into
    /// the network.
    pub fn new(n: usize) -> Self {
        let skipchain = Arc::new(InMemorySkipchain::new());
        let network = Arc::new(LocalNetwork::new());
        let mut nodes = Vec::with_capacity(n);
        let mut stores = Vec::with_capacity(n);
        let mut members = Vec::with_capacity(n);

        for i in 0..n {
            let address = format!("tls://conode-{}:7000", i + 1);
            let store = Arc::new(InMemoryKVStore::new());
            let node = Self::start_node(&address, &skipchain, &network, store.clone());
            members.push(node.server().clone());
            stores.push(store);
            nodes.push(node);
        }

        Self {
            skipchain,
            network,
            nodes,
            stores,
            roster: Roster::new(members),
        }
    }

    /// Start (or restart) one conode on the given checkpoint store.
    pub fn start_node(
        address: &str,
        skipchain: &Arc<InMemorySkipchain>,
        network: &Arc<LocalNetwork>,
        store: Arc<InMemoryKVStore>,
    ) -> Node {
        let server = ServerIdentity::new(shared_crypto::hash(address.as_bytes()), address);
        let node = Arc::new(
            IdentityService::new(
                server,
                IdentityConfig::default(),
                skipchain.clone(),
                network.clone(),
                store,
            )
            .expect("service starts"),
        );
        node.register_verification();
        network.register(address, Arc::downgrade(&node) as Weak<dyn PropagationHandler>);
        node
    }

    pub fn leader(&self) -> &Node {
        &self.nodes[0]
    }

    /// Bootstrap a first admin on the leader through the PIN flow.
    pub fn bootstrap_admin(&self, seed: &[u8]) -> SchnorrKeyPair {
        let admin = SchnorrKeyPair::from_seed(seed);
        let leader = self.leader();
        let _ = leader.pin_request(&PinRequest {
            pin: String::new(),
            public: admin.public(),
        });
        let pin = leader.pending_pins().pop().expect("a PIN was minted");
        leader
            .pin_request(&PinRequest {
                pin,
                public: admin.public(),
            })
            .expect("PIN admits the admin");
        admin
    }

    /// Admit an attendee ring for anonymous auth, signed by the admin.
    pub fn admit_ring(&self, admin: &SchnorrKeyPair, attendees: Vec<PublicKey>) {
        let party = SchnorrKeyPair::from_seed(b"party-cothority");
        let mut fs = FinalStatement {
            description: "pop party 2026".into(),
            attendees,
            aggregate: party.public(),
            signature: party.sign(b"placeholder"),
        };
        fs.signature = party.sign(&fs.hash());
        let sig = admin.sign(&fs.hash());
        self.leader()
            .store_keys(&StoreKeys {
                auth_type: AuthType::Pop,
                final_statement: Some(fs),
                publics: Vec::new(),
                sig,
            })
            .expect("ring admitted");
    }

    /// Authenticate and create an identity under anonymous ring auth.
    pub fn create_identity_pop(
        &self,
        ring: &[PublicKey],
        signer: &SchnorrKeyPair,
        index: usize,
        data: Data,
    ) -> IdentityResult<CreateIdentityReply> {
        let leader = self.leader();
        let auth = leader.authenticate(&Authenticate)?;
        let sig = ring_sign(&auth.nonce, ring, signer, index, &auth.ctx).expect("ring signature");
        leader.create_identity(&CreateIdentity {
            nonce: auth.nonce,
            auth_type: AuthType::Pop,
            sig: Some(sig),
            schn_sig: None,
            data,
            roster: self.roster.clone(),
        })
    }

    /// Authenticate and create an identity under public auth.
    pub fn create_identity(
        &self,
        admin: &SchnorrKeyPair,
        data: Data,
    ) -> IdentityResult<CreateIdentityReply> {
        let leader = self.leader();
        let auth = leader.authenticate(&Authenticate)?;
        let schn_sig = admin.sign(&auth.nonce);
        leader.create_identity(&CreateIdentity {
            nonce: auth.nonce,
            auth_type: AuthType::Public,
            sig: None,
            schn_sig: Some(schn_sig),
            data,
            roster: self.roster.clone(),
        })
    }
}

/// A set of named devices with their keypairs.
pub struct Devices {
    pub keypairs: BTreeMap<String, SchnorrKeyPair>,
}

impl Devices {
    pub fn new(names: &[&str]) -> Self {
        let keypairs = names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    SchnorrKeyPair::from_seed(format!("device-{}", name).as_bytes()),
                )
            })
            .collect();
        Self { keypairs }
    }

    /// A fresh `Data` record controlled by these devices.
    pub fn data(&self, threshold: u32, roster: &Roster) -> Data {
        let device = self
            .keypairs
            .iter()
            .map(|(name, kp)| (name.clone(), Device::new(kp.public())))
            .collect();
        Data {
            threshold,
            device,
            storage: BTreeMap::new(),
            roster: roster.clone(),
            votes: BTreeMap::new(),
        }
    }

    /// Vote on the pending proposal as `name`, signing its hash.
    pub fn vote(
        &self,
        node: &Node,
        id: IdentityId,
        name: &str,
        proposed: &Data,
    ) -> IdentityResult<ProposeVoteReply> {
        let kp = &self.keypairs[name];
        node.propose_vote(&ProposeVote {
            id,
            signer: name.to_string(),
            signature: Some(kp.sign(&proposed.hash())),
        })
    }

    /// Send a rejection (empty signature) as `name`.
    pub fn reject(
        &self,
        node: &Node,
        id: IdentityId,
        name: &str,
    ) -> IdentityResult<ProposeVoteReply> {
        node.propose_vote(&ProposeVote {
            id,
            signer: name.to_string(),
            signature: None,
        })
    }
}

/// Propose a change through the leader and return the proposal.
pub fn propose(
    cothority: &Cothority,
    id: IdentityId,
    base: &Data,
    key: &str,
    value: &[u8],
) -> IdentityResult<Data> {
    let mut proposed = base.clone();
    proposed.votes.clear();
    proposed.storage.insert(key.to_string(), value.to_vec());
    cothority.leader().propose_send(&ProposeSend {
        id,
        propose: proposed.clone(),
    })?;
    Ok(proposed)
}
