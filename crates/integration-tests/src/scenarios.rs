//! End-to-end scenarios over a three-conode cothority.

use crate::harness::{propose, Cothority, Devices};
use identity_service::error::SkipchainError;
use identity_service::ports::outbound::{InMemoryKVStore, KeyValueStore, PropagationHandler};
use identity_service::ports::SkipchainClient;
use identity_service::{
    AuthType, Authenticate, CreateIdentity, DataUpdate, IdentityState, PropagationMsg,
    ProposeUpdate, ProposeVote, StorageMap, DEFAULT_CHAIN_QUOTA,
};
use shared_crypto::{ring_sign, ring_verify, SchnorrKeyPair};
use shared_types::{ErrorCode, IdentityId};
use std::sync::Arc;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_happy_path_single_device() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1"]);
    let data = devices.data(1, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    // Every conode holds the newborn identity.
    for node in &cothority.nodes {
        let state = node.identity_state(&id).expect("identity replicated");
        assert_eq!(state.latest, data);
        assert!(state.proposed.is_none());
    }

    // Propose {foo: bar}, visible on every conode.
    let proposed = propose(&cothority, id, &data, "foo", b"bar").unwrap();
    for node in &cothority.nodes {
        let pending = node
            .propose_update(&ProposeUpdate { id })
            .unwrap()
            .propose
            .expect("proposal replicated");
        assert_eq!(pending.storage["foo"], b"bar".to_vec());
    }

    // A single valid vote commits at threshold 1.
    let reply = devices
        .vote(cothority.leader(), id, "d1", &proposed)
        .unwrap();
    let block = reply.data.expect("vote crossed the threshold");
    assert_eq!(block.index, 1);

    // All replicas adopted the block and cleared the proposal.
    for node in &cothority.nodes {
        let update = node.data_update(&DataUpdate { id }).unwrap();
        assert_eq!(update.data.storage["foo"], b"bar".to_vec());
        let state = node.identity_state(&id).unwrap();
        assert!(state.proposed.is_none());
        assert_eq!(state.chain_data.hash, block.hash);
    }
}

#[test]
fn test_threshold_two_of_three() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2", "d3"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    let proposed = propose(&cothority, id, &data, "ssh", b"ed25519 AAAA").unwrap();

    // First vote: recorded everywhere, no commit yet.
    let reply = devices
        .vote(cothority.leader(), id, "d1", &proposed)
        .unwrap();
    assert!(reply.data.is_none());
    for node in &cothority.nodes {
        let state = node.identity_state(&id).unwrap();
        let pending = state.proposed.as_ref().unwrap();
        assert_eq!(pending.votes.len(), 1);
        // Recorded votes always come from known devices.
        assert!(pending
            .votes
            .keys()
            .all(|name| state.latest.device.contains_key(name)));
    }

    // Second vote crosses the threshold.
    let reply = devices
        .vote(cothority.leader(), id, "d2", &proposed)
        .unwrap();
    assert!(reply.data.is_some());

    for node in &cothority.nodes {
        let state = node.identity_state(&id).unwrap();
        assert!(state.proposed.is_none());
        assert_eq!(state.latest.storage["ssh"], b"ed25519 AAAA".to_vec());
    }
}

#[test]
fn test_wrong_signer_leaves_state_untouched() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2", "d3"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    let proposed = propose(&cothority, id, &data, "k", b"v").unwrap();
    devices.vote(cothority.leader(), id, "d1", &proposed).unwrap();

    let d4 = SchnorrKeyPair::from_seed(b"device-d4");
    let err = cothority
        .leader()
        .propose_vote(&ProposeVote {
            id,
            signer: "d4".into(),
            signature: Some(d4.sign(&proposed.hash())),
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AccountMissing);

    for node in &cothority.nodes {
        let state = node.identity_state(&id).unwrap();
        assert_eq!(state.proposed.as_ref().unwrap().votes.len(), 1);
    }
}

#[test]
fn test_rejection_vote_erases_earlier_vote() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2", "d3"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    let proposed = propose(&cothority, id, &data, "k", b"v").unwrap();
    devices.vote(cothority.leader(), id, "d1", &proposed).unwrap();

    // d1 changes its mind: the empty signature erases the earlier vote on
    // every conode.
    devices.reject(cothority.leader(), id, "d1").unwrap();
    for node in &cothority.nodes {
        let state = node.identity_state(&id).unwrap();
        assert!(state.proposed.as_ref().unwrap().votes.is_empty());
    }

    // d2 alone is below threshold now.
    let reply = devices
        .vote(cothority.leader(), id, "d2", &proposed)
        .unwrap();
    assert!(reply.data.is_none());

    // d1 voting again commits.
    let reply = devices
        .vote(cothority.leader(), id, "d1", &proposed)
        .unwrap();
    assert!(reply.data.is_some());
}

#[test]
fn test_new_proposal_discards_pending_votes() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    let first = propose(&cothority, id, &data, "k", b"v1").unwrap();
    devices.vote(cothority.leader(), id, "d1", &first).unwrap();

    // A fresh proposal replaces the pending one wholesale.
    let second = propose(&cothority, id, &data, "k", b"v2").unwrap();
    for node in &cothority.nodes {
        let pending = node.identity_state(&id).unwrap().proposed.unwrap();
        assert_eq!(pending.storage["k"], b"v2".to_vec());
        assert!(pending.votes.is_empty());
    }

    // The stale vote over the first proposal no longer counts.
    let reply = devices
        .vote(cothority.leader(), id, "d2", &second)
        .unwrap();
    assert!(reply.data.is_none());
}

#[test]
fn test_stale_vote_delivery_is_discarded() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    let current = propose(&cothority, id, &data, "k", b"current").unwrap();

    // A vote over some other (older) proposal arrives out of order.
    let mut stale = data.clone();
    stale.storage.insert("k".into(), b"stale".to_vec());
    let kp = &devices.keypairs["d1"];
    let stray = PropagationMsg::ProposeVote(ProposeVote {
        id,
        signer: "d1".into(),
        signature: Some(kp.sign(&stale.hash())),
    });
    cothority.nodes[1].handle_propagation(&stray);

    // Discarded: it does not verify against the current proposal.
    let state = cothority.nodes[1].identity_state(&id).unwrap();
    assert!(state.proposed.as_ref().unwrap().votes.is_empty());

    // A matching vote still lands.
    devices.vote(cothority.leader(), id, "d1", &current).unwrap();
    let state = cothority.nodes[1].identity_state(&id).unwrap();
    assert_eq!(state.proposed.as_ref().unwrap().votes.len(), 1);
}

#[test]
fn test_redelivered_vote_is_absorbed() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    let proposed = propose(&cothority, id, &data, "k", b"v").unwrap();
    let sig = devices.keypairs["d1"].sign(&proposed.hash());
    let vote = ProposeVote {
        id,
        signer: "d1".into(),
        signature: Some(sig),
    };
    cothority.leader().propose_vote(&vote).unwrap();

    let before: Vec<IdentityState> = cothority
        .nodes
        .iter()
        .map(|n| n.identity_state(&id).unwrap())
        .collect();

    // Byte-identical re-delivery changes nothing.
    for node in &cothority.nodes {
        node.handle_propagation(&PropagationMsg::ProposeVote(vote.clone()));
    }
    for (node, earlier) in cothority.nodes.iter().zip(&before) {
        assert_eq!(node.identity_state(&id).unwrap(), *earlier);
    }
}

#[test]
fn test_pop_create_and_nonce_replay() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let attendees: Vec<SchnorrKeyPair> = (0..3)
        .map(|i| SchnorrKeyPair::from_seed(format!("attendee-{}", i).as_bytes()))
        .collect();
    let ring: Vec<_> = attendees.iter().map(|kp| kp.public()).collect();
    cothority.admit_ring(&admin, ring.clone());

    let devices = Devices::new(&["d1"]);
    let data = devices.data(1, &cothority.roster);

    // Create anonymously, keeping the nonce around.
    let leader = cothority.leader();
    let auth = leader.authenticate(&Authenticate).unwrap();
    let sig = ring_sign(&auth.nonce, &ring, &attendees[1], 1, &auth.ctx).unwrap();
    let reply = leader
        .create_identity(&CreateIdentity {
            nonce: auth.nonce.clone(),
            auth_type: AuthType::Pop,
            sig: Some(sig),
            schn_sig: None,
            data: data.clone(),
            roster: cothority.roster.clone(),
        })
        .unwrap();
    let id = IdentityId(reply.data.hash);
    assert!(cothority.nodes[2].identity_state(&id).is_some());

    // The nonce was consumed: replaying it fails even with a fresh,
    // valid ring signature.
    let mut replay_data = data;
    replay_data.storage.insert("replay".into(), b"x".to_vec());
    let sig = ring_sign(&auth.nonce, &ring, &attendees[1], 1, &auth.ctx).unwrap();
    let err = leader
        .create_identity(&CreateIdentity {
            nonce: auth.nonce,
            auth_type: AuthType::Pop,
            sig: Some(sig),
            schn_sig: None,
            data: replay_data,
            roster: cothority.roster.clone(),
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Authentication);
}

#[test]
fn test_pop_quota_exhaustion() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let attendees: Vec<SchnorrKeyPair> = (0..2)
        .map(|i| SchnorrKeyPair::from_seed(format!("attendee-{}", i).as_bytes()))
        .collect();
    let ring: Vec<_> = attendees.iter().map(|kp| kp.public()).collect();
    cothority.admit_ring(&admin, ring.clone());

    let devices = Devices::new(&["d1"]);
    let leader = cothority.leader();

    // The same attendee (same tag) may create the default number of
    // chains; the counter decreases once per accepted creation, on every
    // conode, and never increases.
    let mut tag = String::new();
    for i in 0..DEFAULT_CHAIN_QUOTA {
        let mut data = devices.data(1, &cothority.roster);
        data.storage.insert("chain".into(), vec![i as u8]);

        let auth = leader.authenticate(&Authenticate).unwrap();
        let sig = ring_sign(&auth.nonce, &ring, &attendees[0], 0, &auth.ctx).unwrap();
        tag = ring_verify(&auth.nonce, &ring, &auth.ctx, &sig)
            .unwrap()
            .to_string();
        leader
            .create_identity(&CreateIdentity {
                nonce: auth.nonce,
                auth_type: AuthType::Pop,
                sig: Some(sig),
                schn_sig: None,
                data,
                roster: cothority.roster.clone(),
            })
            .unwrap();

        for node in &cothority.nodes {
            assert_eq!(node.tag_quota(&tag), Some(DEFAULT_CHAIN_QUOTA - 1 - i));
        }
    }

    // The sixth creation fails while the counter stays at zero.
    let auth = leader.authenticate(&Authenticate).unwrap();
    let sig = ring_sign(&auth.nonce, &ring, &attendees[0], 0, &auth.ctx).unwrap();
    let err = leader
        .create_identity(&CreateIdentity {
            nonce: auth.nonce,
            auth_type: AuthType::Pop,
            sig: Some(sig),
            schn_sig: None,
            data: devices.data(1, &cothority.roster),
            roster: cothority.roster.clone(),
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Authentication);
    for node in &cothority.nodes {
        assert_eq!(node.tag_quota(&tag), Some(0));
    }

    // A different attendee still has its own budget.
    let mut data = devices.data(1, &cothority.roster);
    data.storage.insert("other".into(), b"ring".to_vec());
    let auth = leader.authenticate(&Authenticate).unwrap();
    let sig = ring_sign(&auth.nonce, &ring, &attendees[1], 1, &auth.ctx).unwrap();
    leader
        .create_identity(&CreateIdentity {
            nonce: auth.nonce,
            auth_type: AuthType::Pop,
            sig: Some(sig),
            schn_sig: None,
            data,
            roster: cothority.roster.clone(),
        })
        .unwrap();
}

#[test]
fn test_duplicate_identity_propagation_refused() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1"]);
    let data = devices.data(1, &cothority.roster);
    let reply = cothority.create_identity(&admin, data).unwrap();
    let id = IdentityId(reply.data.hash);

    let original = cothority.leader().identity_state(&id).unwrap();

    // A second propagation for the same chain, carrying different
    // contents, must not displace the stored identity.
    let mut forged = original.clone();
    forged
        .latest
        .storage
        .insert("evil".into(), b"yes".to_vec());
    cothority
        .leader()
        .handle_propagation(&PropagationMsg::PropagateIdentity {
            state: forged,
            tag: String::new(),
            pub_str: String::new(),
        });

    assert_eq!(cothority.leader().identity_state(&id).unwrap(), original);
}

#[test]
fn test_forged_block_refused_by_verifiers() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1", "d2"]);
    let data = devices.data(2, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();

    // Offer a successor with no votes straight to the skipchain: every
    // conode's verifier must refuse it.
    let mut forged = data.clone();
    forged.storage.insert("evil".into(), b"yes".to_vec());
    let bytes = bincode::serialize(&forged).unwrap();
    let err = cothority
        .skipchain
        .store_block(&reply.data, &cothority.roster, &bytes, None);
    assert!(matches!(err, Err(SkipchainError::VerificationFailed(_))));

    // With a threshold of signatures the same payload goes through.
    let mut signed = forged.clone();
    let hash = signed.hash();
    for name in ["d1", "d2"] {
        signed
            .votes
            .insert(name.into(), devices.keypairs[name].sign(&hash));
    }
    let bytes = bincode::serialize(&signed).unwrap();
    cothority
        .skipchain
        .store_block(&reply.data, &cothority.roster, &bytes, None)
        .unwrap();
}

#[test]
fn test_checkpoint_restart_and_catch_up() {
    init_logging();
    let cothority = Cothority::new(3);
    let admin = cothority.bootstrap_admin(b"admin");

    let devices = Devices::new(&["d1"]);
    let data = devices.data(1, &cothority.roster);
    let reply = cothority.create_identity(&admin, data.clone()).unwrap();
    let id = IdentityId(reply.data.hash);

    // Capture conode 2's checkpoint before the commit.
    let stale_bytes = cothority.stores[2].get(b"storage").unwrap().unwrap();

    // Checkpoints are byte-stable across decode/encode.
    let decoded: StorageMap = bincode::deserialize(&stale_bytes).unwrap();
    assert_eq!(bincode::serialize(&decoded).unwrap(), stale_bytes);

    // Commit a change while conode 2 is "offline".
    let proposed = propose(&cothority, id, &data, "foo", b"bar").unwrap();
    devices.vote(cothority.leader(), id, "d1", &proposed).unwrap();

    // Restart conode 2 from its stale checkpoint; it rejoins the network
    // knowing only the genesis state.
    let stale_store = Arc::new(InMemoryKVStore::new());
    stale_store.put(b"storage", &stale_bytes).unwrap();
    let restarted = Cothority::start_node(
        &cothority.nodes[2].server().address.clone(),
        &cothority.skipchain,
        &cothority.network,
        stale_store,
    );
    let state = restarted.identity_state(&id).unwrap();
    assert!(state.latest.storage.is_empty());

    // A data update walks the chain and adopts the committed block.
    let update = restarted.data_update(&DataUpdate { id }).unwrap();
    assert_eq!(update.data.storage["foo"], b"bar".to_vec());
    let state = restarted.identity_state(&id).unwrap();
    assert_eq!(state.chain_data.index, 1);
}

#[test]
fn test_concurrent_identities_commit_independently() {
    init_logging();
    let cothority = Arc::new(Cothority::new(3));
    let admin = cothority.bootstrap_admin(b"admin");

    let mut handles = Vec::new();
    for i in 0..4 {
        let cothority = cothority.clone();
        let devices = Devices::new(&["d1", "d2"]);
        let mut data = devices.data(2, &cothority.roster);
        data.storage.insert("slot".into(), vec![i as u8]);
        let reply = cothority.create_identity(&admin, data.clone()).unwrap();
        let id = IdentityId(reply.data.hash);

        handles.push(std::thread::spawn(move || {
            let proposed = propose(&cothority, id, &data, "value", &[i as u8]).unwrap();
            devices.vote(cothority.leader(), id, "d1", &proposed).unwrap();
            let reply = devices.vote(cothority.leader(), id, "d2", &proposed).unwrap();
            assert!(reply.data.is_some());
            id
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let id = handle.join().expect("thread completed");
        for node in &cothority.nodes {
            let state = node.identity_state(&id).unwrap();
            assert_eq!(state.latest.storage["value"], vec![i as u8]);
            assert!(state.proposed.is_none());
        }
    }
}
