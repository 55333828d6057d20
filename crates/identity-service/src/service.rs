//! The service facade: request handlers binding the API messages to the
//! auth registry, the identity store, the voting state machine and the
//! propagation layer.
//!
//! Locking rules: the auth registry is guarded by one coarse lock (auth
//! operations are infrequent); per-identity state is guarded by the
//! entry's own lock; no entry lock is held across a propagation or
//! skipchain call, with the single exception of `data_update`, which
//! keeps its entry locked across the remote fetch to serialise adoption
//! of newer blocks.

use crate::auth::AuthRegistry;
use crate::domain::Data;
use crate::error::{IdentityError, IdentityResult};
use crate::events::PropagationMsg;
use crate::messages::*;
use crate::ports::outbound::{KeyValueStore, PropagationNetwork, SkipchainClient};
use crate::state::{IdentityStore, SkipchainKeyPairBytes, StorageMap};
use crate::verifier::identity_verifier_id;
use parking_lot::Mutex;
use shared_crypto::{schnorr_verify, ring_verify, Blake3Hasher, SchnorrKeyPair};
use shared_types::{IdentityId, ServerIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of this service; prefixes the authentication context.
pub const SERVICE_NAME: &str = "Identity";

/// Size of authentication nonces in bytes.
pub const NONCE_SIZE: usize = 64;

const STORAGE_KEY: &[u8] = b"storage";

/// Tunables of one conode's identity service.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    /// Single timeout applied to every propagation round.
    pub propagate_timeout: Duration,
    /// Base height of newly created skipchains.
    pub chain_base_height: u32,
    /// Maximum height of newly created skipchains.
    pub chain_maximum_height: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            propagate_timeout: Duration::from_secs(10),
            chain_base_height: 10,
            chain_maximum_height: 10,
        }
    }
}

/// One conode's identity service.
pub struct IdentityService<S, N, K>
where
    S: SkipchainClient,
    N: PropagationNetwork,
    K: KeyValueStore,
{
    server: ServerIdentity,
    config: IdentityConfig,
    pub(crate) skipchain: Arc<S>,
    network: Arc<N>,
    kv: K,
    pub(crate) store: IdentityStore,
    pub(crate) auth: Mutex<AuthRegistry>,
    skipchain_key: Mutex<Option<SchnorrKeyPair>>,
}

impl<S, N, K> IdentityService<S, N, K>
where
    S: SkipchainClient,
    N: PropagationNetwork,
    K: KeyValueStore,
{
    /// Create a service, restoring any checkpoint found in the store.
    pub fn new(
        server: ServerIdentity,
        config: IdentityConfig,
        skipchain: Arc<S>,
        network: Arc<N>,
        kv: K,
    ) -> IdentityResult<Self> {
        let service = Self {
            server,
            config,
            skipchain,
            network,
            kv,
            store: IdentityStore::new(),
            auth: Mutex::new(AuthRegistry::new()),
            skipchain_key: Mutex::new(None),
        };
        service.try_load()?;
        Ok(service)
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    /// `service_name || server_identity_string`, the domain every
    /// authentication signature is bound to.
    fn auth_context(&self) -> Vec<u8> {
        let mut ctx = SERVICE_NAME.as_bytes().to_vec();
        ctx.extend_from_slice(self.server.to_string().as_bytes());
        ctx
    }

    // --- PIN bootstrap & admission -------------------------------------

    /// Check an operator PIN, or mint one when none is given.
    pub fn pin_request(&self, req: &PinRequest) -> IdentityResult<()> {
        let mut auth = self.auth.lock();
        if req.pin.is_empty() {
            let pin = shared_crypto::random_pin();
            auth.add_pin(pin.clone());
            // Operator side channel: the PIN only ever appears in the log.
            info!(%pin, "PIN");
            return Err(IdentityError::WrongPin("read PIN in server log".into()));
        }
        if !auth.has_pin(&req.pin) {
            return Err(IdentityError::WrongPin("wrong PIN".into()));
        }
        auth.admit_admin(req.public);
        drop(auth);
        self.save();
        info!(public = %req.public, "registered first admin");
        Ok(())
    }

    /// Admit an attendee set or a batch of public keys, against an
    /// admin-key signature over the canonical message.
    pub fn store_keys(&self, req: &StoreKeys) -> IdentityResult<()> {
        let msg: Vec<u8> = match req.auth_type {
            AuthType::Pop => {
                let fs = req.final_statement.as_ref().ok_or_else(|| {
                    IdentityError::Authentication("no final statement in request".into())
                })?;
                if !fs.verify() {
                    return Err(IdentityError::InvalidSignature(
                        "final statement signature is invalid".into(),
                    ));
                }
                fs.hash().to_vec()
            }
            AuthType::Public => {
                if req.publics.is_empty() {
                    return Err(IdentityError::Authentication(
                        "no public keys in request".into(),
                    ));
                }
                let mut h = Blake3Hasher::new();
                for public in &req.publics {
                    h.update(public.as_bytes());
                }
                h.finalize().to_vec()
            }
        };

        let mut auth = self.auth.lock();
        let valid = auth
            .admin_keys()
            .iter()
            .any(|key| schnorr_verify(key, &msg, &req.sig).is_ok());
        if !valid {
            error!("no admin key matches the store-keys signature");
            return Err(IdentityError::InvalidSignature(
                "invalid signature on store-keys".into(),
            ));
        }
        match req.auth_type {
            AuthType::Pop => {
                // Presence checked above.
                if let Some(fs) = &req.final_statement {
                    auth.add_set(fs.attendees.clone());
                }
            }
            AuthType::Public => auth.add_keys(req.publics.iter().copied()),
        }
        Ok(())
    }

    /// Hand out a single-use nonce bound to this server's context.
    pub fn authenticate(&self, _req: &Authenticate) -> IdentityResult<AuthenticateReply> {
        let nonce = shared_crypto::random_bytes(NONCE_SIZE);
        self.auth.lock().add_nonce(nonce.clone());
        Ok(AuthenticateReply {
            nonce,
            ctx: self.auth_context(),
        })
    }

    // --- identity lifecycle --------------------------------------------

    /// Register a new identity: authenticate the nonce, create the root
    /// and data chains, replicate the newborn identity to the roster.
    pub fn create_identity(&self, req: &CreateIdentity) -> IdentityResult<CreateIdentityReply> {
        let ctx = self.auth_context();
        let mut tag = String::new();
        let mut pub_str = String::new();
        {
            let mut auth = self.auth.lock();
            if !auth.has_nonce(&req.nonce) {
                return Err(IdentityError::Authentication(format!(
                    "given nonce is not stored on {}",
                    self.server
                )));
            }
            let mut valid = false;
            match req.auth_type {
                AuthType::Pop => {
                    let sig = req.sig.as_ref().ok_or_else(|| {
                        IdentityError::Authentication("missing ring signature".into())
                    })?;
                    for set in auth.sets().to_vec() {
                        if let Ok(link_tag) = ring_verify(&req.nonce, &set, &ctx, sig) {
                            tag = link_tag.to_string();
                            valid = true;
                            // The counter is decremented in the propagation
                            // handler, so replicas stay converged.
                            if !auth.tag_quota_available(&tag) {
                                return Err(IdentityError::Authentication(
                                    "this pop-token is out of allowed skipchains".into(),
                                ));
                            }
                            auth.remove_nonce(&req.nonce);
                            break;
                        }
                    }
                }
                AuthType::Public => {
                    let sig = req.schn_sig.as_ref().ok_or_else(|| {
                        IdentityError::Authentication("missing schnorr signature".into())
                    })?;
                    for key in auth.keys().to_vec() {
                        if schnorr_verify(&key, &req.nonce, sig).is_ok() {
                            valid = true;
                            pub_str = key.to_string();
                            break;
                        }
                    }
                    if valid && !auth.point_quota_available(&pub_str) {
                        return Err(IdentityError::Authentication(
                            "already used up all allowed skipchains".into(),
                        ));
                    }
                }
            }
            if !valid {
                error!("authentication failed: wrong signature");
                return Err(IdentityError::Authentication(
                    "invalid signature in create-identity".into(),
                ));
            }
        }

        if !req.data.threshold_valid() {
            return Err(IdentityError::DataMissing(format!(
                "threshold {} outside device count {}",
                req.data.threshold,
                req.data.device.len()
            )));
        }

        debug!(devices = req.data.device.len(), "creating new identity");
        let signer = self.verify_skipchain_auth();
        let root = self.skipchain.create_genesis(
            &req.roster,
            self.config.chain_base_height,
            self.config.chain_maximum_height,
            &[],
            &[],
            None,
            signer.as_ref(),
        )?;
        let data_bytes = bincode::serialize(&req.data)
            .map_err(|e| IdentityError::DataMissing(e.to_string()))?;
        let data_block = self.skipchain.create_genesis(
            &root.roster,
            self.config.chain_base_height,
            self.config.chain_maximum_height,
            &[identity_verifier_id()],
            &data_bytes,
            Some(root.hash),
            signer.as_ref(),
        )?;

        let state = crate::domain::IdentityState {
            latest: req.data.clone(),
            proposed: None,
            chain_root: root.clone(),
            chain_data: data_block.clone(),
        };
        let acks = self.network.propagate(
            &root.roster,
            &PropagationMsg::PropagateIdentity {
                state,
                tag,
                pub_str,
            },
            self.config.propagate_timeout,
        )?;
        if acks < root.roster.len() {
            warn!(acks, roster = root.roster.len(), "partial identity propagation");
        }
        info!(chain = %hex::encode(&data_block.hash[..8]), "new identity chain");

        Ok(CreateIdentityReply {
            root,
            data: data_block,
        })
    }

    /// Refresh from the skipchain and return the latest accepted data.
    ///
    /// The entry stays locked across the remote fetch so concurrent
    /// updates cannot tear `latest`.
    pub fn data_update(&self, req: &DataUpdate) -> IdentityResult<DataUpdateReply> {
        let entry = self
            .store
            .get(&req.id)
            .ok_or_else(|| IdentityError::BlockMissing("didn't find identity".into()))?;
        let mut state = entry.lock();
        let update = self
            .skipchain
            .get_update_chain(&state.chain_root.roster, state.chain_data.hash)?;
        if update.len() > 1 {
            debug!(blocks = update.len() - 1, "adopting newer data blocks");
            if let Some(last) = update.last() {
                let data: Data = bincode::deserialize(&last.data)
                    .map_err(|e| IdentityError::DataMissing(e.to_string()))?;
                state.chain_data = last.clone();
                state.latest = data;
            }
        }
        Ok(DataUpdateReply {
            data: state.latest.clone(),
        })
    }

    // --- proposal & voting ---------------------------------------------

    /// Store a new proposal on every conode of the identity's roster.
    pub fn propose_send(&self, req: &ProposeSend) -> IdentityResult<()> {
        debug!(id = %req.id, "storing new proposal");
        let entry = self
            .store
            .get(&req.id)
            .ok_or_else(|| IdentityError::BlockMissing("didn't find identity".into()))?;
        let roster = entry.lock().chain_root.roster.clone();
        let acks = self.network.propagate(
            &roster,
            &PropagationMsg::ProposeSend(req.clone()),
            self.config.propagate_timeout,
        )?;
        if acks < roster.len() {
            warn!(acks, roster = roster.len(), "partial proposal propagation");
        }
        Ok(())
    }

    /// Return the pending proposal, if any.
    pub fn propose_update(&self, req: &ProposeUpdate) -> IdentityResult<ProposeUpdateReply> {
        let entry = self
            .store
            .get(&req.id)
            .ok_or_else(|| IdentityError::BlockMissing("didn't find identity".into()))?;
        let propose = entry.lock().proposed.clone();
        Ok(ProposeUpdateReply { propose })
    }

    /// Take one device's vote into account. When the vote crosses the
    /// threshold, append the accepted data to the skipchain and replicate
    /// the new block.
    pub fn propose_vote(&self, req: &ProposeVote) -> IdentityResult<ProposeVoteReply> {
        debug!(id = %req.id, signer = %req.signer, "voting on proposal");
        let entry = self
            .store
            .get(&req.id)
            .ok_or_else(|| IdentityError::BlockMissing("didn't find identity".into()))?;

        // Validate under the entry lock, then release it: the vote is
        // applied through propagation, whose handlers re-acquire it.
        let roster = {
            let state = entry.lock();
            let device = state
                .latest
                .device
                .get(&req.signer)
                .ok_or_else(|| IdentityError::AccountMissing("didn't find signer".into()))?;
            let proposed = state
                .proposed
                .as_ref()
                .ok_or_else(|| IdentityError::DataMissing("no proposed block".into()))?;
            let hash = proposed.hash();
            if let Some(old) = proposed.votes.get(&req.signer) {
                if schnorr_verify(&device.point, &hash, old).is_ok() {
                    debug!(signer = %req.signer, "signer already voted for this proposal");
                }
            }
            if let Some(sig) = &req.signature {
                schnorr_verify(&device.point, &hash, sig).map_err(|e| {
                    IdentityError::VoteSignature(format!("wrong signature: {}", e))
                })?;
            }
            state.chain_root.roster.clone()
        };

        self.network.propagate(
            &roster,
            &PropagationMsg::ProposeVote(req.clone()),
            self.config.propagate_timeout,
        )?;

        // Threshold check on the replicated vote set.
        let commit = {
            let state = entry.lock();
            state.proposed.as_ref().and_then(|proposed| {
                if state.latest.vote_threshold_reached(proposed.votes.len()) {
                    Some((
                        state.chain_data.clone(),
                        proposed.roster.clone(),
                        bincode::serialize(proposed),
                    ))
                } else {
                    None
                }
            })
        };

        if let Some((prev, new_roster, encoded)) = commit {
            info!(id = %req.id, "vote threshold reached, appending data block");
            let data_bytes =
                encoded.map_err(|e| IdentityError::DataMissing(e.to_string()))?;
            let signer = self.verify_skipchain_auth();
            let latest =
                self.skipchain
                    .store_block(&prev, &new_roster, &data_bytes, signer.as_ref())?;
            let acks = self.network.propagate(
                &roster,
                &PropagationMsg::UpdateSkipBlock {
                    id: req.id,
                    latest,
                },
                self.config.propagate_timeout,
            )?;
            if acks < roster.len() {
                warn!(acks, roster = roster.len(), "partial block propagation");
            }
            return Ok(ProposeVoteReply {
                data: Some(entry.lock().chain_data.clone()),
            });
        }
        Ok(ProposeVoteReply { data: None })
    }

    // --- skipchain authentication --------------------------------------

    /// Register our own signing key with the skipchain, but only when the
    /// engine already has client keys; a fresh service must not lock down
    /// an otherwise open skipchain.
    pub(crate) fn verify_skipchain_auth(&self) -> Option<SchnorrKeyPair> {
        if !self.skipchain.has_client_keys() {
            return None;
        }
        let (keypair, created) = {
            let mut slot = self.skipchain_key.lock();
            let created = slot.is_none();
            let keypair = slot.get_or_insert_with(SchnorrKeyPair::generate).clone();
            (keypair, created)
        };
        self.skipchain.add_client_key(keypair.public());
        if created {
            self.save();
        }
        Some(keypair)
    }

    // --- persistence ---------------------------------------------------

    /// Checkpoint the full identity map and the skipchain keypair.
    /// Failures are logged, never surfaced: the in-memory state stays
    /// authoritative.
    pub(crate) fn save(&self) {
        let snapshot = StorageMap {
            identities: self.store.snapshot(),
            skipchain_keypair: self.skipchain_key.lock().as_ref().map(|kp| {
                SkipchainKeyPairBytes {
                    secret: kp.secret_bytes(),
                    public: *kp.public().as_bytes(),
                }
            }),
        };
        match bincode::serialize(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = self.kv.put(STORAGE_KEY, &bytes) {
                    error!(error = %e, "couldn't checkpoint service state");
                }
            }
            Err(e) => error!(error = %e, "couldn't encode service state"),
        }
    }

    fn try_load(&self) -> IdentityResult<()> {
        let bytes = match self
            .kv
            .get(STORAGE_KEY)
            .map_err(|e| IdentityError::Transport(e.to_string()))?
        {
            Some(bytes) => bytes,
            None => return Ok(()),
        };
        let snapshot: StorageMap = bincode::deserialize(&bytes)
            .map_err(|e| IdentityError::DataMissing(format!("corrupt checkpoint: {}", e)))?;
        self.store.restore(snapshot.identities);
        if let Some(kp) = snapshot.skipchain_keypair {
            let keypair = SchnorrKeyPair::from_secret_bytes(kp.secret)
                .map_err(|e| IdentityError::DataMissing(format!("corrupt keypair: {}", e)))?;
            *self.skipchain_key.lock() = Some(keypair);
        }
        info!(identities = self.store.len(), "restored checkpoint");
        Ok(())
    }

    // --- operator & inspection hooks -----------------------------------

    /// PINs minted on this conode and still awaiting registration.
    /// Operator hook; PINs normally travel via the server log.
    pub fn pending_pins(&self) -> Vec<String> {
        self.auth.lock().pins().cloned().collect()
    }

    /// Snapshot of one identity's replicated state.
    pub fn identity_state(&self, id: &IdentityId) -> Option<crate::domain::IdentityState> {
        self.store.get(id).map(|entry| entry.snapshot())
    }

    /// Remaining creations for a ring-signature tag, if ever seen.
    pub fn tag_quota(&self, tag: &str) -> Option<i8> {
        self.auth.lock().tag_quota(tag)
    }

    /// Remaining creations for a public-key credential, if ever seen.
    pub fn point_quota(&self, pub_str: &str) -> Option<i8> {
        self.auth.lock().point_quota(pub_str)
    }

    /// Administrative wipe of every identity. Normal operations never
    /// remove identities.
    pub fn clear_identities(&self) {
        self.store.clear();
        self.save();
    }
}
