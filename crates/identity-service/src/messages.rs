//! Client-facing API messages, one request/reply pair per operation.

use crate::domain::{Data, FinalStatement};
use serde::{Deserialize, Serialize};
use shared_crypto::{PublicKey, RingSignature, SchnorrSignature};
use shared_types::{IdentityId, Roster, SkipBlock};

/// Which credential regime a request authenticates under.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum AuthType {
    /// Anonymous linkable ring signature over an attendee set.
    Pop,
    /// Plain Schnorr signature under a registered public key.
    Public,
}

/// Bootstrap a first admin with a one-time PIN, or request a fresh PIN
/// when none is supplied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PinRequest {
    pub pin: String,
    pub public: PublicKey,
}

/// Admit an attendee set (PoP) or a batch of public keys (Public),
/// signed by an admin key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreKeys {
    pub auth_type: AuthType,
    pub final_statement: Option<FinalStatement>,
    pub publics: Vec<PublicKey>,
    pub sig: SchnorrSignature,
}

/// Obtain a single-use nonce and the signing context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Authenticate;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticateReply {
    /// 64 random bytes, valid for one creation.
    pub nonce: Vec<u8>,
    /// `service_name || server_identity_string`.
    pub ctx: Vec<u8>,
}

/// Register a new identity after authenticating the nonce.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateIdentity {
    pub nonce: Vec<u8>,
    pub auth_type: AuthType,
    /// Ring signature over the nonce (PoP auth).
    pub sig: Option<RingSignature>,
    /// Schnorr signature over the nonce (public auth).
    pub schn_sig: Option<SchnorrSignature>,
    pub data: Data,
    pub roster: Roster,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateIdentityReply {
    pub root: SkipBlock,
    pub data: SkipBlock,
}

/// Fetch the latest accepted data, refreshing from the skipchain first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataUpdate {
    pub id: IdentityId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataUpdateReply {
    pub data: Data,
}

/// Store a new proposal; signatures come later, one vote at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposeSend {
    pub id: IdentityId,
    pub propose: Data,
}

/// Fetch the pending proposal, if any.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposeUpdate {
    pub id: IdentityId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposeUpdateReply {
    pub propose: Option<Data>,
}

/// One device's vote on the pending proposal.
///
/// An absent signature is a rejection: it erases any earlier vote from
/// this signer on every conode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposeVote {
    pub id: IdentityId,
    pub signer: String,
    pub signature: Option<SchnorrSignature>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposeVoteReply {
    /// The committed data block when this vote crossed the threshold.
    pub data: Option<SkipBlock>,
}
