//! The configuration record controlled by an identity's devices.

use serde::{Deserialize, Serialize};
use shared_crypto::{Blake3Hasher, Hash, PublicKey, SchnorrSignature};
use shared_types::Roster;
use std::collections::BTreeMap;

/// A named device: one public key authorised to vote on changes.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Device {
    pub point: PublicKey,
}

impl Device {
    pub fn new(point: PublicKey) -> Self {
        Self { point }
    }
}

/// One version of an identity's configuration.
///
/// `votes` carries the device signatures over this record's own hash,
/// which is why the hash domain excludes it: every node must compute the
/// same hash whether it has seen zero votes or all of them.
///
/// All maps are ordered so encodings are identical across nodes.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Data {
    /// Minimum device-vote count required to accept a successor record.
    pub threshold: u32,
    /// Device name to public key. Names are printable and unique.
    pub device: BTreeMap<String, Device>,
    /// The shared key/value record.
    pub storage: BTreeMap<String, Vec<u8>>,
    /// Conodes responsible for this identity.
    pub roster: Roster,
    /// Device name to Schnorr signature over `self.hash()`.
    pub votes: BTreeMap<String, SchnorrSignature>,
}

impl Data {
    /// Hash of the record with the votes excluded.
    ///
    /// Fields are fed to the hasher directly instead of through a
    /// serializer, so the hash cannot drift with encoder versions.
    pub fn hash(&self) -> Hash {
        let mut h = Blake3Hasher::new();
        h.update(&self.threshold.to_le_bytes());
        h.update(&(self.device.len() as u64).to_le_bytes());
        for (name, device) in &self.device {
            h.update(&(name.len() as u64).to_le_bytes());
            h.update(name.as_bytes());
            h.update(device.point.as_bytes());
        }
        h.update(&(self.storage.len() as u64).to_le_bytes());
        for (key, value) in &self.storage {
            h.update(&(key.len() as u64).to_le_bytes());
            h.update(key.as_bytes());
            h.update(&(value.len() as u64).to_le_bytes());
            h.update(value);
        }
        h.update(&(self.roster.len() as u64).to_le_bytes());
        for si in &self.roster.list {
            h.update(&si.public);
            h.update(si.address.as_bytes());
        }
        h.finalize()
    }

    /// Whether the threshold is satisfiable by this device set.
    pub fn threshold_valid(&self) -> bool {
        self.threshold > 0 && self.threshold as usize <= self.device.len()
    }

    /// The commit rule: enough votes, or every single device.
    pub fn vote_threshold_reached(&self, votes: usize) -> bool {
        (votes >= self.threshold as usize || votes == self.device.len()) && !self.device.is_empty()
    }
}

/// Finalisation statement of a proof-of-personhood party.
///
/// Carries the attendee ring admitted for anonymous authentication, plus
/// the party cothority's collective signature over the statement.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FinalStatement {
    /// Free-form party descriptor (name, date, location).
    pub description: String,
    /// Attendee public keys, in the order fixed at finalisation.
    pub attendees: Vec<PublicKey>,
    /// Aggregate key of the party cothority.
    pub aggregate: PublicKey,
    /// Collective signature over `self.hash()`.
    pub signature: SchnorrSignature,
}

impl FinalStatement {
    /// Hash of the statement with the signature excluded.
    pub fn hash(&self) -> Hash {
        let mut h = Blake3Hasher::new();
        h.update(&(self.description.len() as u64).to_le_bytes());
        h.update(self.description.as_bytes());
        h.update(&(self.attendees.len() as u64).to_le_bytes());
        for attendee in &self.attendees {
            h.update(attendee.as_bytes());
        }
        h.update(self.aggregate.as_bytes());
        h.finalize()
    }

    /// Check the statement's own collective signature.
    pub fn verify(&self) -> bool {
        shared_crypto::schnorr_verify(&self.aggregate, &self.hash(), &self.signature).is_ok()
    }
}
