//! Linkable ring signatures over Ristretto255 (LSAG).
//!
//! A member of an attendee set signs without revealing which member it is.
//! Signatures made by the same member within the same linkage scope carry
//! the same tag, so a verifier can rate-limit a pseudonym without ever
//! learning the key behind it.
//!
//! Construction: the linkage base is the hash-to-point of the scope, the
//! tag is `x * base`, and the challenge chain walks the ring starting from
//! `c0`. Accept iff the chain closes.

use crate::errors::CryptoError;
use crate::keys::{PublicKey, SchnorrKeyPair};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;

/// Linkable ring signature.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RingSignature {
    c0: [u8; 32],
    responses: Vec<[u8; 32]>,
    tag: [u8; 32],
}

/// Per-scope linkable pseudonym extracted from a valid ring signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkTag([u8; 32]);

impl LinkTag {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for LinkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for LinkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkTag({})", hex::encode(&self.0[..8]))
    }
}

fn link_base(scope: &[u8]) -> RistrettoPoint {
    let mut h = Sha512::new();
    h.update(b"identity-ring-base-v1");
    h.update(scope);
    RistrettoPoint::from_hash(h)
}

/// Challenge over the full transcript plus the two per-step commitments.
fn challenge(
    msg: &[u8],
    ring: &[PublicKey],
    tag: &[u8; 32],
    a: &RistrettoPoint,
    b: &RistrettoPoint,
) -> Scalar {
    let mut h = Sha512::new();
    h.update(b"identity-ring-chal-v1");
    h.update((ring.len() as u64).to_le_bytes());
    for member in ring {
        h.update(member.as_bytes());
    }
    h.update(tag);
    h.update(msg);
    h.update(a.compress().as_bytes());
    h.update(b.compress().as_bytes());
    Scalar::from_hash(h)
}

/// Sign `msg` as ring member `index` within the given linkage scope.
pub fn ring_sign(
    msg: &[u8],
    ring: &[PublicKey],
    signer: &SchnorrKeyPair,
    index: usize,
    scope: &[u8],
) -> Result<RingSignature, CryptoError> {
    let n = ring.len();
    if n == 0 || index >= n {
        return Err(CryptoError::RingMismatch(format!(
            "index {} outside ring of {}",
            index, n
        )));
    }
    if ring[index] != signer.public() {
        return Err(CryptoError::RingMismatch(
            "signer key not at claimed ring position".into(),
        ));
    }
    let points = ring
        .iter()
        .map(|pk| pk.point())
        .collect::<Result<Vec<_>, _>>()?;

    let base = link_base(scope);
    let tag_point = base * signer.secret();
    let tag = tag_point.compress().to_bytes();

    let mut rng = rand::thread_rng();
    let mut c = vec![Scalar::ZERO; n];
    let mut s = vec![Scalar::ZERO; n];

    // Start at our own slot with a fresh commitment, then walk the ring
    // with random responses until the challenge for our slot comes back.
    let u = Scalar::random(&mut rng);
    let a = RISTRETTO_BASEPOINT_POINT * u;
    let b = base * u;
    c[(index + 1) % n] = challenge(msg, ring, &tag, &a, &b);

    for step in 1..n {
        let i = (index + step) % n;
        let next = (i + 1) % n;
        s[i] = Scalar::random(&mut rng);
        let a = RISTRETTO_BASEPOINT_POINT * s[i] + points[i] * c[i];
        let b = base * s[i] + tag_point * c[i];
        c[next] = challenge(msg, ring, &tag, &a, &b);
    }

    s[index] = u - c[index] * signer.secret();

    Ok(RingSignature {
        c0: c[0].to_bytes(),
        responses: s.iter().map(|si| si.to_bytes()).collect(),
        tag,
    })
}

/// Verify a ring signature; on success return the linkable tag.
pub fn ring_verify(
    msg: &[u8],
    ring: &[PublicKey],
    scope: &[u8],
    sig: &RingSignature,
) -> Result<LinkTag, CryptoError> {
    let n = ring.len();
    if n == 0 || sig.responses.len() != n {
        return Err(CryptoError::RingMismatch(format!(
            "{} responses for ring of {}",
            sig.responses.len(),
            n
        )));
    }
    let points = ring
        .iter()
        .map(|pk| pk.point())
        .collect::<Result<Vec<_>, _>>()?;
    let tag_point = CompressedRistretto(sig.tag)
        .decompress()
        .ok_or(CryptoError::SignatureInvalid)?;
    let base = link_base(scope);

    let c0: Option<Scalar> = Scalar::from_canonical_bytes(sig.c0).into();
    let mut c = c0.ok_or(CryptoError::SignatureInvalid)?;

    for i in 0..n {
        let si: Option<Scalar> = Scalar::from_canonical_bytes(sig.responses[i]).into();
        let si = si.ok_or(CryptoError::SignatureInvalid)?;
        let a = RISTRETTO_BASEPOINT_POINT * si + points[i] * c;
        let b = base * si + tag_point * c;
        c = challenge(msg, ring, &sig.tag, &a, &b);
    }

    if c.to_bytes() == sig.c0 {
        Ok(LinkTag(sig.tag))
    } else {
        Err(CryptoError::SignatureInvalid)
    }
}
