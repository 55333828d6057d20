//! Schnorr signatures over Ristretto255.
//!
//! Classic `(R, s)` form: challenge `c = H512(R || P || msg)` reduced to a
//! scalar, accept iff `s*G == R + c*P`. Verification is pure.

use crate::errors::CryptoError;
use crate::keys::{PublicKey, SchnorrKeyPair};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Schnorr signature: commitment point and response scalar.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SchnorrSignature {
    r: [u8; 32],
    s: [u8; 32],
}

impl SchnorrSignature {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self { r, s }
    }
}

fn challenge(r: &[u8; 32], public: &PublicKey, msg: &[u8]) -> Scalar {
    let mut h = Sha512::new();
    h.update(b"identity-schnorr-v1");
    h.update(r);
    h.update(public.as_bytes());
    h.update(msg);
    Scalar::from_hash(h)
}

impl SchnorrKeyPair {
    /// Sign a message with a fresh random commitment.
    pub fn sign(&self, msg: &[u8]) -> SchnorrSignature {
        let k = Scalar::random(&mut rand::thread_rng());
        let r_point = RISTRETTO_BASEPOINT_POINT * k;
        let r = r_point.compress().to_bytes();
        let c = challenge(&r, &self.public(), msg);
        let s = k + c * self.secret();
        SchnorrSignature { r, s: s.to_bytes() }
    }
}

/// Verify a Schnorr signature against a public key.
pub fn schnorr_verify(
    public: &PublicKey,
    msg: &[u8],
    sig: &SchnorrSignature,
) -> Result<(), CryptoError> {
    let r_point: RistrettoPoint = CompressedRistretto(sig.r)
        .decompress()
        .ok_or(CryptoError::SignatureInvalid)?;
    let s: Option<Scalar> = Scalar::from_canonical_bytes(sig.s).into();
    let s = s.ok_or(CryptoError::SignatureInvalid)?;
    let p = public.point()?;

    let c = challenge(&sig.r, public, msg);
    if RISTRETTO_BASEPOINT_POINT * s == r_point + p * c {
        Ok(())
    } else {
        Err(CryptoError::SignatureInvalid)
    }
}
