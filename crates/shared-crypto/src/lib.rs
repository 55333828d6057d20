//! # Shared Crypto Crate
//!
//! The single cryptographic suite used process-wide by the identity
//! cothority: the Ristretto255 group for Schnorr and linkable ring
//! signatures, BLAKE3 for data hashing, SHA-512 for scalar derivation
//! inside signatures.
//!
//! All verification functions are pure: no internal state, no side
//! effects, same verdict on every node.

pub mod errors;
pub mod hashing;
pub mod keys;
pub mod ring;
pub mod schnorr;

pub use errors::CryptoError;
pub use hashing::{hash, hash_all, Blake3Hasher, Hash};
pub use keys::{PublicKey, SchnorrKeyPair};
pub use ring::{ring_sign, ring_verify, LinkTag, RingSignature};
pub use schnorr::{schnorr_verify, SchnorrSignature};

use rand::RngCore;

/// Fill a fresh buffer with `n` bytes from the process CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// A uniformly random 6-decimal-digit PIN, zero-padded ("000000"-"999999").
pub fn random_pin() -> String {
    let n = rand::Rng::gen_range(&mut rand::thread_rng(), 0u32..1_000_000);
    format!("{:06}", n)
}
