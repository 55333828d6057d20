//! Ristretto255 public keys and Schnorr keypairs.

use crate::errors::CryptoError;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use zeroize::Zeroize;

/// Compressed Ristretto255 public key (32 bytes).
///
/// The hex form doubles as the credential string used to key per-public-key
/// creation quotas, so `Display` must stay stable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Create from bytes, validating the point encoding.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        CompressedRistretto(bytes)
            .decompress()
            .ok_or(CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// The marshalled form: the 32 compressed-point bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn point(&self) -> Result<RistrettoPoint, CryptoError> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(CryptoError::InvalidPublicKey)
    }

    pub(crate) fn from_point(point: &RistrettoPoint) -> Self {
        Self(point.compress().to_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

/// Schnorr keypair over Ristretto255.
///
/// The secret scalar is zeroized on drop.
pub struct SchnorrKeyPair {
    secret: Scalar,
    public: RistrettoPoint,
}

impl SchnorrKeyPair {
    /// Generate a random keypair from the process CSPRNG.
    pub fn generate() -> Self {
        let secret = Scalar::random(&mut rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Derive a keypair deterministically from a seed.
    pub fn from_seed(seed: &[u8]) -> Self {
        let secret = Scalar::hash_from_bytes::<Sha512>(seed);
        Self::from_secret(secret)
    }

    /// Rebuild a keypair from the canonical secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
        Ok(Self::from_secret(secret.ok_or(CryptoError::InvalidScalar)?))
    }

    fn from_secret(secret: Scalar) -> Self {
        let public = RISTRETTO_BASEPOINT_POINT * secret;
        Self { secret, public }
    }

    pub fn public(&self) -> PublicKey {
        PublicKey::from_point(&self.public)
    }

    /// Canonical secret bytes (for the persisted skipchain auth keypair).
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub(crate) fn secret(&self) -> &Scalar {
        &self.secret
    }
}

impl Clone for SchnorrKeyPair {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
            public: self.public,
        }
    }
}

impl Drop for SchnorrKeyPair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for SchnorrKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchnorrKeyPair({:?})", self.public())
    }
}
