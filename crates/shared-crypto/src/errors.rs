//! Error types for the crypto suite.

use thiserror::Error;

/// Errors surfaced by hashing, key handling and signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Bytes do not decode to a valid group element.
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    /// Scalar bytes are not in canonical form.
    #[error("invalid scalar encoding")]
    InvalidScalar,

    /// Signature malformed or does not verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Ring signature does not match any ring layout.
    #[error("ring signature mismatch: {0}")]
    RingMismatch(String),
}
