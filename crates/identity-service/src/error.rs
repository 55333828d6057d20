//! Error types of the identity service.
//!
//! Every facade entry point maps its failure to exactly one
//! `IdentityError`, which carries the wire-stable code of
//! `shared_types::ErrorCode`. Propagation handlers never surface errors
//! to peers; they log and return.

use shared_types::ErrorCode;
use thiserror::Error;

/// Client-visible service errors, one variant per failure kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// PIN bootstrap failed.
    #[error("wrong PIN: {0}")]
    WrongPin(String),

    /// Nonce unknown, credential rejected, or creation quota exhausted.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// StoreKeys payload signature did not match any admin key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Identity or skipblock not found.
    #[error("block missing: {0}")]
    BlockMissing(String),

    /// No proposed data, or a block payload failed to decode.
    #[error("data missing: {0}")]
    DataMissing(String),

    /// Vote signer is not a device of the identity.
    #[error("account missing: {0}")]
    AccountMissing(String),

    /// Vote signature did not verify.
    #[error("vote signature: {0}")]
    VoteSignature(String),

    /// Remote fetch or propagation failed.
    #[error("transport: {0}")]
    Transport(String),
}

impl IdentityError {
    /// The wire-stable code clients dispatch on.
    pub fn code(&self) -> ErrorCode {
        match self {
            IdentityError::WrongPin(_) => ErrorCode::WrongPin,
            IdentityError::Authentication(_) => ErrorCode::Authentication,
            IdentityError::InvalidSignature(_) => ErrorCode::InvalidSignature,
            IdentityError::BlockMissing(_) => ErrorCode::BlockMissing,
            IdentityError::DataMissing(_) => ErrorCode::DataMissing,
            IdentityError::AccountMissing(_) => ErrorCode::AccountMissing,
            IdentityError::VoteSignature(_) => ErrorCode::VoteSignature,
            IdentityError::Transport(_) => ErrorCode::Transport,
        }
    }
}

/// Result type for facade operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors of the skipchain outbound port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipchainError {
    #[error("block not found: {0}")]
    NotFound(String),

    #[error("block refused by verifier: {0}")]
    VerificationFailed(String),

    #[error("store refused: {0}")]
    Refused(String),

    #[error("encoding: {0}")]
    Encoding(String),
}

/// Errors of the propagation outbound port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropagationError {
    #[error("no reachable node in roster")]
    NoReachableNode,

    #[error("propagation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors of the key/value checkpoint port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("io: {0}")]
    Io(String),

    #[error("encoding: {0}")]
    Encoding(String),
}

impl From<SkipchainError> for IdentityError {
    fn from(err: SkipchainError) -> Self {
        IdentityError::Transport(err.to_string())
    }
}

impl From<PropagationError> for IdentityError {
    fn from(err: PropagationError) -> Self {
        IdentityError::Transport(err.to_string())
    }
}
