//! Wire-stable error codes of the client protocol.
//!
//! Clients match on the integer code, so the values here are frozen:
//! renumbering is a protocol break.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned to clients, one per failure kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// PIN bootstrap failed (missing or mismatched PIN).
    WrongPin = 4100,
    /// Nonce unknown, credential rejected or creation quota exhausted.
    Authentication = 4101,
    /// Signature on a StoreKeys payload did not verify.
    InvalidSignature = 4102,
    /// Identity or skipblock not found.
    BlockMissing = 4103,
    /// No proposed data, or a block payload failed to decode.
    DataMissing = 4104,
    /// Vote signer is not a device of the identity.
    AccountMissing = 4105,
    /// Vote signature did not verify.
    VoteSignature = 4106,
    /// Remote fetch or propagation failed.
    Transport = 4107,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
