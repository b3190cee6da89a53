//! Command failure kinds and their projection onto wire status words.

use crate::apdu::StatusWord;
use crate::files::FileStoreError;

/// Failures a command can answer with.
///
/// Every rejected command reports exactly one of these; the validation
/// order (length, parameters, state, auth, decode, effect) guarantees a
/// rejection leaves no persistent change — except the attempt-counter
/// decrement carried by a failed secret check, which is a deliberate,
/// observable side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("payload length outside the command's expectation")]
    BadLength,
    #[error("addressing parameters outside the command's fixed set")]
    BadParameters,
    #[error("command not allowed in the current vault state")]
    NotAllowed,
    #[error("command requires a validated PIN")]
    AuthRequired,
    #[error("secret check failed, {remaining} attempts remaining")]
    AuthFailed { remaining: u8 },
    #[error("vault is terminally locked")]
    Locked,
    #[error(transparent)]
    Storage(#[from] FileStoreError),
}

impl VaultError {
    /// Status word reported for this failure.
    pub const fn status(self) -> StatusWord {
        match self {
            VaultError::BadLength => StatusWord::WrongLength,
            VaultError::BadParameters => StatusWord::BadParameters,
            VaultError::NotAllowed => StatusWord::NotAllowed,
            VaultError::AuthRequired => StatusWord::AuthRequired,
            VaultError::AuthFailed { remaining } => StatusWord::AuthFailed(remaining),
            VaultError::Locked => StatusWord::Locked,
            VaultError::Storage(FileStoreError::Missing(_)) => StatusWord::FileNotFound,
            VaultError::Storage(FileStoreError::OutOfBounds { .. }) => StatusWord::WrongData,
            VaultError::Storage(FileStoreError::Exhausted) => StatusWord::StorageExhausted,
        }
    }
}
