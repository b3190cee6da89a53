//! Command-processing core of the keycard credential vault.
//!
//! The vault authenticates an operator through a retry-limited PIN, offers
//! recovery through a retry-limited PUK, and gates an encrypted master
//! secret plus two general-purpose data blobs behind that authentication.
//! This crate owns the command dispatch state machine and the encrypted
//! transport decoding; persistent storage stays behind the [`FileStore`]
//! boundary and randomness is injected by the caller.
//!
//! The crate is `no_std + alloc` so the same core runs on constrained
//! targets; the default `std` feature is what the host tooling and the
//! test suites build against.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod apdu;
pub mod codec;
pub mod error;
pub mod files;
pub mod secret;
pub mod state;
pub mod vault;

pub use apdu::{CLA_KEYCARD, CommandApdu, Instruction, Response, StatusWord};
pub use codec::TransportCipher;
pub use error::VaultError;
pub use files::{FileId, FileStore, FileStoreError, MemoryFileStore};
pub use secret::GuardedSecret;
pub use state::VaultState;
pub use vault::{
    MASTER_ABSENT, MASTER_PRESENT, MAX_ATTEMPTS, PIN_LENGTH, PIN_MIN_LENGTH, PUK_LENGTH, Vault,
};
