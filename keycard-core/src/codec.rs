//! Encrypted-transport codec.
//!
//! Confidential payloads travel as whole 16-byte blocks under AES-256 in
//! electronic-codebook mode with no block padding; the key is the SHA-256
//! digest of the operator-chosen PIN, fixed at provisioning time. Two
//! padding conventions share the cipher and must never leak into the
//! dispatcher:
//!
//! - sentinel-trimmed blocks: the payload sits right-aligned behind 0xFF
//!   filler and is recovered by scanning for the first non-filler byte;
//! - length-prefixed envelopes: a 48-byte block whose first byte is the
//!   payload length, the payload right-aligned, used only by the master
//!   secret commands (both directions).
//!
//! Decryption itself cannot fail; a wrong key surfaces as an anomalous
//! recovered length that downstream checks reject.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use alloc::vec::Vec;
use core::fmt;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Width of one transport cipher block.
pub const BLOCK_SIZE: usize = 16;

/// Width of the length-prefixed master-secret envelope.
pub const ENVELOPE_SIZE: usize = 48;

/// Greatest payload an envelope can carry; byte 0 holds the length.
pub const ENVELOPE_PAYLOAD_MAX: usize = ENVELOPE_SIZE - 1;

/// Filler byte preceding right-aligned payloads in sentinel-padded blocks.
pub const PAD_SENTINEL: u8 = 0xFF;

/// Errors produced by the codec helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Input is not a whole number of cipher blocks.
    RaggedLength(usize),
    /// Envelope length byte exceeds the payload capacity.
    EnvelopeLength(u8),
    /// Payload does not fit the fixed-size block.
    PayloadTooLarge(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::RaggedLength(len) => {
                write!(f, "{len} bytes is not a whole number of {BLOCK_SIZE}-byte blocks")
            }
            CodecError::EnvelopeLength(len) => {
                write!(f, "envelope declares {len} payload bytes, capacity is {ENVELOPE_PAYLOAD_MAX}")
            }
            CodecError::PayloadTooLarge(len) => {
                write!(f, "payload of {len} bytes exceeds the block capacity")
            }
        }
    }
}

/// AES-256 transport cipher bound to the key derived at provisioning.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TransportCipher {
    key: [u8; 32],
}

impl TransportCipher {
    /// Derive the transport key from the operator-chosen PIN (pre-padding).
    pub fn from_pin(pin: &[u8]) -> Self {
        let digest = Sha256::digest(pin);
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    fn block_cipher(&self) -> Aes256 {
        Aes256::new_from_slice(&self.key).expect("32-byte AES-256 key")
    }

    /// Encrypt whole blocks. The input length must be a block multiple.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        if plaintext.len() % BLOCK_SIZE != 0 {
            return Err(CodecError::RaggedLength(plaintext.len()));
        }
        let cipher = self.block_cipher();
        let mut output = plaintext.to_vec();
        for block in output.chunks_exact_mut(BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(output)
    }

    /// Decrypt whole blocks. The input length must be a block multiple.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CodecError::RaggedLength(ciphertext.len()));
        }
        let cipher = self.block_cipher();
        let mut output = ciphertext.to_vec();
        for block in output.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(output)
    }
}

/// Strip leading sentinel filler from a decrypted block.
///
/// An all-sentinel block decodes to an empty payload.
pub fn trim_sentinel(block: &[u8]) -> &[u8] {
    match block.iter().position(|byte| *byte != PAD_SENTINEL) {
        Some(start) => &block[start..],
        None => &[],
    }
}

/// Right-align a payload in one cipher block behind sentinel filler.
pub fn pad_sentinel(payload: &[u8]) -> Result<[u8; BLOCK_SIZE], CodecError> {
    if payload.len() > BLOCK_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    let mut block = [PAD_SENTINEL; BLOCK_SIZE];
    block[BLOCK_SIZE - payload.len()..].copy_from_slice(payload);
    Ok(block)
}

/// Decode a length-prefixed envelope: byte 0 declares the payload length,
/// the payload occupies the trailing bytes.
pub fn open_envelope(block: &[u8]) -> Result<&[u8], CodecError> {
    if block.len() != ENVELOPE_SIZE {
        return Err(CodecError::RaggedLength(block.len()));
    }
    let length = block[0] as usize;
    if length > ENVELOPE_PAYLOAD_MAX {
        return Err(CodecError::EnvelopeLength(block[0]));
    }
    Ok(&block[ENVELOPE_SIZE - length..])
}

/// Build a length-prefixed envelope around a payload.
pub fn seal_envelope(payload: &[u8]) -> Result<[u8; ENVELOPE_SIZE], CodecError> {
    if payload.len() > ENVELOPE_PAYLOAD_MAX {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    let mut block = [0u8; ENVELOPE_SIZE];
    block[0] = payload.len() as u8;
    block[ENVELOPE_SIZE - payload.len()..].copy_from_slice(payload);
    Ok(block)
}
