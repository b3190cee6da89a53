//! Retry-limited secret verification.
//!
//! A [`GuardedSecret`] owns a fixed-width reference value, a bounded
//! attempt counter, and a per-session validated flag. The PIN and the PUK
//! are the two instances; the vault watches their counters to drive the
//! locked and terminal states.

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret with a bounded attempt budget and constant-time comparison.
///
/// `N` is the reference width; shorter values are zero-padded so every
/// comparison covers the full width regardless of the supplied length.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct GuardedSecret<const N: usize> {
    reference: [u8; N],
    #[zeroize(skip)]
    max_attempts: u8,
    #[zeroize(skip)]
    remaining: u8,
    #[zeroize(skip)]
    validated: bool,
}

impl<const N: usize> GuardedSecret<N> {
    /// Fresh secret with an all-zero reference and a full attempt budget.
    pub const fn new(max_attempts: u8) -> Self {
        Self {
            reference: [0u8; N],
            max_attempts,
            remaining: max_attempts,
            validated: false,
        }
    }

    /// Overwrite the reference value, zero-padded to the fixed width.
    ///
    /// Restores the attempt budget and clears the validated flag. Values
    /// longer than the width are truncated; callers enforce length bounds
    /// before handing the value over.
    pub fn update(&mut self, value: &[u8]) {
        self.reference.zeroize();
        let len = value.len().min(N);
        self.reference[..len].copy_from_slice(&value[..len]);
        self.remaining = self.max_attempts;
        self.validated = false;
    }

    /// Compare a candidate against the reference in constant time.
    ///
    /// An exhausted secret always fails without another decrement. A
    /// mismatch burns one attempt and clears the validated flag; a match
    /// sets it and restores the budget.
    pub fn check(&mut self, candidate: &[u8]) -> bool {
        if self.remaining == 0 {
            self.validated = false;
            return false;
        }
        if candidate.len() > N {
            self.register_failure();
            return false;
        }

        let mut padded = [0u8; N];
        padded[..candidate.len()].copy_from_slice(candidate);
        let matched = bool::from(self.reference.as_slice().ct_eq(padded.as_slice()));
        padded.zeroize();

        if matched {
            self.validated = true;
            self.remaining = self.max_attempts;
        } else {
            self.register_failure();
        }
        matched
    }

    /// Session boundary: forget the validation, keep the attempt counter.
    pub fn reset_session(&mut self) {
        self.validated = false;
    }

    /// Whether the most recent check in this session succeeded.
    pub const fn is_validated(&self) -> bool {
        self.validated
    }

    /// Attempts left before the secret is exhausted.
    pub const fn remaining_attempts(&self) -> u8 {
        self.remaining
    }

    /// Whether the attempt budget has run out.
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    fn register_failure(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.validated = false;
    }
}
