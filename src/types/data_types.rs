/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{AddAssign, SubAssign},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a blockchain.
///
/// Every validator of the same chain must be configured with the same `ChainID`. The `ChainID` is
/// part of the bytes that every protocol message signs, so a signature made for one chain can never
/// be replayed on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// 32-byte cryptographic hash.
///
/// Within IBFT-rs, `CryptoHash`-es are SHA256 digests. Block hashes, data hashes and the digests that
/// protocol messages sign are all of this type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zeroes hash. Used as the digest of a round change that carries no prepared proposal,
    /// and as the parent hash of genesis headers.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// 20-byte identifier of a validator.
///
/// An `Address` is derived from a validator's Ed25519 verifying key by
/// [`address_of`](super::crypto_primitives::address_of). Addresses are compared by their bytes, and
/// this order is the order of a [`ValidatorSet`](super::validator_set::ValidatorSet).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Create a new `Address` wrapping `bytes`.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 20]` value of this `Address`.
    pub const fn bytes(&self) -> [u8; 20] {
        self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Bytes of an Ed25519 verifying key, as carried inside messages and certificates.
pub type VerifyingKeyBytes = [u8; 32];

/// Ed25519 digital signature.
///
/// These are produced using the [`ed25519_dalek`] crate, whose main definitions are re-exported from
/// the [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

/// Number of blocks between two validator set recomputations.
///
/// A block whose number is a multiple of the `EpochSize` is an "epoch boundary". The validator votes
/// carried in the headers of an epoch are tallied when its boundary block is finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct EpochSize(u64);

impl EpochSize {
    /// Create a new `EpochSize` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `EpochSize`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Check whether the block at `number` closes an epoch.
    pub fn is_boundary(&self, number: u64) -> bool {
        self.0 != 0 && number % self.0 == 0
    }
}

/// Size of a message buffer in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferSize(u64);

impl BufferSize {
    /// Create a new `BufferSize` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BufferSize`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl AddAssign<u64> for BufferSize {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs)
    }
}

impl SubAssign<u64> for BufferSize {
    fn sub_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_sub(rhs)
    }
}

/// One consensus attempt at one block height.
///
/// `sequence` is the number of the block under agreement. `round` is the retry counter within a
/// sequence, incremented whenever the current round fails to finalize.
///
/// Views are totally ordered: first by `sequence`, then by `round`. The derived `Ord` relies on the
/// field order below.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct View {
    pub sequence: u64,
    pub round: u64,
}

impl View {
    /// Create a new `View`.
    pub const fn new(sequence: u64, round: u64) -> Self {
        Self { sequence, round }
    }

    /// Get round 0 of the sequence after this view's.
    pub const fn next_sequence(&self) -> Self {
        Self::new(self.sequence + 1, 0)
    }

    /// Get the view with the same sequence and round `round`.
    pub const fn with_round(&self, round: u64) -> Self {
        Self::new(self.sequence, round)
    }
}

impl Display for View {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sequence, self.round)
    }
}
