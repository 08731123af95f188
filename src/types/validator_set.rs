/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types for storing and querying the set of validators allowed to vote at a given height.
//!
//! # Ordering
//!
//! A [`ValidatorSet`] is always kept sorted by address bytes and free of duplicates, no matter how it
//! was built. The position of a validator in this order drives round-robin proposer rotation (see
//! [`proposer_at`](crate::ibft::roles::proposer_at)), so every replica must agree on it, including
//! replicas that rebuilt the set from a persisted [`Snapshot`](crate::snapshot::types::Snapshot).
//!
//! # Quorum arithmetic
//!
//! For a validator set of size `N`:
//! - The quorum size is `Q = floor(2N/3) + 1`.
//! - The number of faulty validators the protocol tolerates is `F = floor((N-1)/3)`.
//!
//! These satisfy `Q + F <= N` (an honest quorum can always form) and `Q > N - Q` (two quorums always
//! intersect).

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::Address;

/// Ordered, duplicate-free set of validator addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ValidatorSet(Vec<Address>);

impl ValidatorSet {
    /// Create a `ValidatorSet` containing the `validators`, sorted and deduplicated.
    pub fn new(validators: impl IntoIterator<Item = Address>) -> Self {
        let mut validators: Vec<Address> = validators.into_iter().collect();
        validators.sort();
        validators.dedup();
        Self(validators)
    }

    /// Get the validators in this set, in rotation order.
    pub fn members(&self) -> &[Address] {
        &self.0
    }

    /// Iterate through the validators in this set, in rotation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Address> {
        self.0.iter()
    }

    /// Get the number of validators in this set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, validator: &Address) -> bool {
        self.0.binary_search(validator).is_ok()
    }

    /// Get the position of `validator` in the rotation order, if it is in this set.
    pub fn position(&self, validator: &Address) -> Option<usize> {
        self.0.binary_search(validator).ok()
    }

    /// Get the validator at position `index` in the rotation order.
    pub fn get(&self, index: usize) -> Option<&Address> {
        self.0.get(index)
    }

    /// Add `validator` to this set. Returns whether the set changed.
    pub fn add(&mut self, validator: Address) -> bool {
        match self.0.binary_search(&validator) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, validator);
                true
            }
        }
    }

    /// Remove `validator` from this set. Returns whether the set changed.
    pub fn remove(&mut self, validator: &Address) -> bool {
        match self.0.binary_search(validator) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Minimum number of distinct validators whose matching votes make a decision binding.
    pub fn quorum_size(&self) -> usize {
        (2 * self.0.len()) / 3 + 1
    }

    /// Maximum number of faulty validators this set tolerates.
    pub fn max_faulty(&self) -> usize {
        self.0.len().saturating_sub(1) / 3
    }
}

impl FromIterator<Address> for ValidatorSet {
    fn from_iter<T: IntoIterator<Item = Address>>(iter: T) -> Self {
        Self::new(iter)
    }
}
