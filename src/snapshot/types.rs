/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Snapshot`] type and the rules for deriving one snapshot from the next header.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Header,
    data_types::{Address, CryptoHash, EpochSize},
    validator_set::ValidatorSet,
};

/// The validator set effective after the block `number` (with hash `hash`), together with the validator
/// votes accumulated so far in the current epoch.
///
/// # Vote tally
///
/// `votes` maps each candidate address to the ballots cast about it, keyed by voter. Keying by voter
/// means that a later vote from the same voter about the same candidate overwrites the earlier one
/// instead of being counted twice.
///
/// # Immutability
///
/// A `Snapshot` is never mutated once it has been handed out. [`apply_header`](Self::apply_header)
/// returns a new value.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Snapshot {
    pub number: u64,
    pub hash: CryptoHash,
    pub validators: ValidatorSet,
    pub votes: BTreeMap<Address, BTreeMap<Address, bool>>,
}

impl Snapshot {
    /// Create the snapshot of a genesis block.
    pub fn genesis(genesis: &Header, validators: ValidatorSet) -> Snapshot {
        Snapshot {
            number: genesis.number,
            hash: genesis.hash,
            validators,
            votes: BTreeMap::new(),
        }
    }

    /// Derive the snapshot that follows from applying `header` on top of this snapshot.
    ///
    /// # Rules
    ///
    /// 1. `header.number` must be exactly `self.number + 1`.
    /// 2. The header's vote is counted only if its proposer is a current validator, and only if the
    ///    vote would change the validator set (authorizing an existing validator, or deauthorizing an
    ///    address that is not a validator, is ignored).
    /// 3. If `header` closes an epoch, every candidate whose matching votes come from more than half
    ///    of the current validators is added or removed, and the tally is cleared. The last validator
    ///    is never removed.
    pub fn apply_header(
        &self,
        header: &Header,
        epoch_size: EpochSize,
    ) -> Result<Snapshot, SnapshotError> {
        if header.number != self.number + 1 {
            return Err(SnapshotError::NonContiguousHeader {
                expected: self.number + 1,
                got: header.number,
            });
        }

        let mut next = self.clone();
        next.number = header.number;
        next.hash = header.hash;

        // 1. Record the vote carried in the header.
        if let Some(vote) = header.vote {
            let from_validator = self.validators.contains(&header.proposer);
            let is_noop = vote.authorize == self.validators.contains(&vote.candidate);
            if from_validator && !is_noop {
                next.votes
                    .entry(vote.candidate)
                    .or_default()
                    .insert(header.proposer, vote.authorize);
            }
        }

        // 2. At an epoch boundary, tally the votes and start a fresh epoch.
        if epoch_size.is_boundary(header.number) {
            let validator_count = self.validators.len();
            for (candidate, ballots) in &next.votes {
                let authorize = !self.validators.contains(candidate);
                let in_favour = ballots
                    .values()
                    .filter(|ballot| **ballot == authorize)
                    .count();
                if in_favour * 2 <= validator_count {
                    continue;
                }

                if authorize {
                    next.validators.add(*candidate);
                } else if next.validators.len() > 1 {
                    next.validators.remove(candidate);
                }
            }
            next.votes.clear();
        }

        Ok(next)
    }

    /// Count the ballots about `candidate` in the current epoch that match `authorize`.
    pub fn tally(&self, candidate: &Address, authorize: bool) -> usize {
        self.votes
            .get(candidate)
            .map(|ballots| ballots.values().filter(|ballot| **ballot == authorize).count())
            .unwrap_or(0)
    }
}

/// The ways in which [`Snapshot::apply_header`] can fail.
#[derive(Debug)]
pub enum SnapshotError {
    NonContiguousHeader { expected: u64, got: u64 },
}
