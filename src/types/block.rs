/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the consensus-relevant parts of blocks: the [`Header`] and the [`Block`] that
//! carries it.
//!
//! The full block format (transactions, receipts, state roots) belongs to the
//! [`Blockchain`](crate::blockchain::Blockchain) implementation. IBFT-rs only needs the fields that
//! link a block into the canonical chain, identify its proposer, and carry validator votes.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::ibft::types::CommitSeal;

use super::{
    crypto_primitives::{CryptoHasher, Digest},
    data_types::{Address, CryptoHash},
};

/// A vote, embedded in a header by its proposer, to add `candidate` to the validator set
/// (`authorize == true`) or to remove it (`authorize == false`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ValidatorVote {
    pub candidate: Address,
    pub authorize: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Header {
    pub parent_hash: CryptoHash,
    pub number: u64,
    pub timestamp: u64,
    pub proposer: Address,
    pub vote: Option<ValidatorVote>,
    pub data_hash: CryptoHash,
    pub hash: CryptoHash,
}

impl Header {
    /// Create a new `Header`, computing its `hash`.
    pub fn new(
        parent_hash: CryptoHash,
        number: u64,
        timestamp: u64,
        proposer: Address,
        vote: Option<ValidatorVote>,
        data_hash: CryptoHash,
    ) -> Header {
        let mut header = Header {
            parent_hash,
            number,
            timestamp,
            proposer,
            vote,
            data_hash,
            hash: CryptoHash::zero(),
        };
        header.hash = header.compute_hash();
        header
    }

    /// Compute the SHA256 hash over every field of the header except `hash` itself.
    pub fn compute_hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        // Safety: serializing into a Vec cannot fail.
        hasher.update(self.parent_hash.try_to_vec().unwrap());
        hasher.update(self.number.try_to_vec().unwrap());
        hasher.update(self.timestamp.try_to_vec().unwrap());
        hasher.update(self.proposer.try_to_vec().unwrap());
        hasher.update(self.vote.try_to_vec().unwrap());
        hasher.update(self.data_hash.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Check whether `hash` matches the rest of the header.
    pub fn is_hash_correct(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// A header, the opaque data it commits to, and (once finalized) the commit seal that proves a quorum
/// of validators agreed on it.
///
/// The seal is not covered by the header's hash: validators sign the hash of the unsealed block.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Block {
    pub header: Header,
    pub data: Vec<Vec<u8>>,
    pub seal: Option<CommitSeal>,
}

impl Block {
    /// Create an unsealed `Block`.
    pub fn new(header: Header, data: Vec<Vec<u8>>) -> Block {
        Block {
            header,
            data,
            seal: None,
        }
    }

    /// Compute the hash that a header carrying `data` must have as its `data_hash`.
    pub fn data_hash(data: &[Vec<u8>]) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        for datum in data {
            // Safety: serializing into a Vec cannot fail.
            hasher.update(datum.try_to_vec().unwrap());
        }
        CryptoHash::new(hasher.finalize().into())
    }

    /// Get the hash of this block, which is the hash of its header.
    pub fn hash(&self) -> CryptoHash {
        self.header.hash
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Check that the header hash and the data hash are both consistent with the block's contents.
    pub fn is_correct(&self) -> bool {
        self.header.is_hash_correct() && self.header.data_hash == Block::data_hash(&self.data)
    }

    /// Return a copy of this block carrying `seal`.
    pub fn with_seal(&self, seal: CommitSeal) -> Block {
        Block {
            header: self.header.clone(),
            data: self.data.clone(),
            seal: Some(seal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_covers_the_vote() {
        let proposer = Address::new([1; 20]);
        let without_vote = Header::new(CryptoHash::zero(), 1, 10, proposer, None, CryptoHash::zero());
        let with_vote = Header::new(
            CryptoHash::zero(),
            1,
            10,
            proposer,
            Some(ValidatorVote {
                candidate: Address::new([2; 20]),
                authorize: true,
            }),
            CryptoHash::zero(),
        );

        assert!(without_vote.is_hash_correct());
        assert!(with_vote.is_hash_correct());
        assert_ne!(without_vote.hash, with_vote.hash);

        let mut tampered = with_vote.clone();
        tampered.vote = None;
        assert!(!tampered.is_hash_correct());
    }

    #[test]
    fn data_hash_is_checked() {
        let data = vec![b"tx".to_vec()];
        let header = Header::new(
            CryptoHash::zero(),
            1,
            10,
            Address::new([1; 20]),
            None,
            Block::data_hash(&data),
        );
        let block = Block::new(header, data);
        assert!(block.is_correct());

        let mut tampered = block.clone();
        tampered.data.push(b"extra".to_vec());
        assert!(!tampered.is_correct());
    }
}
