/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the IBFT protocol: aggregated votes, and the states of the consensus state
//! machine.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    crypto_primitives::verify_signature,
    data_types::{ChainID, CryptoHash, SignatureBytes, VerifyingKeyBytes, View},
    validator_set::ValidatorSet,
};

use super::{
    messages::{signing_bytes, MessageType},
    roles::proposer_at,
};

/// A signature lifted out of a protocol message, to be aggregated into a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignedVote {
    pub signer: VerifyingKeyBytes,
    pub signature: SignatureBytes,
}

/// Evidence that a quorum of validators prepared the block with hash `digest` in `view`.
///
/// Each vote is either the proposer's `Preprepare` signature, which counts as its prepare, or a
/// `Prepare` signature.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct PreparedCertificate {
    pub view: View,
    pub digest: CryptoHash,
    pub votes: Vec<(MessageType, SignedVote)>,
}

impl PreparedCertificate {
    /// Check whether this certificate carries valid signatures from a quorum of distinct members of
    /// `validator_set`.
    pub fn is_correct(&self, chain_id: ChainID, validator_set: &ValidatorSet) -> bool {
        let Ok(proposer) = proposer_at(self.view, validator_set) else {
            return false;
        };

        let mut signers = BTreeSet::new();
        for (msg_type, vote) in &self.votes {
            let message = match msg_type {
                MessageType::Preprepare | MessageType::Prepare => {
                    signing_bytes(chain_id, *msg_type, self.view, self.digest)
                }
                _ => return false,
            };
            match verify_signature(&vote.signer, &message, &vote.signature) {
                Some(signer) if validator_set.contains(&signer) => {
                    if *msg_type == MessageType::Preprepare && signer != proposer {
                        return false;
                    }
                    signers.insert(signer);
                }
                _ => return false,
            }
        }

        signers.len() >= validator_set.quorum_size()
    }
}

/// A block together with the certificate proving that a quorum prepared it. This is what a validator
/// locks on, and what it carries in its round change messages.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct PreparedProposal {
    pub block: Block,
    pub certificate: PreparedCertificate,
}

impl PreparedProposal {
    /// Get the round in which the block was prepared.
    pub fn round(&self) -> u64 {
        self.certificate.view.round
    }

    /// Check that `block` is well formed, that it is the block the certificate is about, and that the
    /// certificate was formed for block number `sequence` by `validator_set`.
    pub fn is_correct(
        &self,
        chain_id: ChainID,
        sequence: u64,
        validator_set: &ValidatorSet,
    ) -> bool {
        self.block.is_correct()
            && self.block.number() == sequence
            && self.certificate.view.sequence == sequence
            && self.certificate.digest == self.block.hash()
            && self.certificate.is_correct(chain_id, validator_set)
    }
}

/// The `Commit` signatures of a quorum of validators, attached to a finalized block.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct CommitSeal {
    pub view: View,
    pub signatures: Vec<SignedVote>,
}

impl CommitSeal {
    /// Check whether this seal carries valid `Commit` signatures over `digest` from a quorum of distinct
    /// members of `validator_set`.
    pub fn is_correct(
        &self,
        chain_id: ChainID,
        digest: CryptoHash,
        validator_set: &ValidatorSet,
    ) -> bool {
        let message = signing_bytes(chain_id, MessageType::Commit, self.view, digest);
        let mut signers = BTreeSet::new();
        for vote in &self.signatures {
            match verify_signature(&vote.signer, &message, &vote.signature) {
                Some(signer) if validator_set.contains(&signer) => {
                    signers.insert(signer);
                }
                _ => return false,
            }
        }
        signers.len() >= validator_set.quorum_size()
    }
}

/// States of the consensus state machine.
///
/// See the [module-level documentation](super) for the transitions between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IbftState {
    AcceptBlock,
    Validate,
    RoundChange,
    Commit,
    Sync,
}
