/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged by validators in the IBFT protocol, and how they are signed and authenticated.
//!
//! # Signed bytes
//!
//! Every message signs the Borsh serialization of the tuple `(chain_id, message_type, view, digest)`,
//! where `digest` is:
//! - For `Preprepare`: the hash of the proposed block.
//! - For `Prepare` and `Commit`: the hash of the block being voted for.
//! - For `RoundChange`: the hash of the prepared block it carries, or [`CryptoHash::zero`] if none.
//!
//! Signing only the digest means that a `Preprepare` or `Prepare` signature can be lifted out of its
//! message and reused as a vote inside a [`PreparedCertificate`], and a `Commit` signature can be
//! reused inside a [`CommitSeal`](super::types::CommitSeal).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    crypto_primitives::Keypair,
    data_types::{Address, ChainID, CryptoHash, SignatureBytes, VerifyingKeyBytes, View},
    signed_messages::SignedMessage,
    validator_set::ValidatorSet,
};

use super::types::{PreparedCertificate, PreparedProposal, SignedVote};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub enum MessageType {
    Preprepare,
    Prepare,
    Commit,
    RoundChange,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum Payload {
    /// A proposed block. `justification` is present when the proposer re-proposes a block that was
    /// prepared in an earlier round of the same sequence.
    Preprepare {
        proposal: Block,
        justification: Option<PreparedCertificate>,
    },
    Prepare {
        digest: CryptoHash,
    },
    Commit {
        digest: CryptoHash,
    },
    /// A request to move to `view.round`, carrying the sender's locked proposal, if any.
    RoundChange { prepared: Option<PreparedProposal> },
}

/// A signed protocol message.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct IbftMessage {
    pub chain_id: ChainID,
    pub view: View,
    pub payload: Payload,
    pub sender: Address,
    pub signer: VerifyingKeyBytes,
    pub signature: SignatureBytes,
}

impl IbftMessage {
    /// Create a message from `keypair` about `payload` in `view`, and sign it.
    pub(crate) fn new(keypair: &Keypair, chain_id: ChainID, view: View, payload: Payload) -> Self {
        let msg_type = message_type(&payload);
        let digest = digest(&payload);
        let signature = keypair.sign(&signing_bytes(chain_id, msg_type, view, digest));
        IbftMessage {
            chain_id,
            view,
            payload,
            sender: keypair.address(),
            signer: keypair.public().to_bytes(),
            signature,
        }
    }

    pub fn msg_type(&self) -> MessageType {
        message_type(&self.payload)
    }

    /// Get the digest that this message's signature covers.
    pub fn digest(&self) -> CryptoHash {
        digest(&self.payload)
    }

    /// Get the signature of this message as a vote that can be aggregated into a certificate.
    pub fn vote(&self) -> SignedVote {
        SignedVote {
            signer: self.signer,
            signature: self.signature,
        }
    }

    /// Check that `signature` is a valid signature by `signer`, and that `sender` is the address of
    /// `signer`.
    ///
    /// This check is pure, and so can be run on any thread.
    pub fn is_correctly_signed(&self) -> Result<(), ProtocolError> {
        match self.recover_signer() {
            Some(address) if address == self.sender => Ok(()),
            _ => Err(ProtocolError::BadSignature),
        }
    }

    /// Check that this message was sent on the chain identified by `chain_id`.
    pub fn check_chain(&self, chain_id: ChainID) -> Result<(), ProtocolError> {
        if self.chain_id != chain_id {
            return Err(ProtocolError::WrongChain);
        }
        Ok(())
    }

    /// Check that the sender of this message is a member of `validator_set`.
    ///
    /// Unlike [`is_correctly_signed`](Self::is_correctly_signed), this depends on the validator set of
    /// the message's sequence, and so is run by the control thread.
    pub fn check_sender(&self, validator_set: &ValidatorSet) -> Result<(), ProtocolError> {
        if !validator_set.contains(&self.sender) {
            return Err(ProtocolError::UnknownSender);
        }
        Ok(())
    }

    /// Check that this message is correctly signed by a member of `validator_set`.
    pub fn verify(&self, validator_set: &ValidatorSet) -> Result<(), ProtocolError> {
        self.is_correctly_signed()?;
        self.check_sender(validator_set)
    }

    /// Get the number of bytes that this message takes when serialized.
    pub fn size(&self) -> u64 {
        // Safety: serializing into a Vec cannot fail.
        self.try_to_vec().unwrap().len() as u64
    }
}

impl SignedMessage for IbftMessage {
    fn message_bytes(&self) -> Vec<u8> {
        signing_bytes(self.chain_id, self.msg_type(), self.view, self.digest())
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }

    fn signer(&self) -> VerifyingKeyBytes {
        self.signer
    }
}

/// Get the bytes that a message or vote of `msg_type` about `digest` in `view` signs.
pub(crate) fn signing_bytes(
    chain_id: ChainID,
    msg_type: MessageType,
    view: View,
    digest: CryptoHash,
) -> Vec<u8> {
    // Safety: serializing into a Vec cannot fail.
    (chain_id, msg_type, view, digest).try_to_vec().unwrap()
}

fn message_type(payload: &Payload) -> MessageType {
    match payload {
        Payload::Preprepare { .. } => MessageType::Preprepare,
        Payload::Prepare { .. } => MessageType::Prepare,
        Payload::Commit { .. } => MessageType::Commit,
        Payload::RoundChange { .. } => MessageType::RoundChange,
    }
}

fn digest(payload: &Payload) -> CryptoHash {
    match payload {
        Payload::Preprepare { proposal, .. } => proposal.hash(),
        Payload::Prepare { digest } | Payload::Commit { digest } => *digest,
        Payload::RoundChange { prepared } => prepared
            .as_ref()
            .map(|prepared| prepared.block.hash())
            .unwrap_or(CryptoHash::zero()),
    }
}

/// Malformed, unsigned or unauthorized messages. Messages that fail with a `ProtocolError` are
/// dropped.
#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    BadSignature,
    UnknownSender,
    WrongChain,
}
