/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definitions for the pluggable blockchain that IBFT-rs drives.
//!
//! IBFT-rs decides which block comes next at every height, but it does not execute transactions, store
//! bodies and receipts, or fetch missing blocks from peers. These are the jobs of the library user's
//! [`Blockchain`] implementation, which IBFT-rs calls from its algorithm thread.
//!
//! # Timing
//!
//! Every method is called from the single control path of the replica, and the round timer cannot fire
//! while a method is running. Implementations should therefore return well within the configured
//! [base round timeout](crate::replica::Configuration::base_round_timeout). Slow work (for example,
//! downloading blocks in [`request_sync`](Blockchain::request_sync)) should be handed off to another
//! thread.

use crate::types::{
    block::{Block, Header, ValidatorVote},
    data_types::Address,
};

/// Methods that a type needs to implement to serve as the canonical chain that a replica's consensus
/// engine extends.
///
/// Besides implementing the methods specified in the trait, implementors are expected to treat
/// [`write_block`](Self::write_block) as the only path through which finalized blocks produced by
/// consensus enter the canonical chain.
pub trait Blockchain: Send + 'static {
    /// Get the header at the head of the canonical chain.
    fn head(&self) -> Header;

    /// Get the canonical block with the given number, if the chain is at least that long.
    fn block_by_number(&self, number: u64) -> Result<Option<Block>, BlockchainError>;

    /// Build a candidate block that extends `request.parent()`.
    ///
    /// The header of the returned block must have `number == parent.number + 1`,
    /// `parent_hash == parent.hash`, `proposer == request.proposer()` and `vote == request.vote()`.
    fn build_block(&mut self, request: BuildBlockRequest) -> Result<Block, BlockchainError>;

    /// Check a proposed `header` against the chain rules, given its `parent`.
    fn validate_header(&self, header: &Header, parent: &Header) -> Result<(), BlockchainError>;

    /// Write a finalized, sealed block to the canonical chain and make it the new head.
    ///
    /// This must be atomic: either the block and the head update both land, or neither does.
    fn write_block(&mut self, block: Block) -> Result<(), BlockchainError>;

    /// Ask the blockchain to catch up with the network up to (at least) block `target`, by means outside
    /// of consensus (e.g., a block sync protocol).
    ///
    /// IBFT-rs does not participate in consensus while it waits for the head to reach `target`. The
    /// default implementation does nothing, in which case the replica retries consensus after a round
    /// timeout.
    fn request_sync(&mut self, target: u64) {
        let _ = target;
    }
}

/// Arguments for [`Blockchain::build_block`].
pub struct BuildBlockRequest {
    parent: Header,
    proposer: Address,
    vote: Option<ValidatorVote>,
}

impl BuildBlockRequest {
    pub(crate) fn new(parent: Header, proposer: Address, vote: Option<ValidatorVote>) -> Self {
        Self {
            parent,
            proposer,
            vote,
        }
    }

    /// Header of the block that the new block should extend.
    pub fn parent(&self) -> &Header {
        &self.parent
    }

    /// Address of the replica that will propose the block.
    pub fn proposer(&self) -> Address {
        self.proposer
    }

    /// The validator vote that the block's header should carry.
    pub fn vote(&self) -> Option<ValidatorVote> {
        self.vote
    }
}

/// The ways in which a [`Blockchain`] can fail or reject a block.
#[derive(Debug)]
pub enum BlockchainError {
    /// The header or block breaks a chain rule.
    InvalidBlock(String),

    /// The underlying storage failed.
    Storage(String),

    /// A candidate block could not be produced.
    BuildFailed(String),
}
