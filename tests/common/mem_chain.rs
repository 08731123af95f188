/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A volatile, in-memory implementation of [`Blockchain`].
//!
//! Every node has its own [`MemChain`]. All nodes of a test also share a [`SharedLedger`], into which
//! each of them copies the blocks it finalizes. The ledger stands in for a block sync protocol: when a
//! replica asks to sync, its chain copies the missing blocks from the ledger.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use ibft_rs::{
    blockchain::{Blockchain, BlockchainError, BuildBlockRequest},
    types::{
        block::{Block, Header},
        data_types::{Address, CryptoHash},
    },
};

/// Create the genesis block that every node of a test starts from.
pub(crate) fn genesis() -> Block {
    Block::new(
        Header::new(
            CryptoHash::zero(),
            0,
            0,
            Address::new([0; 20]),
            None,
            Block::data_hash(&[]),
        ),
        Vec::new(),
    )
}

/// Finalized blocks by number, as written by any node.
#[derive(Clone)]
pub(crate) struct SharedLedger(Arc<Mutex<BTreeMap<u64, Block>>>);

impl SharedLedger {
    pub(crate) fn new() -> SharedLedger {
        SharedLedger(Arc::new(Mutex::new(BTreeMap::new())))
    }

    fn record(&self, block: &Block) {
        self.0
            .lock()
            .unwrap()
            .entry(block.number())
            .or_insert_with(|| block.clone());
    }

    fn get(&self, number: u64) -> Option<Block> {
        self.0.lock().unwrap().get(&number).cloned()
    }
}

/// A node's canonical chain. Clones share the same blocks, so a test can read a chain while a replica
/// extends it.
#[derive(Clone)]
pub(crate) struct MemChain {
    blocks: Arc<Mutex<Vec<Block>>>,
    ledger: SharedLedger,
}

impl MemChain {
    pub(crate) fn new(genesis: Block, ledger: SharedLedger) -> MemChain {
        MemChain {
            blocks: Arc::new(Mutex::new(vec![genesis])),
            ledger,
        }
    }

    pub(crate) fn head_number(&self) -> u64 {
        self.blocks.lock().unwrap().len() as u64 - 1
    }

    pub(crate) fn block(&self, number: u64) -> Option<Block> {
        self.blocks.lock().unwrap().get(number as usize).cloned()
    }

    fn append(&self, block: Block) -> Result<(), BlockchainError> {
        let mut blocks = self.blocks.lock().unwrap();
        let head = &blocks[blocks.len() - 1].header;
        if block.number() != head.number + 1 || block.header.parent_hash != head.hash {
            return Err(BlockchainError::InvalidBlock(format!(
                "block {} does not extend the head",
                block.number()
            )));
        }
        self.ledger.record(&block);
        blocks.push(block);
        Ok(())
    }
}

impl Blockchain for MemChain {
    fn head(&self) -> Header {
        let blocks = self.blocks.lock().unwrap();
        blocks[blocks.len() - 1].header.clone()
    }

    fn block_by_number(&self, number: u64) -> Result<Option<Block>, BlockchainError> {
        Ok(self.block(number))
    }

    fn build_block(&mut self, request: BuildBlockRequest) -> Result<Block, BlockchainError> {
        let parent = request.parent();
        let number = parent.number + 1;
        let data = vec![number.to_le_bytes().to_vec()];
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0)
            .max(parent.timestamp);
        let header = Header::new(
            parent.hash,
            number,
            timestamp,
            request.proposer(),
            request.vote(),
            Block::data_hash(&data),
        );
        Ok(Block::new(header, data))
    }

    fn validate_header(&self, header: &Header, parent: &Header) -> Result<(), BlockchainError> {
        if header.timestamp < parent.timestamp {
            return Err(BlockchainError::InvalidBlock(String::from(
                "timestamp is before the parent's",
            )));
        }
        Ok(())
    }

    fn write_block(&mut self, block: Block) -> Result<(), BlockchainError> {
        self.append(block)
    }

    fn request_sync(&mut self, target: u64) {
        let mut number = self.head_number() + 1;
        while number <= target {
            match self.ledger.get(number) {
                Some(block) => {
                    if self.append(block).is_err() {
                        return;
                    }
                }
                None => return,
            }
            number += 1;
        }
    }
}
