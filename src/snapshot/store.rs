/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`SnapshotStore`]: in-memory index of validator snapshots, backed by the user's [`KVStore`].
//!
//! # Snapshot-and-swap
//!
//! The store is read on every received message (to check membership and quorum size) but is only
//! written when a block is finalized. Readers clone an `Arc` to the current [`SnapshotIndex`] and then
//! read it without holding any lock, so they never wait on the writer for longer than a pointer copy.
//! The writer builds a complete new index and swaps the pointer. An index that has been handed out is
//! never mutated.
//!
//! # Persistence
//!
//! The genesis snapshot and every epoch-boundary snapshot are persisted. On startup,
//! [`load`](SnapshotStore::load) restores them and replays only the canonical headers after the last
//! persisted snapshot.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use borsh::BorshSerialize;

use crate::{
    blockchain::{Blockchain, BlockchainError},
    types::{
        block::Header,
        data_types::{Address, EpochSize},
        validator_set::ValidatorSet,
    },
};

use super::{
    pluggables::{KVGetError, KVStore, Key, WriteBatch},
    types::{Snapshot, SnapshotError},
    variables::{snapshot_key, snapshot_numbers_key},
};

/// Immutable view of every snapshot the store knows about.
pub struct SnapshotIndex {
    persisted: BTreeMap<u64, Arc<Snapshot>>,
    head: Arc<Snapshot>,
}

impl SnapshotIndex {
    /// Get the latest snapshot with `number <= number`.
    fn get(&self, number: u64) -> Option<Arc<Snapshot>> {
        if number >= self.head.number {
            return Some(self.head.clone());
        }
        self.persisted
            .range(..=number)
            .next_back()
            .map(|(_, snapshot)| snapshot.clone())
    }
}

/// Cheaply clonable handle to a replica's validator snapshots.
///
/// Clones share the same index. Only the algorithm thread calls
/// [`process_header`](Self::process_header); any number of other threads may read.
#[derive(Clone)]
pub struct SnapshotStore<K: KVStore> {
    kv_store: K,
    epoch_size: EpochSize,
    index: Arc<RwLock<Arc<SnapshotIndex>>>,
}

impl<K: KVStore> SnapshotStore<K> {
    /// Persist the genesis snapshot for a new chain.
    pub fn initialize(
        mut kv_store: K,
        genesis: &Header,
        validators: ValidatorSet,
    ) -> Result<(), SnapshotStoreError> {
        if validators.is_empty() {
            return Err(SnapshotStoreError::EmptyValidatorSet);
        }

        let snapshot = Snapshot::genesis(genesis, validators);
        let mut wb = K::WriteBatch::new();
        // Safety: serializing into a Vec cannot fail.
        wb.set(&snapshot_key(snapshot.number), &snapshot.try_to_vec().unwrap());
        wb.set(
            &snapshot_numbers_key(),
            &vec![snapshot.number].try_to_vec().unwrap(),
        );
        kv_store.write(wb);

        Ok(())
    }

    /// Restore the persisted snapshots from `kv_store`, then replay the canonical headers of
    /// `blockchain` from the last persisted snapshot up to its head.
    pub fn load<B: Blockchain>(
        kv_store: K,
        epoch_size: EpochSize,
        blockchain: &B,
    ) -> Result<SnapshotStore<K>, SnapshotStoreError> {
        // 1. Load every persisted snapshot.
        let mut persisted = BTreeMap::new();
        for number in kv_store.snapshot_numbers()? {
            let snapshot = kv_store
                .snapshot(number)?
                .ok_or(KVGetError::ValueExpectedButNotFound {
                    key: Key::Snapshot { number },
                })?;
            persisted.insert(number, Arc::new(snapshot));
        }

        let head = match persisted.values().next_back() {
            Some(head) => head.clone(),
            None => return Err(SnapshotStoreError::NotFound),
        };

        let mut store = SnapshotStore {
            kv_store,
            epoch_size,
            index: Arc::new(RwLock::new(Arc::new(SnapshotIndex { persisted, head }))),
        };

        // 2. Replay the headers that the persisted snapshots do not cover yet.
        let chain_head = blockchain.head().number;
        let mut number = store.head().number + 1;
        while number <= chain_head {
            let block = blockchain
                .block_by_number(number)?
                .ok_or(SnapshotStoreError::MissingBlock(number))?;
            store.process_header(&block.header)?;
            number += 1;
        }

        Ok(store)
    }

    /// Get the current index.
    pub fn index(&self) -> Arc<SnapshotIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Get the snapshot that covers block `number`: the latest snapshot with `snapshot.number <= number`.
    pub fn get_snapshot(&self, number: u64) -> Result<Arc<Snapshot>, SnapshotStoreError> {
        self.index().get(number).ok_or(SnapshotStoreError::NotFound)
    }

    /// Get the snapshot after the most recently processed header.
    pub fn head(&self) -> Arc<Snapshot> {
        self.index().head.clone()
    }

    /// Get the validators that may vote on the block with number `sequence`, that is, the validator set
    /// of the snapshot covering its parent.
    pub fn validators_for(&self, sequence: u64) -> Result<ValidatorSet, SnapshotStoreError> {
        Ok(self
            .get_snapshot(sequence.saturating_sub(1))?
            .validators
            .clone())
    }

    pub fn epoch_size(&self) -> EpochSize {
        self.epoch_size
    }

    /// Apply a newly finalized `header` and publish the resulting snapshot.
    ///
    /// Headers that the head snapshot already covers are ignored. At an epoch boundary, the new snapshot
    /// is persisted before it is published.
    pub(crate) fn process_header(
        &mut self,
        header: &Header,
    ) -> Result<Arc<Snapshot>, SnapshotStoreError> {
        let current = self.index();
        if header.number <= current.head.number {
            return Ok(current.head.clone());
        }

        let next = Arc::new(current.head.apply_header(header, self.epoch_size)?);

        let mut persisted = current.persisted.clone();
        if self.epoch_size.is_boundary(next.number) {
            persisted.insert(next.number, next.clone());

            let mut wb = K::WriteBatch::new();
            // Safety: serializing into a Vec cannot fail.
            wb.set(&snapshot_key(next.number), &next.try_to_vec().unwrap());
            wb.set(
                &snapshot_numbers_key(),
                &persisted
                    .keys()
                    .copied()
                    .collect::<Vec<u64>>()
                    .try_to_vec()
                    .unwrap(),
            );
            self.kv_store.write(wb);
        }

        let new_index = Arc::new(SnapshotIndex {
            persisted,
            head: next.clone(),
        });
        *self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = new_index;

        Ok(next)
    }

    /// Check whether `voter` has already cast `authorize` about `candidate` in the current epoch.
    pub(crate) fn has_voted(&self, voter: &Address, candidate: &Address, authorize: bool) -> bool {
        self.head()
            .votes
            .get(candidate)
            .and_then(|ballots| ballots.get(voter))
            .is_some_and(|ballot| *ballot == authorize)
    }
}

/// The ways in which reading or updating the [`SnapshotStore`] can fail.
#[derive(Debug)]
pub enum SnapshotStoreError {
    /// No genesis snapshot has been written yet.
    NotFound,
    EmptyValidatorSet,
    MissingBlock(u64),
    KVGetError(KVGetError),
    SnapshotError(SnapshotError),
    BlockchainError(BlockchainError),
}

impl From<KVGetError> for SnapshotStoreError {
    fn from(value: KVGetError) -> Self {
        SnapshotStoreError::KVGetError(value)
    }
}

impl From<SnapshotError> for SnapshotStoreError {
    fn from(value: SnapshotError) -> Self {
        SnapshotStoreError::SnapshotError(value)
    }
}

impl From<BlockchainError> for SnapshotStoreError {
    fn from(value: BlockchainError) -> Self {
        SnapshotStoreError::BlockchainError(value)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use crate::{
        blockchain::BuildBlockRequest,
        snapshot::pluggables::KVGet,
        types::{
            block::{Block, ValidatorVote},
            data_types::CryptoHash,
        },
    };

    use super::*;

    #[derive(Clone, Default)]
    struct TestDB(Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>);

    struct TestWriteBatch(Vec<(Vec<u8>, Option<Vec<u8>>)>);

    impl WriteBatch for TestWriteBatch {
        fn new() -> Self {
            TestWriteBatch(Vec::new())
        }

        fn set(&mut self, key: &[u8], value: &[u8]) {
            self.0.push((key.to_vec(), Some(value.to_vec())))
        }

        fn delete(&mut self, key: &[u8]) {
            self.0.push((key.to_vec(), None))
        }
    }

    impl KVGet for TestDB {
        fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
            self.0.lock().unwrap().get(key).cloned()
        }
    }

    impl KVStore for TestDB {
        type WriteBatch = TestWriteBatch;

        fn write(&mut self, wb: Self::WriteBatch) {
            let mut map = self.0.lock().unwrap();
            for (key, value) in wb.0 {
                match value {
                    Some(value) => map.insert(key, value),
                    None => map.remove(&key),
                };
            }
        }

        fn clear(&mut self) {
            self.0.lock().unwrap().clear()
        }
    }

    /// A chain of headers that each carry a vote to add address 4.
    struct TestChain(Vec<Block>);

    impl TestChain {
        fn new(length: u64) -> TestChain {
            let mut blocks = vec![Block::new(genesis(), Vec::new())];
            for number in 1..=length {
                let parent = &blocks[blocks.len() - 1].header;
                let header = Header::new(
                    parent.hash,
                    number,
                    number,
                    address((number % 3 + 1) as u8),
                    Some(ValidatorVote {
                        candidate: address(4),
                        authorize: true,
                    }),
                    Block::data_hash(&[]),
                );
                blocks.push(Block::new(header, Vec::new()));
            }
            TestChain(blocks)
        }
    }

    impl Blockchain for TestChain {
        fn head(&self) -> Header {
            self.0[self.0.len() - 1].header.clone()
        }

        fn block_by_number(&self, number: u64) -> Result<Option<Block>, BlockchainError> {
            Ok(self.0.get(number as usize).cloned())
        }

        fn build_block(&mut self, _: BuildBlockRequest) -> Result<Block, BlockchainError> {
            Err(BlockchainError::BuildFailed(String::from("read-only")))
        }

        fn validate_header(&self, _: &Header, _: &Header) -> Result<(), BlockchainError> {
            Ok(())
        }

        fn write_block(&mut self, _: Block) -> Result<(), BlockchainError> {
            Err(BlockchainError::Storage(String::from("read-only")))
        }
    }

    fn address(i: u8) -> Address {
        Address::new([i; 20])
    }

    fn genesis() -> Header {
        Header::new(CryptoHash::zero(), 0, 0, address(0), None, Block::data_hash(&[]))
    }

    fn initial_validators() -> ValidatorSet {
        ValidatorSet::new([address(1), address(2), address(3)])
    }

    #[test]
    fn get_snapshot_before_genesis_is_not_found() {
        let result = SnapshotStore::load(TestDB::default(), EpochSize::new(4), &TestChain::new(0));
        assert!(matches!(result, Err(SnapshotStoreError::NotFound)));
    }

    #[test]
    fn empty_validator_set_is_rejected() {
        let result = SnapshotStore::initialize(TestDB::default(), &genesis(), ValidatorSet::default());
        assert!(matches!(result, Err(SnapshotStoreError::EmptyValidatorSet)));
    }

    #[test]
    fn load_replays_headers_and_persists_epoch_boundaries() {
        let db = TestDB::default();
        SnapshotStore::initialize(db.clone(), &genesis(), initial_validators()).unwrap();

        let chain = TestChain::new(6);
        let store = SnapshotStore::load(db.clone(), EpochSize::new(4), &chain).unwrap();

        // Blocks 1 to 4 carry votes from validators 2, 3 and 1: more than half, so 4 joins at block 4.
        assert_eq!(store.head().number, 6);
        assert_eq!(store.get_snapshot(3).unwrap().validators, initial_validators());
        assert_eq!(store.get_snapshot(4).unwrap().validators.len(), 4);
        assert_eq!(store.validators_for(4).unwrap(), initial_validators());
        assert_eq!(store.validators_for(5).unwrap().len(), 4);

        assert_eq!(db.snapshot_numbers().unwrap(), vec![0, 4]);
        assert_eq!(db.snapshot(4).unwrap().unwrap().validators.len(), 4);

        // A restarted replica only needs to replay blocks 5 and 6.
        let reloaded = SnapshotStore::load(db, EpochSize::new(4), &chain).unwrap();
        assert_eq!(*reloaded.head(), *store.head());
    }

    #[test]
    fn readers_keep_the_index_they_were_handed() {
        let db = TestDB::default();
        SnapshotStore::initialize(db.clone(), &genesis(), initial_validators()).unwrap();
        let chain = TestChain::new(2);
        let mut store = SnapshotStore::load(db, EpochSize::new(4), &TestChain::new(0)).unwrap();

        let before = store.index();
        store.process_header(&chain.0[1].header).unwrap();
        store.process_header(&chain.0[2].header).unwrap();

        assert_eq!(before.head.number, 0);
        assert_eq!(store.head().number, 2);
        assert!(store.has_voted(&address(2), &address(4), true));

        // Re-processing a covered header is a no-op.
        store.process_header(&chain.0[1].header).unwrap();
        assert_eq!(store.head().number, 2);
    }

    #[test]
    fn corrupt_snapshots_are_reported() {
        let mut db = TestDB::default();
        SnapshotStore::initialize(db.clone(), &genesis(), initial_validators()).unwrap();

        let mut wb = TestWriteBatch::new();
        wb.set(&snapshot_key(0), &[1, 2, 3]);
        db.write(wb);

        let result = SnapshotStore::load(db, EpochSize::new(4), &TestChain::new(0));
        assert!(matches!(
            result,
            Err(SnapshotStoreError::KVGetError(KVGetError::CorruptData {
                key: Key::Snapshot { number: 0 },
                ..
            }))
        ));
    }
}
