/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable snapshot persistence.
//!
//! Library users provide the key-value store by implementing [`KVStore`]. Clones of a `KVStore` must
//! share the same underlying storage.

use std::fmt::Display;

use borsh::BorshDeserialize;

use super::{
    types::Snapshot,
    variables::{snapshot_key, snapshot_numbers_key},
};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Atomically apply every operation in `wb`.
    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Snapshots ↓↓↓ */

    fn snapshot(&self, number: u64) -> Result<Option<Snapshot>, KVGetError> {
        if let Some(bytes) = self.get(&snapshot_key(number)) {
            Ok(Some(Snapshot::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::CorruptData {
                    key: Key::Snapshot { number },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Snapshot Numbers ↓↓↓ */

    fn snapshot_numbers(&self) -> Result<Vec<u64>, KVGetError> {
        if let Some(bytes) = self.get(&snapshot_numbers_key()) {
            Vec::<u64>::deserialize(&mut &*bytes).map_err(|err| KVGetError::CorruptData {
                key: Key::SnapshotNumbers,
                source: err,
            })
        } else {
            Ok(Vec::new())
        }
    }
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found.
#[derive(Debug)]
pub enum KVGetError {
    CorruptData { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
}

#[derive(Debug)]
pub enum Key {
    Snapshot { number: u64 },
    SnapshotNumbers,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Snapshot { number } => write!(f, "Snapshot at block {}", number),
            Key::SnapshotNumbers => write!(f, "Snapshot Numbers"),
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}
