/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each snapshot variable is stored in the user-provided key-value
//! store.
//!
//! # List of State Variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Snapshots|`u64` -> [`Snapshot`](super::types::Snapshot)|Mapping between a block number and the snapshot computed after applying the header with that number. Only genesis and epoch-boundary snapshots are persisted.|
//! |Snapshot Numbers|`Vec<u64>`|Ascending list of the block numbers that have a persisted snapshot.|
//!
//! # Persistence of state variables
//!
//! Values are stored **Borsh-serialized**.
//!
//! A snapshot is stored at the key formed by concatenating [`SNAPSHOTS`] with the **big-endian**
//! bytes of its block number, so that the keys of persisted snapshots sort in block number order in
//! stores that keep keys ordered. The list of snapshot numbers is stored at the concatenation of
//! [`SNAPSHOTS`] and [`SNAPSHOT_NUMBERS`]. Because block-number keys are always 9 bytes long and the
//! snapshot numbers key is 8 bytes long, the two can never collide.

pub const SNAPSHOTS: [u8; 1] = [b's'];

pub const SNAPSHOT_NUMBERS: [u8; 7] = *b"numbers";

/// Get the key at which the snapshot for block `number` is stored.
pub fn snapshot_key(number: u64) -> Vec<u8> {
    concat(&SNAPSHOTS, &number.to_be_bytes())
}

/// Get the key at which the list of persisted snapshot numbers is stored.
pub fn snapshot_numbers_key() -> Vec<u8> {
    concat(&SNAPSHOTS, &SNAPSHOT_NUMBERS)
}

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
