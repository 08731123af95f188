/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validator snapshots: which addresses may vote at which height, and how that changes over time.
//!
//! Validators vote to add or remove a candidate by embedding a
//! [`ValidatorVote`](crate::types::block::ValidatorVote) in the headers they propose. The votes of an
//! epoch are tallied when its boundary block is finalized, producing the validator set for the next
//! epoch. [`types`] defines the rules, [`store`] keeps the results available to readers on other
//! threads and durable across restarts.

pub mod pluggables;

pub mod store;

pub mod types;

pub mod variables;
