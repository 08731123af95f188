/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a replica should play at any given View and Validator Set.

use crate::{
    replica::ConfigError,
    types::{
        data_types::{Address, View},
        validator_set::ValidatorSet,
    },
};

/// Get the proposer of `view`: the validator at position `(sequence + round) mod N` of the ordered
/// `validator_set`.
///
/// Every replica that agrees on `validator_set` agrees on the proposer, and within a sequence the role
/// rotates through every validator as the round increases.
pub(crate) fn proposer_at(view: View, validator_set: &ValidatorSet) -> Result<Address, ConfigError> {
    let n = validator_set.len() as u64;
    if n == 0 {
        return Err(ConfigError::EmptyValidatorSet);
    }
    let index = (view.sequence.wrapping_add(view.round) % n) as usize;
    validator_set
        .get(index)
        .copied()
        .ok_or(ConfigError::EmptyValidatorSet)
}

/// Determine whether `replica` should propose in `view`.
pub(crate) fn is_proposer(replica: &Address, view: View, validator_set: &ValidatorSet) -> bool {
    proposer_at(view, validator_set).is_ok_and(|proposer| &proposer == replica)
}

/// Determine whether `replica` may vote, given the `validator_set` of the current sequence.
///
/// Replicas that are not validators still follow the protocol so that they can finalize blocks, but
/// never sign protocol messages.
pub(crate) fn is_validator(replica: &Address, validator_set: &ValidatorSet) -> bool {
    validator_set.contains(replica)
}
