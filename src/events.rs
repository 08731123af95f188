/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of IBFT-rs events for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published by
//! the algorithm thread and consumed by the [event bus](crate::event_bus) thread, which runs the
//! library user's handlers and, if enabled, the default [loggers](crate::logging).

use std::{
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use crate::types::{
    block::Block,
    data_types::{Address, CryptoHash, View},
    validator_set::ValidatorSet,
};

pub enum Event {
    // Events that involve broadcasting a message.
    Propose(ProposeEvent),
    Prepare(PrepareEvent),
    Commit(CommitEvent),
    RoundChange(RoundChangeEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveRoundChange(ReceiveRoundChangeEvent),
    // Events that change the replica's state.
    StartRound(StartRoundEvent),
    RoundTimeout(RoundTimeoutEvent),
    LockProposal(LockProposalEvent),
    FinalizeBlock(FinalizeBlockEvent),
    UpdateValidatorSet(UpdateValidatorSetEvent),
    // Sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one.
    ///
    /// A disconnected event bus is not an error: events are informational.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// The replica broadcasted a `Preprepare` for `block` as the proposer of `view`.
pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub block: Block,
}

/// The replica broadcasted a `Prepare` for the block with hash `block`.
pub struct PrepareEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub block: CryptoHash,
}

/// The replica broadcasted a `Commit` for the block with hash `block`.
pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub block: CryptoHash,
}

/// The replica broadcasted a `RoundChange` to `view.round`, carrying its lock from `prepared_round`, if
/// any.
pub struct RoundChangeEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub prepared_round: Option<u64>,
}

/// The replica accepted a proposal from `origin`.
pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: Address,
    pub view: View,
    pub block: Block,
}

pub struct ReceiveRoundChangeEvent {
    pub timestamp: SystemTime,
    pub origin: Address,
    pub view: View,
}

pub struct StartRoundEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub proposer: Address,
    pub timeout: Duration,
}

pub struct RoundTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: View,
}

/// The replica collected a prepared certificate for the block with hash `block` and locked on it.
pub struct LockProposalEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub block: CryptoHash,
}

/// A sealed block was written to the canonical chain.
pub struct FinalizeBlockEvent {
    pub timestamp: SystemTime,
    pub view: View,
    pub block: CryptoHash,
    pub number: u64,
}

/// The validator set that votes on block `sequence` differs from the one that voted on its parent.
pub struct UpdateValidatorSetEvent {
    pub timestamp: SystemTime,
    pub sequence: u64,
    pub validator_set: ValidatorSet,
}

/// The replica stopped taking part in consensus to catch up from `head` to `target`.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub head: u64,
    pub target: u64,
}

pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub blocks_synced: u64,
}
