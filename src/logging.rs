/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [configuration](crate::replica::Configuration).
//!
//! IBFT-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, Id5u7f6, (12, 0), fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the address of the
//!   proposer.
//! - The fourth value is the view as `(sequence, round)`.
//! - The fifth value is the first seven characters of the Base64 encoding of the hash of the proposed
//!   block.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const PROPOSE: &str = "Propose";
pub const PREPARE: &str = "Prepare";
pub const COMMIT: &str = "Commit";
pub const ROUND_CHANGE: &str = "RoundChange";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_ROUND_CHANGE: &str = "ReceiveRoundChange";

pub const START_ROUND: &str = "StartRound";
pub const ROUND_TIMEOUT: &str = "RoundTimeout";
pub const LOCK_PROPOSAL: &str = "LockProposal";
pub const FINALIZE_BLOCK: &str = "FinalizeBlock";
pub const UPDATE_VALIDATOR_SET: &str = "UpdateValidatorSet";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                propose_event.view,
                first_seven_base64_chars(&propose_event.block.hash().bytes()),
                propose_event.block.data.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for PrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prepare_event: &PrepareEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PREPARE,
                secs_since_unix_epoch(prepare_event.timestamp),
                prepare_event.view,
                first_seven_base64_chars(&prepare_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_event: &CommitEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(commit_event.timestamp),
                commit_event.view,
                first_seven_base64_chars(&commit_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RoundChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |round_change_event: &RoundChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ROUND_CHANGE,
                secs_since_unix_epoch(round_change_event.timestamp),
                round_change_event.view,
                round_change_event
                    .prepared_round
                    .map_or(String::from("-"), |round| round.to_string())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.origin.bytes()),
                receive_proposal_event.view,
                first_seven_base64_chars(&receive_proposal_event.block.hash().bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveRoundChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_round_change_event: &ReceiveRoundChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_ROUND_CHANGE,
                secs_since_unix_epoch(receive_round_change_event.timestamp),
                first_seven_base64_chars(&receive_round_change_event.origin.bytes()),
                receive_round_change_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_round_event: &StartRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_ROUND,
                secs_since_unix_epoch(start_round_event.timestamp),
                start_round_event.view,
                first_seven_base64_chars(&start_round_event.proposer.bytes()),
                start_round_event.timeout.as_millis()
            )
        };
        Box::new(logger)
    }
}

impl Logger for RoundTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |round_timeout_event: &RoundTimeoutEvent| {
            log::info!(
                "{}, {}, {}",
                ROUND_TIMEOUT,
                secs_since_unix_epoch(round_timeout_event.timestamp),
                round_timeout_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for LockProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |lock_proposal_event: &LockProposalEvent| {
            log::info!(
                "{}, {}, {}, {}",
                LOCK_PROPOSAL,
                secs_since_unix_epoch(lock_proposal_event.timestamp),
                lock_proposal_event.view,
                first_seven_base64_chars(&lock_proposal_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for FinalizeBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |finalize_block_event: &FinalizeBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                FINALIZE_BLOCK,
                secs_since_unix_epoch(finalize_block_event.timestamp),
                finalize_block_event.view,
                first_seven_base64_chars(&finalize_block_event.block.bytes()),
                finalize_block_event.number
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateValidatorSetEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_validator_set_event: &UpdateValidatorSetEvent| {
            log::info!(
                "{}, {}, {}, [{}]",
                UPDATE_VALIDATOR_SET,
                secs_since_unix_epoch(update_validator_set_event.timestamp),
                update_validator_set_event.sequence,
                update_validator_set_event
                    .validator_set
                    .iter()
                    .map(|validator| first_seven_base64_chars(&validator.bytes()))
                    .collect::<Vec<String>>()
                    .join(" ")
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_sync_event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(start_sync_event.timestamp),
                start_sync_event.head,
                start_sync_event.target
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_sync_event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(end_sync_event.timestamp),
                end_sync_event.blocks_synced
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
