/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which runs registered event handlers off the algorithm thread.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

/// How long the event bus waits for an event before checking for a shutdown signal again.
const EVENT_BUS_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// The handlers registered for each kind of [`Event`]: the user's handler, if any, and the default
/// logger, if `log_events` is enabled.
pub(crate) struct EventHandlers {
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) prepare_handlers: Vec<HandlerPtr<PrepareEvent>>,
    pub(crate) commit_handlers: Vec<HandlerPtr<CommitEvent>>,
    pub(crate) round_change_handlers: Vec<HandlerPtr<RoundChangeEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_round_change_handlers: Vec<HandlerPtr<ReceiveRoundChangeEvent>>,
    pub(crate) start_round_handlers: Vec<HandlerPtr<StartRoundEvent>>,
    pub(crate) round_timeout_handlers: Vec<HandlerPtr<RoundTimeoutEvent>>,
    pub(crate) lock_proposal_handlers: Vec<HandlerPtr<LockProposalEvent>>,
    pub(crate) finalize_block_handlers: Vec<HandlerPtr<FinalizeBlockEvent>>,
    pub(crate) update_validator_set_handlers: Vec<HandlerPtr<UpdateValidatorSetEvent>>,
    pub(crate) start_sync_handlers: Vec<HandlerPtr<StartSyncEvent>>,
    pub(crate) end_sync_handlers: Vec<HandlerPtr<EndSyncEvent>>,
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        prepare_handler: Option<HandlerPtr<PrepareEvent>>,
        commit_handler: Option<HandlerPtr<CommitEvent>>,
        round_change_handler: Option<HandlerPtr<RoundChangeEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_round_change_handler: Option<HandlerPtr<ReceiveRoundChangeEvent>>,
        start_round_handler: Option<HandlerPtr<StartRoundEvent>>,
        round_timeout_handler: Option<HandlerPtr<RoundTimeoutEvent>>,
        lock_proposal_handler: Option<HandlerPtr<LockProposalEvent>>,
        finalize_block_handler: Option<HandlerPtr<FinalizeBlockEvent>>,
        update_validator_set_handler: Option<HandlerPtr<UpdateValidatorSetEvent>>,
        start_sync_handler: Option<HandlerPtr<StartSyncEvent>>,
        end_sync_handler: Option<HandlerPtr<EndSyncEvent>>,
    ) -> EventHandlers {
        let propose_handlers = handlers(propose_handler, log_events);
        let prepare_handlers = handlers(prepare_handler, log_events);
        let commit_handlers = handlers(commit_handler, log_events);
        let round_change_handlers = handlers(round_change_handler, log_events);
        let receive_proposal_handlers = handlers(receive_proposal_handler, log_events);
        let receive_round_change_handlers = handlers(receive_round_change_handler, log_events);
        let start_round_handlers = handlers(start_round_handler, log_events);
        let round_timeout_handlers = handlers(round_timeout_handler, log_events);
        let lock_proposal_handlers = handlers(lock_proposal_handler, log_events);
        let finalize_block_handlers = handlers(finalize_block_handler, log_events);
        let update_validator_set_handlers = handlers(update_validator_set_handler, log_events);
        let start_sync_handlers = handlers(start_sync_handler, log_events);
        let end_sync_handlers = handlers(end_sync_handler, log_events);

        EventHandlers {
            propose_handlers,
            prepare_handlers,
            commit_handlers,
            round_change_handlers,
            receive_proposal_handlers,
            receive_round_change_handlers,
            start_round_handlers,
            round_timeout_handlers,
            lock_proposal_handlers,
            finalize_block_handlers,
            update_validator_set_handlers,
            start_sync_handlers,
            end_sync_handlers,
        }
    }

    /// Check whether no handler at all is registered, in which case no event bus thread is needed.
    pub(crate) fn is_empty(&self) -> bool {
        self.propose_handlers.is_empty()
            && self.prepare_handlers.is_empty()
            && self.commit_handlers.is_empty()
            && self.round_change_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_round_change_handlers.is_empty()
            && self.start_round_handlers.is_empty()
            && self.round_timeout_handlers.is_empty()
            && self.lock_proposal_handlers.is_empty()
            && self.finalize_block_handlers.is_empty()
            && self.update_validator_set_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Propose(event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::Prepare(event) => self
                .prepare_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::Commit(event) => self
                .commit_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::RoundChange(event) => self
                .round_change_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::ReceiveProposal(event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::ReceiveRoundChange(event) => self
                .receive_round_change_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::StartRound(event) => self
                .start_round_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::RoundTimeout(event) => self
                .round_timeout_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::LockProposal(event) => self
                .lock_proposal_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::FinalizeBlock(event) => self
                .finalize_block_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::UpdateValidatorSet(event) => self
                .update_validator_set_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::StartSync(event) => self
                .start_sync_handlers
                .iter()
                .for_each(|handler| handler(&event)),
            Event::EndSync(event) => self
                .end_sync_handlers
                .iter()
                .for_each(|handler| handler(&event)),
        }
    }
}

/// Collect the user's `handler` for an event type and, if `log_events`, the default logger for it.
fn handlers<E: Logger>(handler: Option<HandlerPtr<E>>, log_events: bool) -> Vec<HandlerPtr<E>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(E::get_logger());
    }
    if let Some(handler) = handler {
        handlers.push(handler);
    }
    handlers
}

/// Spawn the event bus thread, which fires the handlers for every event published by the algorithm
/// thread until it receives a shutdown signal.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(EVENT_BUS_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The algorithm thread has exited. Wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(EVENT_BUS_POLL_INTERVAL),
        }
    })
}
