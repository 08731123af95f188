/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the IBFT protocol, as described in the
//! [module-level documentation](super).
//!
//! Main type: [`Ibft`].

use std::{
    cmp::{max, min},
    collections::BTreeMap,
    sync::{mpsc::Sender, Arc, Mutex},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    blockchain::{Blockchain, BlockchainError, BuildBlockRequest},
    events::{
        CommitEvent, EndSyncEvent, Event, FinalizeBlockEvent, LockProposalEvent, PrepareEvent,
        ProposeEvent, ReceiveProposalEvent, ReceiveRoundChangeEvent, RoundChangeEvent,
        RoundTimeoutEvent, StartRoundEvent, StartSyncEvent, UpdateValidatorSetEvent,
    },
    networking::{network::NetworkSender, sending::SenderHandle},
    replica::ConfigError,
    snapshot::{
        pluggables::KVStore,
        store::{SnapshotStore, SnapshotStoreError},
    },
    types::{
        block::{Block, Header, ValidatorVote},
        crypto_primitives::Keypair,
        data_types::{Address, ChainID, CryptoHash, View},
    },
};

use super::{
    messages::{IbftMessage, MessageType, Payload},
    roles::{is_proposer, is_validator, proposer_at},
    round_state::{RoundState, Vote},
    types::{IbftState, PreparedCertificate, PreparedProposal, SignedVote},
};

/// The round timeout stops doubling after this many rounds.
pub(crate) const MAX_ROUND_TIMEOUT_EXPONENT: u32 = 8;

/// A single participant in the IBFT protocol.
///
/// # Usage
///
/// Like the rest of the library's protocol code, `Ibft` is meant to be used in an "event-oriented"
/// fashion by the [algorithm thread](crate::algorithm). Its crate-public methods are:
/// 1. [`start`](Self::start): called once, before anything else.
/// 2. [`on_receive_msg`](Self::on_receive_msg): called when a new [`IbftMessage`] is received.
/// 3. [`tick`](Self::tick): called regularly, to fire the round timer and to notice blocks that
///    reached the blockchain by other means than consensus (i.e., sync).
///
/// [`current_view`](Self::current_view) and [`deadline`](Self::deadline) tell the algorithm thread
/// which messages to receive and how long it may wait for them.
pub(crate) struct Ibft<N: NetworkSender, B: Blockchain, K: KVStore> {
    config: IbftConfiguration,
    me: Address,
    state: IbftState,
    round_state: RoundState,
    round_change_target: u64,
    round_deadline: Instant,
    blockchain: B,
    snapshots: SnapshotStore<K>,
    sender_handle: SenderHandle<N>,
    candidates: Arc<Mutex<BTreeMap<Address, bool>>>,
    highest_seen: BTreeMap<Address, u64>,
    sync_target: u64,
    sync_start_head: u64,
    sync_backoff: bool,
    announced: u64,
    finalized_blocks: Sender<Block>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: NetworkSender, B: Blockchain, K: KVStore> Ibft<N, B, K> {
    /// Create a new IBFT protocol participant.
    ///
    /// Blocks up to the current head of `blockchain` are considered already announced: only blocks
    /// after it are sent to `finalized_blocks`.
    pub(crate) fn new(
        config: IbftConfiguration,
        blockchain: B,
        snapshots: SnapshotStore<K>,
        sender_handle: SenderHandle<N>,
        candidates: Arc<Mutex<BTreeMap<Address, bool>>>,
        finalized_blocks: Sender<Block>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let me = config.keypair.address();
        let announced = blockchain.head().number;
        Self {
            config,
            me,
            state: IbftState::AcceptBlock,
            round_state: RoundState::new(0, Default::default()),
            round_change_target: 0,
            round_deadline: Instant::now(),
            blockchain,
            snapshots,
            sender_handle,
            candidates,
            highest_seen: BTreeMap::new(),
            sync_target: 0,
            sync_start_head: 0,
            sync_backoff: false,
            announced,
            finalized_blocks,
            event_publisher,
        }
    }

    /// Start working on the block after the current head.
    pub(crate) fn start(&mut self) -> Result<(), IbftError> {
        self.start_sequence(true)
    }

    /// Get the view whose messages the replica currently processes.
    pub(crate) fn current_view(&self) -> View {
        self.round_state.view()
    }

    /// Get the instant at which [`tick`](Self::tick) should next be called at the latest.
    pub(crate) fn deadline(&self) -> Instant {
        self.round_deadline
    }

    pub(crate) fn chain_id(&self) -> ChainID {
        self.config.chain_id
    }

    /// Process a newly received, correctly signed message.
    ///
    /// ## Internal procedure
    ///
    /// 1. Drop the message if its sender is not a validator of the current sequence.
    /// 2. Note the sequence that the sender is working on, and enter [`Sync`](IbftState::Sync) if a
    ///    weak quorum of validators is ahead of the replica.
    /// 3. Drop the message if it is not for the current sequence, or if it is not a `RoundChange` and not
    ///    for the current round.
    /// 4. Call one of the following internal event handlers depending on the payload:
    ///     - [`on_receive_preprepare`](Self::on_receive_preprepare).
    ///     - [`on_receive_prepare`](Self::on_receive_prepare).
    ///     - [`on_receive_commit`](Self::on_receive_commit).
    ///     - [`on_receive_round_change`](Self::on_receive_round_change).
    pub(crate) fn on_receive_msg(&mut self, msg: IbftMessage) -> Result<(), IbftError> {
        // 1. Only validators of the current sequence take part.
        if let Err(err) = msg.check_sender(self.round_state.validators()) {
            log::debug!(
                "Dropped {:?} message from {} in view {}: {:?}",
                msg.msg_type(),
                msg.sender,
                msg.view,
                err
            );
            return Ok(());
        }

        // 2. Track how far ahead the network is.
        self.observe(&msg);
        if self.state == IbftState::Sync {
            return Ok(());
        }

        let sequence = self.round_state.sequence();
        if msg.view.sequence != sequence {
            if msg.view.sequence > sequence && !self.sync_backoff {
                let head = sequence - 1;
                let network_head = self.network_head();
                if network_head > head {
                    self.enter_sync(head, network_head);
                }
            }
            return Ok(());
        }

        // 3. and 4. Dispatch by payload.
        let sender = msg.sender;
        let view = msg.view;
        let vote = msg.vote();
        match msg.payload {
            Payload::RoundChange { prepared } => {
                self.on_receive_round_change(sender, view, prepared)
            }
            _ if view.round != self.round_state.round() => Ok(()),
            Payload::Preprepare {
                proposal,
                justification,
            } => self.on_receive_preprepare(sender, view, proposal, justification, vote),
            Payload::Prepare { digest } => self.on_receive_prepare(sender, view, digest, vote),
            Payload::Commit { digest } => self.on_receive_commit(sender, view, digest, vote),
        }
    }

    /// Fire the round timer if it has expired, and follow the blockchain if it advanced by itself.
    pub(crate) fn tick(&mut self) -> Result<(), IbftError> {
        let head = self.blockchain.head().number;

        if self.state == IbftState::Sync {
            if head >= self.sync_target {
                self.end_sync(head);
                return self.start_sequence(true);
            }
            if Instant::now() >= self.round_deadline {
                // Stop waiting. If the blockchain made no progress at all, give consensus a chance before
                // asking again.
                self.end_sync(head);
                let synced_any = head > self.sync_start_head;
                return self.start_sequence(synced_any);
            }
            return Ok(());
        }

        if head >= self.round_state.sequence() {
            return self.start_sequence(true);
        }

        if Instant::now() >= self.round_deadline {
            return self.on_round_timeout();
        }

        Ok(())
    }

    /// Move on to the sequence after the blockchain's head.
    ///
    /// ## Internal procedure
    ///
    /// 1. Replay every block up to the head into the snapshot store, and announce the ones not announced
    ///    yet.
    /// 2. Load the validator set of the new sequence, and inform the network if it changed.
    /// 3. Clear the round state, including the lock.
    /// 4. If a weak quorum of validators is ahead (and `allow_sync`), enter `Sync`. Otherwise, start
    ///    round 0.
    fn start_sequence(&mut self, allow_sync: bool) -> Result<(), IbftError> {
        // 1. Catch up with the head.
        let head = self.catch_up_to_head()?;

        // 2. Load the validator set.
        let sequence = head.number + 1;
        let validators = self.snapshots.validators_for(sequence)?;
        if validators.is_empty() {
            return Err(ConfigError::EmptyValidatorSet.into());
        }
        if &validators != self.round_state.validators() {
            self.sender_handle.update_validator_set(validators.clone());
            self.highest_seen
                .retain(|validator, _| validators.contains(validator));

            Event::UpdateValidatorSet(UpdateValidatorSetEvent {
                timestamp: SystemTime::now(),
                sequence,
                validator_set: validators.clone(),
            })
            .publish(&self.event_publisher);
        }

        // 3. Start from a clean slate.
        self.round_state.reset(sequence, validators);
        self.sync_backoff = !allow_sync;

        // 4. Sync, or start the first round.
        let network_head = self.network_head();
        if allow_sync && network_head > head.number {
            self.enter_sync(head.number, network_head);
            return Ok(());
        }
        self.enter_accept_block(0)
    }

    /// Feed every block up to the blockchain's head to the snapshot store, and announce every block after
    /// the last announced one. Returns the head.
    fn catch_up_to_head(&mut self) -> Result<Header, IbftError> {
        let head = self.blockchain.head();
        let from = min(self.snapshots.head().number, self.announced) + 1;
        for number in from..=head.number {
            let block = self
                .blockchain
                .block_by_number(number)?
                .ok_or(IbftError::MissingBlock(number))?;
            self.snapshots.process_header(&block.header)?;
            if number > self.announced {
                // The receiver may have been dropped by the library user. Blocks are still finalized.
                let _ = self.finalized_blocks.send(block);
                self.announced = number;
            }
        }
        Ok(head)
    }

    /// Start `round` of the current sequence in the `AcceptBlock` state, and propose if the replica is
    /// the proposer.
    ///
    /// The proposer re-proposes the highest-round prepared proposal it knows of (its own lock, or one
    /// carried by the `RoundChange`s that started the round), justified by its certificate. Only if there
    /// is none does it build a new block.
    fn enter_accept_block(&mut self, round: u64) -> Result<(), IbftError> {
        // 1. Start the round and arm the timer.
        self.round_state.start_round(round);
        self.state = IbftState::AcceptBlock;
        self.round_change_target = round;
        let timeout = self.round_timeout(round);
        self.round_deadline = Instant::now() + timeout;

        let view = self.round_state.view();
        let proposer = proposer_at(view, self.round_state.validators())?;

        Event::StartRound(StartRoundEvent {
            timestamp: SystemTime::now(),
            view,
            proposer,
            timeout,
        })
        .publish(&self.event_publisher);

        if proposer != self.me {
            return Ok(());
        }

        // 2. Choose the proposal.
        let (proposal, justification) = match self.round_state.highest_prepared(round) {
            Some(prepared) => (prepared.block, Some(prepared.certificate)),
            None => {
                let request = BuildBlockRequest::new(
                    self.blockchain.head(),
                    self.me,
                    self.pending_vote(),
                );
                match self.blockchain.build_block(request) {
                    Ok(block) => (block, None),
                    Err(err) => {
                        log::error!("Failed to build a block for view {}: {:?}", view, err);
                        return Ok(());
                    }
                }
            }
        };

        // 3. Broadcast it. The Preprepare counts as the proposer's prepare vote.
        let preprepare = IbftMessage::new(
            &self.config.keypair,
            self.config.chain_id,
            view,
            Payload::Preprepare {
                proposal: proposal.clone(),
                justification,
            },
        );
        self.round_state.set_proposal(proposal.clone());
        self.round_state.add_prepare(
            round,
            self.me,
            Vote {
                msg_type: MessageType::Preprepare,
                digest: proposal.hash(),
                signed: preprepare.vote(),
            },
        );
        self.sender_handle.broadcast(preprepare);
        self.state = IbftState::Validate;

        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            view,
            block: proposal,
        })
        .publish(&self.event_publisher);

        self.check_prepare_quorum()
    }

    /// Process a `Preprepare` for the current view.
    ///
    /// Only the first `Preprepare` from the proposer of the view is considered. If the proposal is
    /// invalid, the replica moves to `RoundChange` for the next round.
    fn on_receive_preprepare(
        &mut self,
        origin: Address,
        view: View,
        proposal: Block,
        justification: Option<PreparedCertificate>,
        vote: SignedVote,
    ) -> Result<(), IbftError> {
        // 1. Check that the sender may propose, and that nothing was accepted in this round yet.
        if self.state != IbftState::AcceptBlock || self.round_state.proposal().is_some() {
            return Ok(());
        }
        if !is_proposer(&origin, view, self.round_state.validators()) {
            log::debug!("Dropped Preprepare from {} who is not the proposer of {}", origin, view);
            return Ok(());
        }

        // 2. Validate the proposal.
        if let Err(err) = self.validate_proposal(origin, view, &proposal, justification.as_ref()) {
            log::error!("Rejected proposal from {} in view {}: {:?}", origin, view, err);
            return self.enter_round_change(view.round + 1);
        }

        // 3. Accept it, counting the Preprepare as the proposer's prepare vote.
        let digest = proposal.hash();
        self.round_state.set_proposal(proposal.clone());
        self.round_state.add_prepare(
            view.round,
            origin,
            Vote {
                msg_type: MessageType::Preprepare,
                digest,
                signed: vote,
            },
        );
        self.state = IbftState::Validate;

        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin,
            view,
            block: proposal,
        })
        .publish(&self.event_publisher);

        // 4. Prepare, if I am a validator.
        if is_validator(&self.me, self.round_state.validators()) {
            let prepare = IbftMessage::new(
                &self.config.keypair,
                self.config.chain_id,
                view,
                Payload::Prepare { digest },
            );
            self.round_state.add_prepare(
                view.round,
                self.me,
                Vote {
                    msg_type: MessageType::Prepare,
                    digest,
                    signed: prepare.vote(),
                },
            );
            self.sender_handle.broadcast(prepare);

            Event::Prepare(PrepareEvent {
                timestamp: SystemTime::now(),
                view,
                block: digest,
            })
            .publish(&self.event_publisher);
        }

        self.check_prepare_quorum()
    }

    /// Check a proposal from `origin` for `view` against the chain, and against the replica's lock.
    fn validate_proposal(
        &self,
        origin: Address,
        view: View,
        proposal: &Block,
        justification: Option<&PreparedCertificate>,
    ) -> Result<(), ValidationError> {
        let head = self.blockchain.head();

        // 1. The block must be well formed and extend the head.
        if !proposal.header.is_hash_correct() {
            return Err(ValidationError::IncorrectHash);
        }
        if proposal.header.data_hash != Block::data_hash(&proposal.data) {
            return Err(ValidationError::IncorrectDataHash);
        }
        if proposal.number() != view.sequence {
            return Err(ValidationError::WrongNumber {
                expected: view.sequence,
                got: proposal.number(),
            });
        }
        if proposal.header.parent_hash != head.hash {
            return Err(ValidationError::WrongParent);
        }
        // A re-proposed block keeps the header of the round in which it was first proposed.
        if justification.is_none() && proposal.header.proposer != origin {
            return Err(ValidationError::WrongProposer);
        }
        self.blockchain
            .validate_header(&proposal.header, &head)
            .map_err(ValidationError::RejectedByBlockchain)?;

        // 2. A justification must prove that the block was prepared in an earlier round.
        if let Some(certificate) = justification {
            if certificate.digest != proposal.hash()
                || certificate.view.sequence != view.sequence
                || certificate.view.round >= view.round
                || !certificate.is_correct(self.config.chain_id, self.round_state.validators())
            {
                return Err(ValidationError::InvalidJustification);
            }
        }

        // 3. A locked replica accepts only its locked block, or a block prepared after its lock.
        if let Some(locked) = self.round_state.locked() {
            let prepared_after_lock = justification
                .is_some_and(|certificate| certificate.view.round > locked.round());
            if locked.block.hash() != proposal.hash() && !prepared_after_lock {
                return Err(ValidationError::ConflictsWithLock {
                    locked: locked.block.hash(),
                });
            }
        }

        Ok(())
    }

    fn on_receive_prepare(
        &mut self,
        origin: Address,
        view: View,
        digest: CryptoHash,
        vote: SignedVote,
    ) -> Result<(), IbftError> {
        let vote = Vote {
            msg_type: MessageType::Prepare,
            digest,
            signed: vote,
        };
        if self.round_state.add_prepare(view.round, origin, vote) {
            self.check_prepare_quorum()
        } else {
            Ok(())
        }
    }

    fn on_receive_commit(
        &mut self,
        origin: Address,
        view: View,
        digest: CryptoHash,
        vote: SignedVote,
    ) -> Result<(), IbftError> {
        let vote = Vote {
            msg_type: MessageType::Commit,
            digest,
            signed: vote,
        };
        if self.round_state.add_commit(view.round, origin, vote) {
            self.check_commit_quorum()
        } else {
            Ok(())
        }
    }

    /// Process a `RoundChange` to `view.round` of the current sequence.
    ///
    /// ## Internal procedure
    ///
    /// 1. Drop it if it is not for a round after the current one, or if it carries an invalid prepared
    ///    proposal.
    /// 2. If a weak quorum (F+1) of validators asked for rounds above the one this replica is heading
    ///    to, join the highest round they all support.
    /// 3. If a quorum asked for `view.round`, start it.
    fn on_receive_round_change(
        &mut self,
        origin: Address,
        view: View,
        prepared: Option<PreparedProposal>,
    ) -> Result<(), IbftError> {
        // 1. Check the message.
        if view.round <= self.round_state.round() {
            return Ok(());
        }
        if let Some(prepared) = &prepared {
            if prepared.round() >= view.round
                || !prepared.is_correct(
                    self.config.chain_id,
                    view.sequence,
                    self.round_state.validators(),
                )
            {
                log::debug!(
                    "Dropped RoundChange from {} in view {}: invalid prepared proposal",
                    origin,
                    view
                );
                return Ok(());
            }
        }
        if !self.round_state.add_round_change(view.round, origin, prepared) {
            return Ok(());
        }

        Event::ReceiveRoundChange(ReceiveRoundChangeEvent {
            timestamp: SystemTime::now(),
            origin,
            view,
        })
        .publish(&self.event_publisher);

        // 2. Weak catch-up.
        let target = self.heading_to();
        let weak_quorum = self.round_state.validators().max_faulty() + 1;
        if let Some(round) = self.round_state.round_with_weak_support(target, weak_quorum) {
            self.enter_round_change(round)?;
        }

        // 3. Quorum.
        self.check_round_change_quorum(view.round)
    }

    /// Broadcast a `RoundChange` to `round`, carrying the replica's lock, and wait in the `RoundChange`
    /// state for a quorum to join.
    fn enter_round_change(&mut self, round: u64) -> Result<(), IbftError> {
        self.state = IbftState::RoundChange;
        self.round_change_target = round;
        self.round_deadline = Instant::now() + self.round_timeout(round);

        let view = self.round_state.view().with_round(round);
        if is_validator(&self.me, self.round_state.validators()) {
            let prepared = self.round_state.locked().cloned();
            let prepared_round = prepared.as_ref().map(|prepared| prepared.round());
            let round_change = IbftMessage::new(
                &self.config.keypair,
                self.config.chain_id,
                view,
                Payload::RoundChange {
                    prepared: prepared.clone(),
                },
            );
            self.round_state.add_round_change(round, self.me, prepared);
            self.sender_handle.broadcast(round_change);

            Event::RoundChange(RoundChangeEvent {
                timestamp: SystemTime::now(),
                view,
                prepared_round,
            })
            .publish(&self.event_publisher);
        }

        self.check_round_change_quorum(round)
    }

    fn check_round_change_quorum(&mut self, round: u64) -> Result<(), IbftError> {
        if round > self.round_state.round() && self.round_state.has_quorum_round_change(round) {
            self.enter_accept_block(round)
        } else {
            Ok(())
        }
    }

    /// If a quorum prepared the current proposal, lock on it and broadcast a `Commit` (once per round).
    ///
    /// Either way, go on to check the commit quorum: the `Commit`s of a round may arrive before its
    /// `Preprepare` or its prepares.
    fn check_prepare_quorum(&mut self) -> Result<(), IbftError> {
        if self.state != IbftState::Validate || self.round_state.commit_sent() {
            return self.check_commit_quorum();
        }
        let (Some(certificate), Some(block)) = (
            self.round_state.prepared_certificate(),
            self.round_state.proposal().cloned(),
        ) else {
            return self.check_commit_quorum();
        };

        // 1. Lock.
        let view = self.round_state.view();
        let digest = block.hash();
        self.round_state.lock(PreparedProposal { block, certificate });
        self.round_state.mark_commit_sent();

        Event::LockProposal(LockProposalEvent {
            timestamp: SystemTime::now(),
            view,
            block: digest,
        })
        .publish(&self.event_publisher);

        // 2. Commit, if I am a validator.
        if is_validator(&self.me, self.round_state.validators()) {
            let commit = IbftMessage::new(
                &self.config.keypair,
                self.config.chain_id,
                view,
                Payload::Commit { digest },
            );
            self.round_state.add_commit(
                view.round,
                self.me,
                Vote {
                    msg_type: MessageType::Commit,
                    digest,
                    signed: commit.vote(),
                },
            );
            self.sender_handle.broadcast(commit);

            Event::Commit(CommitEvent {
                timestamp: SystemTime::now(),
                view,
                block: digest,
            })
            .publish(&self.event_publisher);
        }

        self.check_commit_quorum()
    }

    /// If a quorum committed the current proposal, seal it and write it to the blockchain.
    ///
    /// A quorum of commits finalizes the proposal even if the replica already asked for a round change.
    fn check_commit_quorum(&mut self) -> Result<(), IbftError> {
        if !matches!(self.state, IbftState::Validate | IbftState::RoundChange) {
            return Ok(());
        }
        let (Some(seal), Some(block)) = (
            self.round_state.commit_seal(),
            self.round_state.proposal().cloned(),
        ) else {
            return Ok(());
        };

        self.state = IbftState::Commit;
        let view = self.round_state.view();
        let digest = block.hash();
        let number = block.number();

        match self.blockchain.write_block(block.with_seal(seal)) {
            Ok(()) => {
                Event::FinalizeBlock(FinalizeBlockEvent {
                    timestamp: SystemTime::now(),
                    view,
                    block: digest,
                    number,
                })
                .publish(&self.event_publisher);

                self.start_sequence(true)
            }
            Err(err) => {
                log::error!("{:?}", CommitError::WriteFailed { view, error: err });
                self.enter_round_change(view.round + 1)
            }
        }
    }

    fn on_round_timeout(&mut self) -> Result<(), IbftError> {
        let target = self.heading_to();
        let view = self.round_state.view().with_round(target);

        Event::RoundTimeout(RoundTimeoutEvent {
            timestamp: SystemTime::now(),
            view,
        })
        .publish(&self.event_publisher);

        let head = view.sequence - 1;
        let network_head = self.network_head();
        if network_head > head {
            self.enter_sync(head, network_head);
            return Ok(());
        }

        self.enter_round_change(target + 1)
    }

    /// Stop taking part in consensus, and ask the blockchain to catch up to `target`.
    fn enter_sync(&mut self, head: u64, target: u64) {
        self.state = IbftState::Sync;
        self.sync_target = target;
        self.sync_start_head = head;
        self.round_deadline = Instant::now() + self.round_timeout(0);
        self.blockchain.request_sync(target);

        Event::StartSync(StartSyncEvent {
            timestamp: SystemTime::now(),
            head,
            target,
        })
        .publish(&self.event_publisher);
    }

    fn end_sync(&mut self, head: u64) {
        Event::EndSync(EndSyncEvent {
            timestamp: SystemTime::now(),
            blocks_synced: head.saturating_sub(self.sync_start_head),
        })
        .publish(&self.event_publisher);
    }

    /// Get the round the replica is trying to get into: the current round, or the target of its
    /// `RoundChange`.
    fn heading_to(&self) -> u64 {
        match self.state {
            IbftState::RoundChange => self.round_change_target,
            _ => self.round_state.round(),
        }
    }

    fn observe(&mut self, msg: &IbftMessage) {
        let highest = self.highest_seen.entry(msg.sender).or_insert(0);
        *highest = max(*highest, msg.view.sequence);
    }

    /// Get the highest block number that at least one honest validator is known to have finalized:
    /// the (F+1)-th highest sequence seen from distinct validators, minus one.
    fn network_head(&self) -> u64 {
        let max_faulty = self.round_state.validators().max_faulty();
        let mut seen: Vec<u64> = self.highest_seen.values().copied().collect();
        seen.sort_unstable_by(|a, b| b.cmp(a));
        seen.get(max_faulty)
            .map_or(0, |sequence| sequence.saturating_sub(1))
    }

    /// Get the first candidate vote queued by the operator that would change the validator set and that
    /// this replica has not cast yet in the current epoch.
    fn pending_vote(&self) -> Option<ValidatorVote> {
        let head = self.snapshots.head();
        let candidates = self
            .candidates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        candidates
            .iter()
            .find(|(candidate, authorize)| {
                **authorize != head.validators.contains(candidate)
                    && !self.snapshots.has_voted(&self.me, candidate, **authorize)
            })
            .map(|(candidate, authorize)| ValidatorVote {
                candidate: *candidate,
                authorize: *authorize,
            })
    }

    /// Get the duration of `round`: the base round timeout, doubled for every round up to
    /// [`MAX_ROUND_TIMEOUT_EXPONENT`].
    fn round_timeout(&self, round: u64) -> Duration {
        let exponent = min(round, MAX_ROUND_TIMEOUT_EXPONENT as u64) as u32;
        self.config
            .base_round_timeout
            .saturating_mul(2u32.pow(exponent))
    }
}

/// Configuration parameters for the [`Ibft`] struct.
#[derive(Clone)]
pub(crate) struct IbftConfiguration {
    /// The Chain ID of the blockchain that the current replica is to track.
    pub(crate) chain_id: ChainID,

    /// The keypair with which the replica signs its messages.
    pub(crate) keypair: Keypair,

    /// The duration of round 0.
    pub(crate) base_round_timeout: Duration,
}

/// The different ways a call to a method of the `Ibft` struct can fail.
#[derive(Debug)]
pub enum IbftError {
    ConfigError(ConfigError),
    SnapshotStoreError(SnapshotStoreError),
    BlockchainError(BlockchainError),

    /// The blockchain's head is above this number, but it has no block with this number.
    MissingBlock(u64),
}

impl From<ConfigError> for IbftError {
    fn from(value: ConfigError) -> Self {
        IbftError::ConfigError(value)
    }
}

impl From<SnapshotStoreError> for IbftError {
    fn from(value: SnapshotStoreError) -> Self {
        IbftError::SnapshotStoreError(value)
    }
}

impl From<BlockchainError> for IbftError {
    fn from(value: BlockchainError) -> Self {
        IbftError::BlockchainError(value)
    }
}

/// The ways in which a proposal can be rejected. A rejected proposal makes the replica ask for a
/// round change.
#[derive(Debug)]
pub enum ValidationError {
    IncorrectHash,
    IncorrectDataHash,
    WrongNumber { expected: u64, got: u64 },
    WrongParent,

    /// The header names someone other than the proposer of the view.
    WrongProposer,
    RejectedByBlockchain(BlockchainError),
    InvalidJustification,

    /// The replica is locked on a different block, and the proposal is not justified by a more recent
    /// prepared certificate.
    ConflictsWithLock { locked: CryptoHash },
}

/// Failure to write a finalized block. The replica asks for a round change of the same sequence.
#[derive(Debug)]
pub enum CommitError {
    WriteFailed { view: View, error: BlockchainError },
}
