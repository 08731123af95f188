/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-sequence bookkeeping of the IBFT protocol: the proposal of the current round, the votes
//! collected so far, and the replica's lock.
//!
//! Votes are kept per round and, within a round, per sender. The first message of a given type from
//! a given sender in a given round is the one that counts; later ones are ignored. Since every map is
//! ordered, applying the same set of messages in any order yields the same state and the same
//! certificates.
//!
//! `RoundChange`s are kept differently: only the highest round each sender asked for is stored, and
//! a sender counts towards every round up to it. This keeps the round-change state at one entry per
//! validator however many rounds a faulty validator asks for.

use std::collections::BTreeMap;

use crate::types::{
    block::Block,
    data_types::{Address, CryptoHash, View},
    validator_set::ValidatorSet,
};

use super::{
    messages::MessageType,
    types::{CommitSeal, PreparedCertificate, PreparedProposal, SignedVote},
};

/// A `Preprepare`, `Prepare`, or `Commit` vote as stored in the [`RoundState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Vote {
    pub(crate) msg_type: MessageType,
    pub(crate) digest: CryptoHash,
    pub(crate) signed: SignedVote,
}

pub(crate) struct RoundState {
    sequence: u64,
    round: u64,
    validators: ValidatorSet,
    proposal: Option<Block>,
    locked: Option<PreparedProposal>,
    commit_sent: bool,
    prepares: BTreeMap<u64, BTreeMap<Address, Vote>>,
    commits: BTreeMap<u64, BTreeMap<Address, Vote>>,
    round_changes: BTreeMap<Address, RoundChange>,
}

/// The highest `RoundChange` received from a sender in the current sequence.
struct RoundChange {
    round: u64,
    prepared: Option<PreparedProposal>,
}

impl RoundState {
    pub(crate) fn new(sequence: u64, validators: ValidatorSet) -> RoundState {
        RoundState {
            sequence,
            round: 0,
            validators,
            proposal: None,
            locked: None,
            commit_sent: false,
            prepares: BTreeMap::new(),
            commits: BTreeMap::new(),
            round_changes: BTreeMap::new(),
        }
    }

    /// Start a new sequence: forget every vote, the proposal, and the lock.
    pub(crate) fn reset(&mut self, sequence: u64, validators: ValidatorSet) {
        *self = RoundState::new(sequence, validators)
    }

    /// Move to `round` of the current sequence.
    ///
    /// Votes and `RoundChange`s for rounds below `round` are dropped. The lock is kept.
    pub(crate) fn start_round(&mut self, round: u64) {
        self.round = round;
        self.proposal = None;
        self.commit_sent = false;
        self.prepares = self.prepares.split_off(&round);
        self.commits = self.commits.split_off(&round);
        self.round_changes.retain(|_, round_change| round_change.round >= round);
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn round(&self) -> u64 {
        self.round
    }

    pub(crate) fn view(&self) -> View {
        View::new(self.sequence, self.round)
    }

    pub(crate) fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// Get the block accepted in the current round, if any.
    pub(crate) fn proposal(&self) -> Option<&Block> {
        self.proposal.as_ref()
    }

    pub(crate) fn set_proposal(&mut self, block: Block) {
        self.proposal = Some(block)
    }

    pub(crate) fn locked(&self) -> Option<&PreparedProposal> {
        self.locked.as_ref()
    }

    pub(crate) fn lock(&mut self, prepared: PreparedProposal) {
        self.locked = Some(prepared)
    }

    pub(crate) fn commit_sent(&self) -> bool {
        self.commit_sent
    }

    pub(crate) fn mark_commit_sent(&mut self) {
        self.commit_sent = true
    }

    /// Record a prepare vote (a `Preprepare` from the proposer, or a `Prepare`) from `sender` in
    /// `round`. Returns whether the vote was new.
    pub(crate) fn add_prepare(&mut self, round: u64, sender: Address, vote: Vote) -> bool {
        insert_first(self.prepares.entry(round).or_default(), sender, vote)
    }

    /// Record a `Commit` vote from `sender` in `round`. Returns whether the vote was new.
    pub(crate) fn add_commit(&mut self, round: u64, sender: Address, vote: Vote) -> bool {
        insert_first(self.commits.entry(round).or_default(), sender, vote)
    }

    /// Record a `RoundChange` to `round` from `sender`. Returns whether it replaced the sender's
    /// previous one, that is, whether `round` is higher than any round the sender asked for before.
    pub(crate) fn add_round_change(
        &mut self,
        round: u64,
        sender: Address,
        prepared: Option<PreparedProposal>,
    ) -> bool {
        if self
            .round_changes
            .get(&sender)
            .is_some_and(|round_change| round_change.round >= round)
        {
            return false;
        }
        self.round_changes.insert(sender, RoundChange { round, prepared });
        true
    }

    /// Check whether a quorum of prepare votes for the current proposal was collected in the current
    /// round.
    pub(crate) fn has_quorum_prepares(&self) -> bool {
        self.matching_votes(&self.prepares).len() >= self.validators.quorum_size()
    }

    /// Check whether a quorum of `Commit` votes for the current proposal was collected in the current
    /// round.
    pub(crate) fn has_quorum_commits(&self) -> bool {
        self.matching_votes(&self.commits).len() >= self.validators.quorum_size()
    }

    /// Check whether a quorum of validators asked to move to `round` or past it.
    pub(crate) fn has_quorum_round_change(&self, round: u64) -> bool {
        self.round_changes_reaching(round).count() >= self.validators.quorum_size()
    }

    /// Get the highest round above `above` that at least `threshold` distinct validators have asked to
    /// move to or past.
    pub(crate) fn round_with_weak_support(&self, above: u64, threshold: usize) -> Option<u64> {
        if threshold == 0 {
            return None;
        }

        let mut rounds: Vec<u64> = self
            .round_changes_reaching(above + 1)
            .map(|round_change| round_change.round)
            .collect();
        rounds.sort_unstable_by(|a, b| b.cmp(a));
        rounds.get(threshold - 1).copied()
    }

    /// Build a [`PreparedCertificate`] for the current proposal from the prepare votes of the current
    /// round, if there is a quorum of them.
    pub(crate) fn prepared_certificate(&self) -> Option<PreparedCertificate> {
        let proposal = self.proposal.as_ref()?;
        if !self.has_quorum_prepares() {
            return None;
        }
        let votes = self.matching_votes(&self.prepares);

        Some(PreparedCertificate {
            view: self.view(),
            digest: proposal.hash(),
            votes: votes
                .into_iter()
                .map(|vote| (vote.msg_type, vote.signed))
                .collect(),
        })
    }

    /// Build a [`CommitSeal`] for the current proposal from the `Commit` votes of the current round, if
    /// there is a quorum of them.
    pub(crate) fn commit_seal(&self) -> Option<CommitSeal> {
        if !self.has_quorum_commits() {
            return None;
        }
        let votes = self.matching_votes(&self.commits);

        Some(CommitSeal {
            view: self.view(),
            signatures: votes.into_iter().map(|vote| vote.signed).collect(),
        })
    }

    /// Get the prepared proposal with the highest round among the replica's own lock and those carried
    /// by the `RoundChange` messages for `round` or later.
    ///
    /// Only proposals prepared before `round` can justify a proposal in `round`.
    pub(crate) fn highest_prepared(&self, round: u64) -> Option<PreparedProposal> {
        let carried = self
            .round_changes_reaching(round)
            .filter_map(|round_change| round_change.prepared.as_ref())
            .filter(|prepared| prepared.round() < round);

        let mut highest = self.locked.as_ref();
        for prepared in carried {
            if highest.map_or(true, |highest| prepared.round() > highest.round()) {
                highest = Some(prepared);
            }
        }
        highest.cloned()
    }

    /// Get the stored `RoundChange`s that asked for `round` or a later round.
    fn round_changes_reaching(&self, round: u64) -> impl Iterator<Item = &RoundChange> {
        self.round_changes
            .values()
            .filter(move |round_change| round_change.round >= round)
    }

    /// Get the number of senders with a stored `RoundChange`.
    #[cfg(test)]
    pub(crate) fn round_change_senders(&self) -> usize {
        self.round_changes.len()
    }

    /// Get the votes of the current round whose digest matches the current proposal, in sender order.
    fn matching_votes<'a>(
        &'a self,
        votes: &'a BTreeMap<u64, BTreeMap<Address, Vote>>,
    ) -> Vec<&'a Vote> {
        let Some(proposal) = &self.proposal else {
            return Vec::new();
        };
        let digest = proposal.hash();
        votes
            .get(&self.round)
            .into_iter()
            .flat_map(|senders| senders.values())
            .filter(|vote| vote.digest == digest)
            .collect()
    }
}

fn insert_first<V>(map: &mut BTreeMap<Address, V>, sender: Address, value: V) -> bool {
    if map.contains_key(&sender) {
        return false;
    }
    map.insert(sender, value);
    true
}
