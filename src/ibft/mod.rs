/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for finalizing `Block`s: Istanbul BFT.
//!
//! ## Views
//!
//! IBFT decides one block per *sequence* (block number). Within a sequence, replicas proceed through
//! *rounds*, starting at round 0. A `(sequence, round)` pair is a [`View`](crate::types::data_types::View).
//! Each view has a single proposer: the validator at position `(sequence + round) mod N` of the
//! ordered validator set, N being its size.
//!
//! With N validators, a *quorum* is `floor(2N/3) + 1` of them, and the protocol tolerates
//! `F = floor((N-1)/3)` faulty ones.
//!
//! ## States
//!
//! A replica is always in one of the following [states](types::IbftState):
//! 1. **AcceptBlock**: a round has started and the replica waits for the proposer's
//!    [`Preprepare`](messages::Payload::Preprepare). The proposer of the round broadcasts it on entry.
//! 2. **Validate**: the replica accepted a proposal, broadcast a
//!    [`Prepare`](messages::Payload::Prepare) for it, and collects prepares. The `Preprepare` counts
//!    as the proposer's prepare. On a quorum of prepares, the replica *locks* on the proposal and
//!    broadcasts a [`Commit`](messages::Payload::Commit).
//! 3. **Commit**: a quorum of commits was collected. The replica attaches them to the block as a
//!    [`CommitSeal`](types::CommitSeal), writes it to the blockchain, and starts the next sequence.
//! 4. **RoundChange**: the round timed out or the proposal was invalid. The replica broadcasts a
//!    [`RoundChange`](messages::Payload::RoundChange) for a later round, carrying its lock, and waits
//!    for a quorum to agree on that round.
//! 5. **Sync**: a weak quorum (F+1) of validators is working on a later sequence. The replica stops
//!    taking part in consensus and asks the blockchain to catch up.
//!
//! ## Locking
//!
//! A lock is a [`PreparedProposal`](types::PreparedProposal): a block and the
//! [certificate](types::PreparedCertificate) proving that a quorum prepared it. A locked replica
//! only accepts its locked block, or a block justified by a certificate from a later round. When the
//! replica is the proposer of a later round, it re-proposes the most recently prepared block it
//! knows of. Locks survive round changes and are cleared when the sequence is finalized.
//!
//! ## Round timer
//!
//! The duration of round `r` is `base_round_timeout * 2^min(r, 8)`. If it expires in `AcceptBlock` or
//! `Validate`, the replica asks for round `r + 1`. If it expires in `RoundChange`, the replica asks for
//! the round after the one it was asking for.

pub mod messages;

pub mod types;

pub(crate) mod implementation;

pub(crate) mod roles;

pub(crate) mod round_state;
