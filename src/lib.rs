/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of the Istanbul BFT (IBFT) consensus engine, with pluggable blockchain,
//! networking and persistence.
//!
//! IBFT-rs decides, height after height, which block extends a chain, as long as fewer than a third of
//! the validators are faulty. To use it, implement:
//! 1. [`Blockchain`](blockchain::Blockchain): builds, checks and stores blocks.
//! 2. [`NetworkSender`](networking::network::NetworkSender) and
//!    [`NetworkReceiver`](networking::network::NetworkReceiver): carry protocol messages between
//!    replicas.
//! 3. [`KVStore`](snapshot::pluggables::KVStore): persists validator snapshots.
//!
//! Then [initialize](replica::Replica::initialize) the genesis validator set and
//! [start](replica::ReplicaSpec::start) a replica.

pub(crate) mod algorithm;

pub mod blockchain;

pub(crate) mod event_bus;

pub mod events;

pub mod ibft;

pub mod logging;

pub mod networking;

pub mod replica;

pub mod snapshot;

pub mod types;
