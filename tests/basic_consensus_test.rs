/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{thread, time::Duration};

use ibft_rs::types::{data_types::EpochSize, validator_set::ValidatorSet};
use log::LevelFilter;

mod common;

use crate::common::{
    logging::setup_logger,
    mem_chain::SharedLedger,
    network::{mock_network, Faults},
    node::{address, assert_gap_free, assert_same_chain, signing_keys, wait_until, Node},
};

#[test]
fn basic_consensus_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Initialize test components.

    // 1.1. Create signing keys for 4 replicas.
    let keys = signing_keys(4);

    // 1.2. Create a reliable mock network connecting the 4 replicas.
    let network_stubs = mock_network(keys.iter().map(address), Faults::none());

    // 1.3. Make every replica a validator.
    let validators: ValidatorSet = keys.iter().map(address).collect();

    // 1.4. Simultaneously start all replicas.
    let ledger = SharedLedger::new();
    let nodes: Vec<Node> = keys
        .into_iter()
        .zip(network_stubs)
        .map(|(key, network)| {
            Node::new(
                key,
                network,
                validators.clone(),
                ledger.clone(),
                EpochSize::new(1000),
            )
        })
        .collect();

    // 2. Wait until every replica finalized 10 blocks.
    log::debug!("Polling every replica until its head is at least 10.");
    wait_until(Duration::from_secs(60), "every head is at least 10", || {
        nodes.iter().all(|node| node.head_number() >= 10)
    });

    // 3. Check that every replica has the same sealed blocks, and announced them in order. Blocks are
    //    announced right after they are written.
    thread::sleep(Duration::from_millis(500));
    assert_same_chain(&nodes, 10);
    for node in &nodes {
        let finalized = node.take_finalized_blocks();
        assert!(finalized.len() >= 10);
        assert_gap_free(&finalized, 0);
        assert_eq!(node.validators(), validators);
    }
}

#[test]
fn silent_validator_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Create 4 validators, but only start 3 of them. Every fourth view has a silent proposer.
    let keys = signing_keys(4);
    let validators: ValidatorSet = keys.iter().map(address).collect();
    let network_stubs = mock_network(keys.iter().map(address), Faults::none());

    let ledger = SharedLedger::new();
    let nodes: Vec<Node> = keys
        .into_iter()
        .zip(network_stubs)
        .skip(1)
        .map(|(key, network)| {
            Node::new(
                key,
                network,
                validators.clone(),
                ledger.clone(),
                EpochSize::new(1000),
            )
        })
        .collect();

    // 2. The 3 live validators form a quorum on their own, and round changes skip the silent proposer.
    log::debug!("Polling the 3 live replicas until their heads are at least 8.");
    wait_until(Duration::from_secs(120), "every live head is at least 8", || {
        nodes.iter().all(|node| node.head_number() >= 8)
    });

    assert_same_chain(&nodes, 8);
    for node in &nodes {
        assert_gap_free(&node.take_finalized_blocks(), 0);
    }
}
