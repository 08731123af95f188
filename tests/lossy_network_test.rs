/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{thread, time::Duration};

use ibft_rs::types::{block::Block, data_types::EpochSize, validator_set::ValidatorSet};
use log::LevelFilter;

mod common;

use crate::common::{
    logging::setup_logger,
    mem_chain::SharedLedger,
    network::{mock_network, Faults},
    node::{address, assert_gap_free, assert_same_chain, signing_keys, wait_until, Node},
};

const TARGET_HEIGHT: u64 = 100;

#[test]
fn lossy_network_test() {
    setup_logger(LevelFilter::Info);

    // 1. Start 4 validators on a network that loses 5% of messages and delays each by up to 20ms.
    let keys = signing_keys(4);
    let validators: ValidatorSet = keys.iter().map(address).collect();
    let faults = Faults {
        loss: 0.05,
        max_delay: Duration::from_millis(20),
    };
    let network_stubs = mock_network(keys.iter().map(address), faults);

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

    // 2. Wait until every replica finalized 100 blocks.
    wait_until(
        Duration::from_secs(600),
        "every head is at least 100",
        || nodes.iter().all(|node| node.head_number() >= TARGET_HEIGHT),
    );

    // Blocks are announced right after they are written.
    thread::sleep(Duration::from_millis(500));
    let finalized: Vec<Vec<Block>> = nodes
        .iter()
        .map(|node| node.take_finalized_blocks())
        .collect();

    // 3. Safety: no two replicas finalized different blocks at the same height.
    assert_same_chain(&nodes, TARGET_HEIGHT);

    // 4. Every replica announced every block exactly once, in order, whether it finalized the block
    //    through consensus or obtained it through sync.
    for blocks in &finalized {
        assert!(blocks.len() as u64 >= TARGET_HEIGHT);
        assert_gap_free(blocks, 0);
    }
}
