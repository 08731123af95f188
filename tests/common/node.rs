/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    sync::mpsc::Receiver,
    thread,
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use ibft_rs::{
    events::{FinalizeBlockEvent, RoundChangeEvent, StartSyncEvent, UpdateValidatorSetEvent},
    replica::{Configuration, Replica, ReplicaSpec},
    snapshot::{pluggables::KVGet, types::Snapshot},
    types::{
        block::Block,
        crypto_primitives::address_of,
        data_types::{Address, BufferSize, ChainID, EpochSize, VerifyingKeyBytes},
        validator_set::ValidatorSet,
    },
};

use super::{
    logging::{first_seven_base64_chars, log_with_context},
    mem_chain::{genesis, MemChain, SharedLedger},
    mem_db::MemDB,
    network::{NetworkInbox, NetworkStub},
};

pub(crate) const CHAIN_ID: ChainID = ChainID::new(0);

/// Things the Nodes will have in common:
/// - Genesis block and initial Validator Set.
/// - Configuration (besides the keypair).
/// - Shared ledger, used for sync.
///
/// Things that they will differ in:
/// - Chain.
/// - Network stub.
/// - KVStore.
/// - Keypair.
pub(crate) struct Node {
    address: Address,
    verifying_key: VerifyingKeyBytes,
    chain: MemChain,
    finalized_blocks: Receiver<Block>,
    kv_store: MemDB,
    replica: Replica<MemDB>,
}

impl Node {
    pub(crate) fn new(
        keypair: SigningKey,
        (network_sender, network_receiver): (NetworkStub, NetworkInbox),
        initial_validators: ValidatorSet,
        ledger: SharedLedger,
        epoch_size: EpochSize,
    ) -> Node {
        let kv_store = MemDB::new();
        let genesis = genesis();
        Replica::initialize(kv_store.clone(), &genesis.header, initial_validators).unwrap();

        let address = address_of(&keypair.verifying_key());
        let verifying_key = keypair.verifying_key().to_bytes();
        let chain = MemChain::new(genesis, ledger);

        let configuration = Configuration::builder()
            .me(keypair)
            .chain_id(CHAIN_ID)
            .epoch_size(epoch_size)
            .base_round_timeout(Duration::from_millis(300))
            .msg_buffer_capacity(BufferSize::new(1024 * 1024))
            .log_events(false)
            .build();

        let mut replica = ReplicaSpec::builder()
            .blockchain(chain.clone())
            .kv_store(kv_store.clone())
            .network_sender(network_sender)
            .network_receiver(network_receiver)
            .configuration(configuration)
            .on_finalize_block(finalize_block_handler(address))
            .on_round_change(round_change_handler(address))
            .on_start_sync(start_sync_handler(address))
            .on_update_validator_set(update_validator_set_handler(address))
            .build()
            .start()
            .unwrap();
        let finalized_blocks = replica.finalized_blocks().unwrap();

        Node {
            address,
            verifying_key,
            chain,
            finalized_blocks,
            kv_store,
            replica,
        }
    }

    pub(crate) fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn verifying_key_bytes(&self) -> VerifyingKeyBytes {
        self.verifying_key
    }

    pub(crate) fn head_number(&self) -> u64 {
        self.chain.head_number()
    }

    pub(crate) fn block(&self, number: u64) -> Option<Block> {
        self.chain.block(number)
    }

    /// Get the validator set that votes on the block after the head.
    pub(crate) fn validators(&self) -> ValidatorSet {
        self.validators_at(self.head_number() + 1)
    }

    /// Get the validator set that votes on block number `sequence`.
    pub(crate) fn validators_at(&self, sequence: u64) -> ValidatorSet {
        self.replica
            .snapshot_store()
            .validators_for(sequence)
            .unwrap()
    }

    /// Read the snapshot of block `number` back from the node's key-value store, if it was persisted.
    pub(crate) fn persisted_snapshot(&self, number: u64) -> Option<Snapshot> {
        self.kv_store.snapshot(number).unwrap()
    }

    pub(crate) fn propose_candidate(&self, candidate: Address, authorize: bool) {
        self.replica.propose_candidate(candidate, authorize)
    }

    /// Drain the finalized blocks announced so far.
    pub(crate) fn take_finalized_blocks(&self) -> Vec<Block> {
        self.finalized_blocks.try_iter().collect()
    }
}

/// Create `n` signing keys, sorted by the address they derive to.
pub(crate) fn signing_keys(n: usize) -> Vec<SigningKey> {
    let mut csprg = rand_core::OsRng {};
    let mut keys: Vec<SigningKey> = (0..n).map(|_| SigningKey::generate(&mut csprg)).collect();
    keys.sort_by_key(|key| address_of(&key.verifying_key()));
    keys
}

pub(crate) fn address(key: &SigningKey) -> Address {
    address_of(&key.verifying_key())
}

/// Poll `condition` until it holds, panicking if it does not hold within `timeout`.
pub(crate) fn wait_until(timeout: Duration, description: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() > deadline {
            panic!("Timed out waiting until {}", description);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Check that every node has the same block at every height up to `height`, and that each of those
/// blocks carries a seal by the validators that voted on it.
pub(crate) fn assert_same_chain(nodes: &[Node], height: u64) {
    for number in 1..=height {
        let reference = nodes[0].block(number).unwrap();
        for node in &nodes[1..] {
            assert_eq!(
                node.block(number).unwrap().hash(),
                reference.hash(),
                "nodes disagree at height {}",
                number
            );
        }

        let validators = nodes[0].validators_at(number);
        let seal = reference.seal.as_ref().unwrap();
        assert!(seal.is_correct(CHAIN_ID, reference.hash(), &validators));
    }
}

/// Check that `blocks` is a gap-free run of finalized blocks starting right after `after`.
pub(crate) fn assert_gap_free(blocks: &[Block], after: u64) {
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.number(), after + 1 + i as u64);
    }
}

fn finalize_block_handler(node: Address) -> impl Fn(&FinalizeBlockEvent) + Send + 'static {
    move |finalize_block_event: &FinalizeBlockEvent| {
        log_with_context(
            Some(node),
            &format!(
                "Finalized Block, number: {}, view: {}, block hash: {}",
                finalize_block_event.number,
                finalize_block_event.view,
                first_seven_base64_chars(&finalize_block_event.block.bytes())
            ),
        );
    }
}

fn round_change_handler(node: Address) -> impl Fn(&RoundChangeEvent) + Send + 'static {
    move |round_change_event: &RoundChangeEvent| {
        log_with_context(
            Some(node),
            &format!(
                "Round Change, view: {}, prepared round: {:?}",
                round_change_event.view, round_change_event.prepared_round
            ),
        );
    }
}

fn start_sync_handler(node: Address) -> impl Fn(&StartSyncEvent) + Send + 'static {
    move |start_sync_event: &StartSyncEvent| {
        log_with_context(
            Some(node),
            &format!(
                "Start Sync, head: {}, target: {}",
                start_sync_event.head, start_sync_event.target
            ),
        );
    }
}

fn update_validator_set_handler(
    node: Address,
) -> impl Fn(&UpdateValidatorSetEvent) + Send + 'static {
    move |update_validator_set_event: &UpdateValidatorSetEvent| {
        log_with_context(
            Some(node),
            &format!(
                "Updated Validator Set, sequence: {}, size: {}",
                update_validator_set_event.sequence,
                update_validator_set_event.validator_set.len()
            ),
        );
    }
}
