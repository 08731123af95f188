/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and initialize the storage of a replica.
//!
//! IBFT-rs works to make a set of processes agree on a single chain of blocks. In our terminology,
//! these processes are called 'replicas'. Each replica is uniquely identified by the
//! [`Address`] derived from its [Ed25519 verifying key](ed25519_dalek::VerifyingKey).
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [`ReplicaSpec`],
//! - The function to [start](ReplicaSpec::start) a [`Replica`] given its specification,
//! - The function to [initialize](Replica::initialize) the replica's validator snapshots,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Validators and Observers
//!
//! Not every replica has to vote in consensus. Replicas that are not in the validator set of the
//! current sequence still run the protocol and finalize blocks, but never sign messages. We call them
//! 'observers'. For observers to keep up, the library user's [`NetworkSender`] must broadcast
//! messages to every connected peer, and not only to the validators.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .blockchain(blockchain)
//!     .kv_store(kv_store)
//!     .network_sender(network_sender)
//!     .network_receiver(network_receiver)
//!     .configuration(configuration)
//!     .on_finalize_block(finalize_block_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! The replica's [configuration](Configuration) can also be defined using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .chain_id(ChainID::new(0))
//!     .base_round_timeout(Duration::from_secs(2))
//!     .msg_buffer_capacity(BufferSize::new(1024 * 1024))
//!     .log_events(true)
//!     .build()
//! ```
//!
//! ## Validator set changes
//!
//! A validator operator can [propose](Replica::propose_candidate) adding or removing a validator. When
//! the replica next proposes a block, it casts a vote for one such candidate in the block's header.
//! Votes are tallied when the last block of an epoch is finalized: if more than half of the validators
//! voted the same way about a candidate, the change applies from the first block of the next epoch.
//! All votes are then discarded.

use std::{
    collections::BTreeMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::{
    algorithm::Algorithm,
    blockchain::Blockchain,
    event_bus::*,
    events::*,
    ibft::implementation::{Ibft, IbftConfiguration},
    networking::{
        network::{NetworkReceiver, NetworkSender},
        receiving::{start_polling, MessageStub},
        sending::SenderHandle,
    },
    snapshot::{
        pluggables::KVStore,
        store::{SnapshotStore, SnapshotStoreError},
    },
    types::{
        block::{Block, Header},
        crypto_primitives::Keypair,
        data_types::{Address, BufferSize, ChainID, EpochSize},
        validator_set::ValidatorSet,
    },
};

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's [keypair](ed25519_dalek::SigningKey).
/// 2. The [chain ID](ChainID) of the target blockchain.
/// 3. The epoch size: the number of blocks after which pending validator votes are discarded and a
///    snapshot is persisted.
/// 4. The base round timeout: the duration of round 0, which doubles with every further round.
/// 5. The message buffer capacity: the maximum number of bytes of messages for future views that the
///    replica keeps. Messages for the highest views are evicted first.
/// 6. The look-ahead: how many sequences ahead of the current one a message may be and still be
///    buffered.
/// 7. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Chain ID
///
/// Each IBFT-rs blockchain should be identified by a [chain ID](ChainID). This is included in every
/// signed message so that messages for one blockchain do not get mistaken for those for another.
/// Do not operate a validator in two blockchains with the same chain ID and the same keypair.
///
/// ## Log Events
///
/// IBFT-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.chain_id(...)`
    - `.base_round_timeout(...)`
    - `.msg_buffer_capacity(...)`
    - `.log_events(...)`

    Optional:
    - `.epoch_size(...)`
    - `.look_ahead_sequences(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's keypair, used to sign messages. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the chain ID of the blockchain. Required."))]
    pub chain_id: ChainID,
    #[builder(
        default = EpochSize::new(30_000),
        setter(doc = "Set the number of blocks in an epoch. Optional, defaults to 30,000.")
    )]
    pub epoch_size: EpochSize,
    #[builder(setter(doc = "Set the duration of round 0 of every sequence. Required."))]
    pub base_round_timeout: Duration,
    #[builder(setter(
        doc = "Set the maximum number of bytes that can be stored in the replica's message buffer at any given moment. Required."
    ))]
    pub msg_buffer_capacity: BufferSize,
    #[builder(
        default = 10,
        setter(doc = "Set how many sequences ahead a message may be and still be buffered. Optional, defaults to 10.")
    )]
    pub look_ahead_sequences: u64,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl Configuration {
    fn check(&self) -> Result<(), ConfigError> {
        if self.epoch_size.int() == 0 {
            return Err(ConfigError::InvalidConfiguration(String::from(
                "epoch size must be positive",
            )));
        }
        if self.base_round_timeout.is_zero() {
            return Err(ConfigError::InvalidConfiguration(String::from(
                "base round timeout must be positive",
            )));
        }
        Ok(())
    }
}

/// Parameters of the [`MessageStub`], split out of a [`Configuration`].
struct MessageStubConfiguration {
    msg_buffer_capacity: BufferSize,
    look_ahead_sequences: u64,
}

impl From<Configuration> for (IbftConfiguration, MessageStubConfiguration) {
    fn from(configuration: Configuration) -> Self {
        let ibft_config = IbftConfiguration {
            chain_id: configuration.chain_id,
            keypair: Keypair::new(configuration.me),
            base_round_timeout: configuration.base_round_timeout,
        };
        let msg_stub_config = MessageStubConfiguration {
            msg_buffer_capacity: configuration.msg_buffer_capacity,
            look_ahead_sequences: configuration.look_ahead_sequences,
        };
        (ibft_config, msg_stub_config)
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Replica`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.blockchain(...)`
    - `.kv_store(...)`
    - `.network_sender(...)`
    - `.network_receiver(...)`
    - `.configuration(...)`

    Optional:
    - `.on_propose(...)`
    - `.on_prepare(...)`
    - `.on_commit(...)`
    - `.on_round_change(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_round_change(...)`
    - `.on_start_round(...)`
    - `.on_round_timeout(...)`
    - `.on_lock_proposal(...)`
    - `.on_finalize_block(...)`
    - `.on_update_validator_set(...)`
    - `.on_start_sync(...)`
    - `.on_end_sync(...)`
"))]
pub struct ReplicaSpec<K: KVStore, B: Blockchain, S: NetworkSender, R: NetworkReceiver> {
    // Required parameters
    #[builder(setter(
        doc = "Set the canonical chain that consensus extends. The argument must implement the [Blockchain](crate::blockchain::Blockchain) trait. Required."
    ))]
    blockchain: B,
    #[builder(setter(
        doc = "Set the implementation of the replica's Key-Value store. The argument must implement the [KVStore](crate::snapshot::pluggables::KVStore) trait. Required."
    ))]
    kv_store: K,
    #[builder(setter(
        doc = "Set the sending half of the transport. The argument must implement the [NetworkSender](crate::networking::network::NetworkSender) trait. Required."
    ))]
    network_sender: S,
    #[builder(setter(
        doc = "Set the receiving half of the transport. The argument must implement the [NetworkReceiver](crate::networking::network::NetworkReceiver) trait. Required."
    ))]
    network_receiver: R,
    #[builder(setter(
        doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."
    ))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a prepare. Optional."))]
    on_prepare: Option<HandlerPtr<PrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a commit. Optional."))]
    on_commit: Option<HandlerPtr<CommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RoundChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RoundChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a round change. Optional."))]
    on_round_change: Option<HandlerPtr<RoundChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica accepts a proposal from the proposer of the current view. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveRoundChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveRoundChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a valid round change. Optional."))]
    on_receive_round_change: Option<HandlerPtr<ReceiveRoundChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartRoundEvent>),
    doc = "Register a handler closure to be invoked after the replica starts a round. Optional."))]
    on_start_round: Option<HandlerPtr<StartRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RoundTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RoundTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's round timer fires. Optional."))]
    on_round_timeout: Option<HandlerPtr<RoundTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&LockProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<LockProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica locks on a prepared proposal. Optional."))]
    on_lock_proposal: Option<HandlerPtr<LockProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FinalizeBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FinalizeBlockEvent>),
    doc = "Register a handler closure to be invoked after the replica writes a finalized block. Optional."))]
    on_finalize_block: Option<HandlerPtr<FinalizeBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateValidatorSetEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateValidatorSetEvent>),
    doc = "Register a handler closure to be invoked after the validator set changes. Optional."))]
    on_update_validator_set: Option<HandlerPtr<UpdateValidatorSetEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica stops consensus to sync. Optional."))]
    on_start_sync: Option<HandlerPtr<StartSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica finishes syncing, returning to consensus. Optional."))]
    on_end_sync: Option<HandlerPtr<EndSyncEvent>>,
}

impl<K: KVStore, B: Blockchain, S: NetworkSender, R: NetworkReceiver> ReplicaSpec<K, B, S, R> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [`Replica`] struct.
    ///
    /// Fails if the configuration is invalid, if the snapshots were never [initialized](Replica::initialize)
    /// or cannot be read, or if the validator set of the next sequence is empty.
    pub fn start(mut self) -> Result<Replica<K>, ConfigError> {
        // 1. Check the configuration, and restore the snapshots.
        self.configuration.check()?;
        let snapshots =
            SnapshotStore::load(self.kv_store, self.configuration.epoch_size, &self.blockchain)?;

        let validators = snapshots.validators_for(self.blockchain.head().number + 1)?;
        if validators.is_empty() {
            return Err(ConfigError::EmptyValidatorSet);
        }
        self.network_sender.update_validator_set(validators);

        let log_events = self.configuration.log_events;
        let (ibft_config, msg_stub_config): (IbftConfiguration, MessageStubConfiguration) =
            self.configuration.into();

        // 2. Start the poller.
        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, msgs) = start_polling(self.network_receiver, poller_shutdown_receiver);

        // 3. Start the event bus, if anything listens to events.
        let event_handlers = EventHandlers::new(
            log_events,
            self.on_propose,
            self.on_prepare,
            self.on_commit,
            self.on_round_change,
            self.on_receive_proposal,
            self.on_receive_round_change,
            self.on_start_round,
            self.on_round_timeout,
            self.on_lock_proposal,
            self.on_finalize_block,
            self.on_update_validator_set,
            self.on_start_sync,
            self.on_end_sync,
        );

        let (event_publisher, event_bus, event_bus_shutdown) = if !event_handlers.is_empty() {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus = start_event_bus(
                event_handlers,
                event_subscriber,
                event_bus_shutdown_receiver,
            );
            (Some(event_publisher), Some(event_bus), Some(event_bus_shutdown))
        } else {
            (None, None, None)
        };

        // 4. Start the algorithm thread.
        let candidates = Arc::new(Mutex::new(BTreeMap::new()));
        let (finalized_blocks_sender, finalized_blocks) = mpsc::channel();
        let ibft = Ibft::new(
            ibft_config,
            self.blockchain,
            snapshots.clone(),
            SenderHandle::new(self.network_sender),
            candidates.clone(),
            finalized_blocks_sender,
            event_publisher,
        );
        let msg_stub = MessageStub::new(
            msgs,
            msg_stub_config.msg_buffer_capacity,
            msg_stub_config.look_ahead_sequences,
        );
        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = Algorithm::new(ibft, msg_stub, algorithm_shutdown_receiver).start();

        Ok(Replica {
            snapshots,
            candidates,
            finalized_blocks: Some(finalized_blocks),
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A handle to the background threads of an IBFT-rs replica. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct Replica<K: KVStore> {
    snapshots: SnapshotStore<K>,
    candidates: Arc<Mutex<BTreeMap<Address, bool>>>,
    finalized_blocks: Option<Receiver<Block>>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> Replica<K> {
    /// Persist the genesis snapshot: the initial `validators`, as of the `genesis` header.
    ///
    /// This must be called once, before the first time a replica is started on `kv_store`.
    pub fn initialize(
        kv_store: K,
        genesis: &Header,
        validators: ValidatorSet,
    ) -> Result<(), ConfigError> {
        Ok(SnapshotStore::initialize(kv_store, genesis, validators)?)
    }

    /// Ask the replica to vote for adding (`authorize == true`) or removing (`authorize == false`)
    /// `candidate` in the blocks it proposes.
    ///
    /// Votes that would not change the validator set, or that the replica already cast in the current
    /// epoch, are skipped when proposing.
    pub fn propose_candidate(&self, candidate: Address, authorize: bool) {
        self.lock_candidates().insert(candidate, authorize);
    }

    /// Stop voting about `candidate`.
    pub fn discard_candidate(&self, candidate: &Address) {
        self.lock_candidates().remove(candidate);
    }

    /// Get the candidates the replica currently votes about.
    pub fn candidates(&self) -> BTreeMap<Address, bool> {
        self.lock_candidates().clone()
    }

    /// Returns a handle to the replica's validator snapshots, which can be read from any thread.
    pub fn snapshot_store(&self) -> &SnapshotStore<K> {
        &self.snapshots
    }

    /// Take the stream of finalized blocks.
    ///
    /// Every block after the head at startup is delivered exactly once and in increasing order,
    /// whether it was finalized by consensus or obtained through sync. Returns `None` if the stream was
    /// already taken.
    pub fn finalized_blocks(&mut self) -> Option<Receiver<Block>> {
        self.finalized_blocks.take()
    }

    /// Shut down the replica's threads. Equivalent to dropping it.
    pub fn stop(self) {}

    fn lock_candidates(&self) -> std::sync::MutexGuard<'_, BTreeMap<Address, bool>> {
        self.candidates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: KVStore> Drop for Replica<K> {
    fn drop(&mut self) {
        // The order of thread shutdown in this function is important: the algorithm thread receives
        // messages from the poller, and publishes to the event bus.

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}

/// The ways in which starting a replica can fail.
#[derive(Debug)]
pub enum ConfigError {
    /// The validator set is empty, so no block can ever be finalized.
    EmptyValidatorSet,
    SnapshotStore(SnapshotStoreError),
    InvalidConfiguration(String),
}

impl From<SnapshotStoreError> for ConfigError {
    fn from(value: SnapshotStoreError) -> Self {
        match value {
            SnapshotStoreError::EmptyValidatorSet => ConfigError::EmptyValidatorSet,
            other => ConfigError::SnapshotStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;

    fn configuration() -> Configuration {
        Configuration::builder()
            .me(SigningKey::generate(&mut OsRng))
            .chain_id(ChainID::new(1))
            .base_round_timeout(Duration::from_millis(500))
            .msg_buffer_capacity(BufferSize::new(1024))
            .log_events(false)
            .build()
    }

    #[test]
    fn configuration_defaults_and_checks() {
        let configuration = configuration();
        assert_eq!(configuration.epoch_size, EpochSize::new(30_000));
        assert_eq!(configuration.look_ahead_sequences, 10);
        assert!(configuration.check().is_ok());

        let mut zero_epoch = self::configuration();
        zero_epoch.epoch_size = EpochSize::new(0);
        assert!(matches!(
            zero_epoch.check(),
            Err(ConfigError::InvalidConfiguration(_))
        ));

        let mut zero_timeout = self::configuration();
        zero_timeout.base_round_timeout = Duration::ZERO;
        assert!(matches!(
            zero_timeout.check(),
            Err(ConfigError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn configuration_splits_into_component_configurations() {
        let configuration = configuration();
        let me = Keypair::new(configuration.me.clone()).address();

        let (ibft_config, msg_stub_config): (IbftConfiguration, MessageStubConfiguration) =
            configuration.into();
        assert_eq!(ibft_config.keypair.address(), me);
        assert_eq!(ibft_config.chain_id, ChainID::new(1));
        assert_eq!(ibft_config.base_round_timeout, Duration::from_millis(500));
        assert_eq!(msg_stub_config.msg_buffer_capacity, BufferSize::new(1024));
        assert_eq!(msg_stub_config.look_ahead_sequences, 10);
    }
}
