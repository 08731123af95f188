/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The algorithm thread: the driving force of an IBFT-rs replica.
//!
//! The algorithm thread owns the [`Ibft`] state machine and the [`MessageStub`]. It is a loop that:
//! 1. Checks whether the replica is shutting down.
//! 2. Waits for the next message of the current view, but never past the round deadline, nor for more
//!    than [`MAX_WAIT`].
//! 3. Feeds the message (if any) to the state machine.
//! 4. [Ticks](Ibft::tick) the state machine, which fires the round timer and notices blocks that were
//!    written to the blockchain by sync.

use std::{
    cmp::min,
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    blockchain::Blockchain,
    ibft::implementation::{Ibft, IbftError},
    networking::{
        network::NetworkSender,
        receiving::{MessageReceiveError, MessageStub},
    },
    snapshot::pluggables::KVStore,
};

/// The longest the algorithm thread waits for a message before ticking the state machine.
const MAX_WAIT: Duration = Duration::from_millis(10);

pub(crate) struct Algorithm<N: NetworkSender, B: Blockchain, K: KVStore> {
    ibft: Ibft<N, B, K>,
    msg_stub: MessageStub,
    shutdown_signal: Receiver<()>,
}

impl<N: NetworkSender, B: Blockchain, K: KVStore> Algorithm<N, B, K> {
    pub(crate) fn new(
        ibft: Ibft<N, B, K>,
        msg_stub: MessageStub,
        shutdown_signal: Receiver<()>,
    ) -> Self {
        Self {
            ibft,
            msg_stub,
            shutdown_signal,
        }
    }

    /// Start the algorithm thread.
    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || self.execute())
    }

    fn execute(&mut self) {
        if let Err(err) = self.ibft.start() {
            log::error!("Failed to start consensus: {:?}", err);
            return;
        }

        loop {
            // 1. Check whether the replica is shutting down.
            match self.shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            // 2. Wait for a message of the current view.
            let deadline = min(self.ibft.deadline(), Instant::now() + MAX_WAIT);
            let received = self
                .msg_stub
                .recv(self.ibft.chain_id(), self.ibft.current_view(), deadline);

            // 3. Process it.
            let result = match received {
                Ok(msg) => self.ibft.on_receive_msg(msg),
                Err(MessageReceiveError::Dropped) | Err(MessageReceiveError::Timeout) => Ok(()),
                Err(MessageReceiveError::Disconnected) => {
                    log::error!("Algorithm thread disconnected from the poller");
                    return;
                }
            };
            if !self.handle(result) {
                return;
            }

            // 4. Tick.
            let result = self.ibft.tick();
            if !self.handle(result) {
                return;
            }
        }
    }

    /// Log an error returned by the state machine. Returns whether the thread should keep running.
    fn handle(&self, result: Result<(), IbftError>) -> bool {
        match result {
            Ok(()) => true,
            Err(IbftError::ConfigError(err)) => {
                log::error!("Stopping consensus: {:?}", err);
                false
            }
            Err(err) => {
                log::error!("{:?}", err);
                true
            }
        }
    }
}
