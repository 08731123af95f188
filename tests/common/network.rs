/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A mock network which passes messages between threads using channels, optionally dropping and
//! delaying them.

use std::{
    collections::HashMap,
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    time::{Duration, Instant},
};

use ibft_rs::{
    ibft::messages::IbftMessage,
    networking::network::{NetworkReceiver, NetworkSender},
    types::{data_types::Address, validator_set::ValidatorSet},
};
use rand::Rng;

/// How unreliable the mock network is.
#[derive(Clone, Copy)]
pub(crate) struct Faults {
    /// Probability that a message to a peer (other than the sender itself) is lost.
    pub(crate) loss: f64,

    /// Every message is delivered after a uniformly random delay below this bound.
    pub(crate) max_delay: Duration,
}

impl Faults {
    pub(crate) fn none() -> Faults {
        Faults {
            loss: 0.0,
            max_delay: Duration::ZERO,
        }
    }
}

/// The sending half of a node's connection to the mock network.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    me: Address,
    all_peers: HashMap<Address, Sender<(Instant, IbftMessage)>>,
    faults: Faults,
}

impl NetworkSender for NetworkStub {
    fn update_validator_set(&mut self, _: ValidatorSet) {}

    fn broadcast(&mut self, message: IbftMessage) {
        let mut rng = rand::thread_rng();
        for (peer, inbox) in &self.all_peers {
            if *peer != self.me && self.faults.loss > 0.0 && rng.gen_bool(self.faults.loss) {
                continue;
            }
            let delay = if self.faults.max_delay.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_micros(rng.gen_range(0, self.faults.max_delay.as_micros() as u64))
            };
            let _ = inbox.send((Instant::now() + delay, message.clone()));
        }
    }
}

/// The receiving half of a node's connection to the mock network.
pub(crate) struct NetworkInbox {
    inbox: Receiver<(Instant, IbftMessage)>,
    in_flight: Vec<(Instant, IbftMessage)>,
}

impl NetworkReceiver for NetworkInbox {
    fn recv(&mut self) -> Option<IbftMessage> {
        loop {
            match self.inbox.try_recv() {
                Ok(delivery) => self.in_flight.push(delivery),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let now = Instant::now();
        let position = self
            .in_flight
            .iter()
            .position(|(deliver_at, _)| *deliver_at <= now)?;
        Some(self.in_flight.swap_remove(position).1)
    }
}

/// Connect `peers` with each other, returning one sending and one receiving half per peer, in the
/// order of `peers`.
pub(crate) fn mock_network(
    peers: impl Iterator<Item = Address>,
    faults: Faults,
) -> Vec<(NetworkStub, NetworkInbox)> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(Address, Receiver<(Instant, IbftMessage)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(me, inbox)| {
            (
                NetworkStub {
                    me,
                    all_peers: all_peers.clone(),
                    faults,
                },
                NetworkInbox {
                    inbox,
                    in_flight: Vec::new(),
                },
            )
        })
        .collect()
}
