/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the network.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    ibft::messages::{IbftMessage, MessageType},
    types::data_types::{BufferSize, ChainID, View},
};

use super::network::NetworkReceiver;

/// How long the poller sleeps when the network has nothing to hand over.
const POLLER_IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Spawn the poller thread, which polls the [`NetworkReceiver`] for messages, drops those that are not
/// correctly signed, and forwards the rest to the algorithm thread.
pub(crate) fn start_polling<R: NetworkReceiver>(
    mut network: R,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<IbftMessage>) {
    let (to_msg_receiver, msg_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        if let Some(msg) = network.recv() {
            match msg.is_correctly_signed() {
                Ok(()) => {
                    if to_msg_receiver.send(msg).is_err() {
                        return;
                    }
                }
                Err(err) => log::debug!(
                    "Dropped {:?} message from {} in view {}: {:?}",
                    msg.msg_type(),
                    msg.sender,
                    msg.view,
                    err
                ),
            }
        } else {
            thread::sleep(POLLER_IDLE_SLEEP)
        }
    });

    (poller_thread, msg_receiver)
}

/// A receiving end for [`IbftMessage`]s.
///
/// ## View-aware buffering
///
/// `MessageStub` inspects incoming messages' views to decide whether to:
/// 1. Return it from `recv` for immediate processing.
/// 2. Place it in its buffer for processing once the replica reaches its view.
/// 3. Discard it.
///
/// Messages for views lower than the current view are discarded. Messages for the current view are
/// returned. Messages for higher views are returned *and*, if their sequence is at most
/// `look_ahead_sequences` ahead of the current one, cached. Returning them lets the replica notice
/// that the network is ahead of it, and lets it act on `RoundChange`s for later rounds of the current
/// sequence. Caching them gives them a second chance once the replica reaches their view.
///
/// When serving from the buffer, `recv` returns messages for the current view, and `RoundChange`s for
/// later rounds of the current sequence.
///
/// ## Buffer management
///
/// If the buffer grows beyond its capacity, messages for the highest views are removed first.
pub(crate) struct MessageStub {
    receiver: Receiver<IbftMessage>,
    msg_buffer: MessageBuffer,
    look_ahead_sequences: u64,
}

impl MessageStub {
    pub(crate) fn new(
        receiver: Receiver<IbftMessage>,
        msg_buffer_capacity: BufferSize,
        look_ahead_sequences: u64,
    ) -> MessageStub {
        Self {
            receiver,
            msg_buffer: MessageBuffer::new(msg_buffer_capacity),
            look_ahead_sequences,
        }
    }

    /// Receive a message for `chain_id` with a view greater than or equal to `cur_view`, waiting until
    /// `deadline` at the latest.
    pub(crate) fn recv(
        &mut self,
        chain_id: ChainID,
        cur_view: View,
        deadline: Instant,
    ) -> Result<IbftMessage, MessageReceiveError> {
        // Clear buffer of messages with views lower than the current one.
        self.msg_buffer.remove_expired_msgs(cur_view);

        if let Some(msg) = self.msg_buffer.get_msg(cur_view) {
            return Ok(msg);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(MessageReceiveError::Timeout);
        }

        match self.receiver.recv_timeout(deadline - now) {
            Ok(msg) => {
                if let Err(err) = msg.check_chain(chain_id) {
                    log::debug!("Dropped message from {}: {:?}", msg.sender, err);
                    return Err(MessageReceiveError::Dropped);
                }

                if msg.view < cur_view {
                    return Err(MessageReceiveError::Dropped);
                }

                if msg.view > cur_view
                    && msg.view.sequence <= cur_view.sequence.saturating_add(self.look_ahead_sequences)
                {
                    self.msg_buffer.insert(msg.clone());
                }

                Ok(msg)
            }
            Err(RecvTimeoutError::Timeout) => Err(MessageReceiveError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(MessageReceiveError::Disconnected),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MessageReceiveError {
    /// A message arrived but was not for this replica's chain or current view.
    Dropped,
    Timeout,
    Disconnected,
}

/// Message buffer intended for storing received [`IbftMessage`]s for future views.
///
/// Its size is bounded by its capacity, and when the capacity is reached messages for highest views may
/// be removed.
struct MessageBuffer {
    buffer_capacity: BufferSize,
    buffer: BTreeMap<View, VecDeque<IbftMessage>>,
    buffer_size: BufferSize,
}

impl MessageBuffer {
    fn new(buffer_capacity: BufferSize) -> Self {
        Self {
            buffer_capacity,
            buffer: BTreeMap::new(),
            buffer_size: BufferSize::new(0),
        }
    }

    /// Try inserting the message into the buffer.
    ///
    /// If caching the message would make the buffer grow beyond its capacity, then either:
    /// 1. The message has the highest view among the buffered messages, and is dropped, or
    /// 2. Just enough highest-viewed messages are removed from the buffer to make space for it.
    ///
    /// Returns whether the message was inserted.
    fn insert(&mut self, msg: IbftMessage) -> bool {
        let bytes_requested = msg.size();
        if bytes_requested > self.buffer_capacity.int() {
            return false;
        }

        let buffer_will_be_overloaded = self
            .buffer_size
            .int()
            .checked_add(bytes_requested)
            .map_or(true, |new_size| new_size > self.buffer_capacity.int());

        if buffer_will_be_overloaded {
            let is_lower_than_max = self
                .buffer
                .keys()
                .next_back()
                .is_some_and(|max_view| msg.view < *max_view);
            if !is_lower_than_max {
                return false;
            }
            self.remove_highest_viewed_msgs(bytes_requested);
        }

        self.buffer_size += bytes_requested;
        self.buffer.entry(msg.view).or_default().push_back(msg);
        true
    }

    /// Remove and return the oldest message for `cur_view`, or failing that, the oldest `RoundChange` for
    /// a later round of the same sequence.
    fn get_msg(&mut self, cur_view: View) -> Option<IbftMessage> {
        let next_sequence = cur_view.next_sequence();
        let (view, position) = self
            .buffer
            .range(cur_view..next_sequence)
            .find_map(|(view, msg_queue)| {
                if *view == cur_view {
                    (!msg_queue.is_empty()).then_some((*view, 0))
                } else {
                    msg_queue
                        .iter()
                        .position(|msg| msg.msg_type() == MessageType::RoundChange)
                        .map(|position| (*view, position))
                }
            })?;

        let msg_queue = self.buffer.get_mut(&view)?;
        let msg = msg_queue.remove(position)?;
        if msg_queue.is_empty() {
            self.buffer.remove(&view);
        }
        self.buffer_size -= msg.size();
        Some(msg)
    }

    /// Remove just enough highest-viewed messages to free up (at least) `bytes_to_remove` bytes.
    fn remove_highest_viewed_msgs(&mut self, bytes_to_remove: u64) {
        let mut bytes_removed = 0;
        while bytes_removed < bytes_to_remove {
            let Some(mut entry) = self.buffer.last_entry() else {
                break;
            };
            if let Some(msg) = entry.get_mut().pop_back() {
                bytes_removed += msg.size();
            }
            if entry.get().is_empty() {
                entry.remove();
            }
        }
        self.buffer_size -= bytes_removed;
    }

    /// Remove all messages for views less than the current view.
    fn remove_expired_msgs(&mut self, cur_view: View) {
        let kept = self.buffer.split_off(&cur_view);
        let removed: u64 = self
            .buffer
            .values()
            .flat_map(|msg_queue| msg_queue.iter())
            .map(|msg| msg.size())
            .sum();
        self.buffer_size -= removed;
        self.buffer = kept;
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use crate::{
        ibft::messages::Payload,
        types::{
            crypto_primitives::{Keypair, SigningKey},
            data_types::CryptoHash,
        },
    };

    use super::*;

    fn prepare(keypair: &Keypair, chain_id: u64, view: View) -> IbftMessage {
        IbftMessage::new(
            keypair,
            ChainID::new(chain_id),
            view,
            Payload::Prepare {
                digest: CryptoHash::new([1; 32]),
            },
        )
    }

    fn round_change(keypair: &Keypair, view: View) -> IbftMessage {
        IbftMessage::new(
            keypair,
            ChainID::new(0),
            view,
            Payload::RoundChange { prepared: None },
        )
    }

    #[test]
    fn buffer_evicts_highest_views_first() {
        let keypair = Keypair::new(SigningKey::generate(&mut OsRng));
        let size = prepare(&keypair, 0, View::new(3, 0)).size();
        let mut buffer = MessageBuffer::new(BufferSize::new(2 * size));

        assert!(buffer.insert(prepare(&keypair, 0, View::new(3, 0))));
        assert!(buffer.insert(prepare(&keypair, 0, View::new(5, 0))));

        // Full: a message for a lower view pushes out the highest one.
        assert!(buffer.insert(prepare(&keypair, 0, View::new(4, 0))));
        assert_eq!(buffer.buffer_size.int(), 2 * size);
        assert!(buffer.get_msg(View::new(5, 0)).is_none());

        // Full: a message for a view higher than everything buffered is dropped.
        assert!(!buffer.insert(prepare(&keypair, 0, View::new(6, 0))));

        assert!(buffer.get_msg(View::new(3, 0)).is_some());
        assert!(buffer.get_msg(View::new(4, 0)).is_some());
        assert_eq!(buffer.buffer_size.int(), 0);
    }

    #[test]
    fn buffer_serves_later_round_changes_of_the_current_sequence() {
        let keypair = Keypair::new(SigningKey::generate(&mut OsRng));
        let mut buffer = MessageBuffer::new(BufferSize::new(u64::MAX));

        buffer.insert(prepare(&keypair, 0, View::new(2, 3)));
        buffer.insert(round_change(&keypair, View::new(2, 3)));
        buffer.insert(round_change(&keypair, View::new(3, 1)));

        let msg = buffer.get_msg(View::new(2, 0)).unwrap();
        assert_eq!(msg.msg_type(), MessageType::RoundChange);
        assert_eq!(msg.view, View::new(2, 3));
        assert!(buffer.get_msg(View::new(2, 0)).is_none());

        buffer.remove_expired_msgs(View::new(3, 0));
        assert_eq!(buffer.buffer.len(), 1);
        assert!(buffer.get_msg(View::new(3, 0)).is_some());
    }

    #[test]
    fn stub_drops_past_views_and_other_chains() {
        let keypair = Keypair::new(SigningKey::generate(&mut OsRng));
        let (sender, receiver) = mpsc::channel();
        let mut stub = MessageStub::new(receiver, BufferSize::new(u64::MAX), 2);
        let cur_view = View::new(2, 1);
        let deadline = || Instant::now() + Duration::from_millis(50);

        sender.send(prepare(&keypair, 0, View::new(2, 0))).unwrap();
        sender.send(prepare(&keypair, 1, cur_view)).unwrap();
        sender.send(prepare(&keypair, 0, View::new(3, 0))).unwrap();
        sender.send(prepare(&keypair, 0, View::new(9, 0))).unwrap();
        sender.send(prepare(&keypair, 0, cur_view)).unwrap();

        let chain_id = ChainID::new(0);
        assert_eq!(
            stub.recv(chain_id, cur_view, deadline()),
            Err(MessageReceiveError::Dropped)
        );
        assert_eq!(
            stub.recv(chain_id, cur_view, deadline()),
            Err(MessageReceiveError::Dropped)
        );
        // Future messages are returned so that the replica can observe them.
        assert_eq!(stub.recv(chain_id, cur_view, deadline()).unwrap().view, View::new(3, 0));
        assert_eq!(stub.recv(chain_id, cur_view, deadline()).unwrap().view, View::new(9, 0));
        assert_eq!(stub.recv(chain_id, cur_view, deadline()).unwrap().view, cur_view);
        assert_eq!(
            stub.recv(chain_id, cur_view, deadline()),
            Err(MessageReceiveError::Timeout)
        );

        // Only the message within the look-ahead window was cached.
        assert_eq!(
            stub.recv(chain_id, View::new(3, 0), deadline()).unwrap().view,
            View::new(3, 0)
        );
        assert_eq!(
            stub.recv(chain_id, View::new(9, 0), deadline()),
            Err(MessageReceiveError::Timeout)
        );
    }
}
