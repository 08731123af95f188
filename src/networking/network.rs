/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definitions for the two halves of the pluggable transport.

use crate::{ibft::messages::IbftMessage, types::validator_set::ValidatorSet};

/// The sending half of the transport. Used only from the algorithm thread.
pub trait NetworkSender: Clone + Send + 'static {
    /// Inform the transport of the validator set of the sequence the replica is now working on.
    ///
    /// If the set gained members, the transport may want to establish connections to them.
    fn update_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to every validator (including the sender itself) and every connected observer,
    /// without blocking.
    ///
    /// Delivery is best-effort. The protocol tolerates loss, duplication and reordering.
    fn broadcast(&mut self, message: IbftMessage);
}

/// The receiving half of the transport. Owned by the poller thread.
pub trait NetworkReceiver: Send + 'static {
    /// Receive a message from any peer. Returns immediately with `None` if no message is available now.
    fn recv(&mut self) -> Option<IbftMessage>;
}
