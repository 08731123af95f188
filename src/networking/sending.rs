/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the network.

use crate::{ibft::messages::IbftMessage, types::validator_set::ValidatorSet};

use super::network::NetworkSender;

/// Handle for broadcasting [`IbftMessage`]s and announcing validator set changes to the
/// [`NetworkSender`].
#[derive(Clone)]
pub(crate) struct SenderHandle<N: NetworkSender> {
    network: N,
}

impl<N: NetworkSender> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn broadcast(&mut self, msg: IbftMessage) {
        self.network.broadcast(msg)
    }

    pub(crate) fn update_validator_set(&mut self, validator_set: ValidatorSet) {
        self.network.update_validator_set(validator_set)
    }
}
