/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable transport for [`IbftMessage`](crate::ibft::messages::IbftMessage)s.
//!
//! IBFT-rs does not open sockets or discover peers. The library user provides a
//! [`NetworkSender`](network::NetworkSender) that can broadcast a message to the validator set, and a
//! [`NetworkReceiver`](network::NetworkReceiver) that hands over whatever messages have arrived.

pub mod network;

pub(crate) mod receiving;

pub(crate) mod sending;
