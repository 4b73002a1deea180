// SPDX-License-Identifier: MIT

//! Step dispatch
//!
//! The engine and the step runner talk to each other only through a
//! [`Dispatcher`]. Two transports exist: [`LocalDispatcher`] moves envelopes
//! through an in-process channel, [`WireDispatcher`] encodes them as JSON
//! text first. Both deliver identical envelopes to the receiving side.

mod address;
mod local;
mod wire;

pub use address::Address;
pub use local::LocalDispatcher;
pub use wire::{decode, encode, WireDispatcher};

use crate::base::error::DispatchError;
use crate::base::instance::FlowInstance;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message: an instance delivered to an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub address: Address,
    pub instance: FlowInstance,
    /// Reason attached to messages sent to [`Address::Fail`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Envelope {
    pub fn new(address: Address, instance: FlowInstance) -> Self {
        Self {
            address,
            instance,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Fire-and-forget delivery of envelopes.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<(), DispatchError>;
}
