// SPDX-License-Identifier: MIT

use super::{Dispatcher, Envelope};
use crate::base::error::DispatchError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// In-process transport. Envelopes are moved, never copied or encoded.
#[derive(Clone)]
pub struct LocalDispatcher {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl LocalDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn send(&self, envelope: Envelope) -> Result<(), DispatchError> {
        log::debug!("local dispatch -> {}", envelope.address);
        self.sender.send(envelope).map_err(|_| DispatchError::Closed)
    }
}
