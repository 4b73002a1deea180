// SPDX-License-Identifier: MIT

//! Textual transport
//!
//! Envelopes cross this transport as JSON strings, the way they would over a
//! network bus. [`WireDispatcher::channel`] returns a decoded envelope
//! stream so receivers do not care which transport is in use.

use super::{Dispatcher, Envelope};
use crate::base::error::DispatchError;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub fn encode(envelope: &Envelope) -> Result<String, DispatchError> {
    Ok(serde_json::to_string(envelope)?)
}

pub fn decode(frame: &str) -> Result<Envelope, DispatchError> {
    Ok(serde_json::from_str(frame)?)
}

#[derive(Clone)]
pub struct WireDispatcher {
    sender: mpsc::UnboundedSender<String>,
}

impl WireDispatcher {
    /// Raw frame channel.
    pub fn frames() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Frame channel plus a decoding task. Must be called inside a tokio
    /// runtime. Frames that fail to decode are logged and dropped.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (dispatcher, mut frames) = Self::frames();
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                match decode(&frame) {
                    Ok(envelope) => {
                        if sender.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::error!("Dropping undecodable frame: {}", e),
                }
            }
        });

        (dispatcher, receiver)
    }
}

#[async_trait]
impl Dispatcher for WireDispatcher {
    async fn send(&self, envelope: Envelope) -> Result<(), DispatchError> {
        let frame = encode(&envelope)?;
        log::debug!("wire dispatch -> {} ({} bytes)", envelope.address, frame.len());
        self.sender.send(frame).map_err(|_| DispatchError::Closed)
    }
}
