//! In-memory transport
//!
//! Two connected endpoints backed by tokio channels. Used for the device
//! simulator in tests and for driving a session without hardware.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use super::Transport;
use crate::error::TransportError;

const CHANNEL_CAPACITY: usize = 1000;

/// One end of an in-memory duplex channel
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create two connected endpoints
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }

    /// Non-blocking receive, `None` when nothing is queued
    pub fn try_receive(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(bytes.to_vec())
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
