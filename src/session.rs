//! Request/response coordinator over one shared duplex channel
//!
//! The logue protocol has no request ids, so only one exchange may be in
//! flight at a time. A second caller is turned away with
//! [`SessionError::SessionBusy`] rather than queued, and the channel is not
//! touched on its behalf.
//!
//! Device-initiated notifications (CURRENT PROGRAM CHANGED) that arrive while
//! waiting are forwarded on a side channel and never treated as replies.
//!
//! A request that timed out is remembered until a later exchange completes,
//! and its late replies are discarded instead of being taken for the reply
//! to the next request. Status replies carry nothing to correlate on, so a
//! timed-out request answered by STATUS leaves the session indeterminate.

#[cfg(test)]
mod tests;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{DeviceError, SessionError, TransportError};
use crate::packetizer::{FeedStatus, PacketEnvelope, Packetizer, MAX_PACKET_SIZE};
use crate::sysex::{SlotChunk, SysexHeader, SysexMessage, SYSEX_START};
use crate::transport::{format_hex_brief, Transport};

/// Reply timeout used when the caller has no preference
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

const NOTIFICATION_CAPACITY: usize = 64;
const DRAIN_LIMIT: usize = 256;

/// Observable state of the most recent exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingReply,
    Complete,
    Failed,
    TimedOut,
}

/// Single-flight exchange coordinator owning the transport
pub struct Session<T> {
    transport: tokio::sync::Mutex<T>,
    header: RwLock<SysexHeader>,
    state: Mutex<ExchangeState>,
    indeterminate: AtomicBool,
    stale: Mutex<Option<SysexMessage>>,
    max_packet_size: usize,
    notify_tx: mpsc::Sender<SysexMessage>,
    notify_rx: Mutex<Option<mpsc::Receiver<SysexMessage>>>,
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("header", &*self.header.read())
            .field("state", &*self.state.lock())
            .field("indeterminate", &self.indeterminate.load(Ordering::Acquire))
            .field("max_packet_size", &self.max_packet_size)
            .finish()
    }
}

/// Tracks one exchange; dropping it unfinished means the wait was abandoned
struct InFlight<'a> {
    state: &'a Mutex<ExchangeState>,
    indeterminate: &'a AtomicBool,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn begin(state: &'a Mutex<ExchangeState>, indeterminate: &'a AtomicBool) -> Self {
        *state.lock() = ExchangeState::AwaitingReply;
        Self {
            state,
            indeterminate,
            finished: false,
        }
    }

    fn finish<R>(mut self, result: &Result<R, SessionError>) {
        *self.state.lock() = match result {
            Ok(_) => ExchangeState::Complete,
            Err(SessionError::Timeout(_)) => ExchangeState::TimedOut,
            Err(_) => ExchangeState::Failed,
        };
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Exchange abandoned while awaiting reply, session needs a fresh inquiry");
            *self.state.lock() = ExchangeState::Failed;
            self.indeterminate.store(true, Ordering::Release);
        }
    }
}

/// Requests allowed while the session is indeterminate
fn is_resync(request: &SysexMessage) -> bool {
    matches!(
        request,
        SysexMessage::DeviceInquiryRequest { .. } | SysexMessage::SearchDeviceRequest { .. }
    )
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, header: SysexHeader) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        Self {
            transport: tokio::sync::Mutex::new(transport),
            header: RwLock::new(header),
            state: Mutex::new(ExchangeState::Idle),
            indeterminate: AtomicBool::new(false),
            stale: Mutex::new(None),
            max_packet_size: MAX_PACKET_SIZE,
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        }
    }

    /// Lower the packet limit used for chunked transfers; capped at 4096 bytes
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        if max_packet_size > MAX_PACKET_SIZE {
            warn!(
                "Packet size {} exceeds the {} byte limit, capping",
                max_packet_size, MAX_PACKET_SIZE
            );
        }
        self.max_packet_size = max_packet_size.min(MAX_PACKET_SIZE);
        self
    }

    pub fn header(&self) -> SysexHeader {
        *self.header.read()
    }

    pub fn set_header(&self, header: SysexHeader) {
        *self.header.write() = header;
    }

    /// Switch to the global channel reported by the device
    pub fn set_channel(&self, channel: u8) {
        let mut header = self.header.write();
        *header = SysexHeader::new(channel, header.extended_id);
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn state(&self) -> ExchangeState {
        *self.state.lock()
    }

    /// True after an abandoned or partially completed transfer
    pub fn is_indeterminate(&self) -> bool {
        self.indeterminate.load(Ordering::Acquire)
    }

    /// Receiver for device-initiated notifications; `None` once taken
    pub fn take_notification_receiver(&self) -> Option<mpsc::Receiver<SysexMessage>> {
        self.notify_rx.lock().take()
    }

    /// Send `request` and wait for its correlated reply.
    ///
    /// `timeout` bounds the wait for each reply. USER SLOT DATA REQUEST
    /// collects every packet of the transfer and returns one reassembled
    /// USER SLOT DATA message. USER SLOT DATA is split into packets and each
    /// packet must be acknowledged. No retries are performed.
    pub async fn exchange(
        &self,
        request: &SysexMessage,
        timeout: Duration,
    ) -> Result<SysexMessage, SessionError> {
        let resync = is_resync(request);
        if !resync && self.is_indeterminate() {
            return Err(SessionError::NeedsResync);
        }

        let mut transport = self.transport.try_lock().map_err(|_| {
            debug!("Rejected {}: exchange already in flight", request.name());
            SessionError::SessionBusy
        })?;

        let header = self.header();
        let flight = InFlight::begin(&self.state, &self.indeterminate);

        if resync && self.is_indeterminate() {
            self.drain(&mut *transport).await;
        }

        let result = match request {
            SysexMessage::UserSlotDataRequest { module, slot } => {
                self.fetch(&mut *transport, &header, request, *module, *slot, timeout)
                    .await
            }
            SysexMessage::UserSlotData(chunk) => {
                self.upload(&mut *transport, &header, request, chunk, timeout)
                    .await
            }
            _ => self.single(&mut *transport, &header, request, timeout).await,
        };

        flight.finish(&result);

        match &result {
            Ok(_) => {
                let mut stale = self.stale.lock();
                // A retry of the timed-out request may still see a second reply
                if resync || stale.as_ref() != Some(request) {
                    *stale = None;
                }
            }
            Err(SessionError::Timeout(_)) => {
                if request.expects_ack() {
                    self.mark_indeterminate("acknowledgement never arrived");
                }
                *self.stale.lock() = Some(request.clone());
            }
            Err(_) => {}
        }

        if resync && result.is_ok() && self.indeterminate.swap(false, Ordering::AcqRel) {
            info!("Session resynchronized");
        }

        result
    }

    async fn single(
        &self,
        transport: &mut T,
        header: &SysexHeader,
        request: &SysexMessage,
        timeout: Duration,
    ) -> Result<SysexMessage, SessionError> {
        self.send(transport, &request.encode(header), request).await?;
        self.await_reply(transport, header, request, timeout).await
    }

    async fn fetch(
        &self,
        transport: &mut T,
        header: &SysexHeader,
        request: &SysexMessage,
        module: u8,
        slot: u8,
        timeout: Duration,
    ) -> Result<SysexMessage, SessionError> {
        self.send(transport, &request.encode(header), request).await?;

        let mut transfer = Packetizer::new(*header, self.max_packet_size).transfer(module, slot);
        loop {
            let chunk = match self.await_reply(transport, header, request, timeout).await {
                Ok(SysexMessage::UserSlotData(chunk)) => chunk,
                Ok(other) => {
                    return Err(SessionError::UnexpectedReply {
                        expected: request.name(),
                        received: other.name(),
                    })
                }
                Err(e) => {
                    if transfer.packets_received() > 0 {
                        self.mark_indeterminate("slot data fetch interrupted");
                    }
                    return Err(e);
                }
            };

            match transfer.feed(PacketEnvelope::new(*header, chunk)) {
                Ok(FeedStatus::Pending { received }) => {
                    trace!(
                        "Received {}/{:?} packets ({} bytes)",
                        transfer.packets_received(),
                        transfer.expected_packets(),
                        received
                    );
                }
                Ok(FeedStatus::Complete(data)) => {
                    debug!(
                        "Fetched {} bytes from module {} slot {}",
                        data.len(),
                        module,
                        slot
                    );
                    return Ok(SysexMessage::UserSlotData(SlotChunk {
                        module,
                        slot,
                        sequence: 0,
                        max_sequence: 0,
                        data,
                    }));
                }
                Err(e) => {
                    if transfer.packets_received() > 0 {
                        self.mark_indeterminate("slot data fetch aborted");
                    }
                    return Err(e.into());
                }
            }
        }
    }

    async fn upload(
        &self,
        transport: &mut T,
        header: &SysexHeader,
        request: &SysexMessage,
        chunk: &SlotChunk,
        timeout: Duration,
    ) -> Result<SysexMessage, SessionError> {
        let packets = Packetizer::new(*header, self.max_packet_size).split(
            chunk.module,
            chunk.slot,
            &chunk.data,
        )?;
        let total = packets.len();

        let mut reply = None;
        for (index, packet) in packets.into_iter().enumerate() {
            let message = SysexMessage::UserSlotData(packet.chunk);
            let frame = message.encode(header);

            let step = match self.send(transport, &frame, &message).await {
                Ok(()) => self.await_reply(transport, header, request, timeout).await,
                Err(e) => Err(e),
            };

            match step {
                Ok(ack) => {
                    trace!("Packet {}/{} acknowledged", index + 1, total);
                    reply = Some(ack);
                }
                Err(e) => {
                    if index > 0 {
                        self.mark_indeterminate("slot data upload aborted");
                    }
                    return Err(e);
                }
            }
        }

        debug!(
            "Uploaded {} bytes to module {} slot {} in {} packet(s)",
            chunk.data.len(),
            chunk.module,
            chunk.slot,
            total
        );

        reply.ok_or(SessionError::UnexpectedReply {
            expected: request.name(),
            received: "nothing",
        })
    }

    async fn send(
        &self,
        transport: &mut T,
        frame: &[u8],
        message: &SysexMessage,
    ) -> Result<(), SessionError> {
        transport.send(frame).await?;
        debug!("Sent: {} | {}", format_hex_brief(frame), message);
        Ok(())
    }

    /// Wait for the reply to `request`, forwarding notifications on the way
    async fn await_reply(
        &self,
        transport: &mut T,
        header: &SysexHeader,
        request: &SysexMessage,
        timeout: Duration,
    ) -> Result<SysexMessage, SessionError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Timeout(timeout));
            }

            let bytes = match transport.receive(remaining).await {
                Ok(bytes) => bytes,
                Err(TransportError::Timeout) => return Err(SessionError::Timeout(timeout)),
                Err(e) => return Err(e.into()),
            };

            if bytes.first() != Some(&SYSEX_START) {
                trace!("Ignoring non-sysex message: {}", format_hex_brief(&bytes));
                continue;
            }

            let message = SysexMessage::decode(&bytes, header)?;
            debug!("Received: {} | {}", format_hex_brief(&bytes), message);

            if message.is_notification() {
                self.notify(message);
                continue;
            }

            if self.is_late_reply(&message, request) {
                debug!("Discarding late reply: {}", message);
                continue;
            }

            if let SysexMessage::Status(status) = &message {
                if !status.is_ack() {
                    return Err(DeviceError { code: status.code }.into());
                }
            }

            if message.is_reply_to(request) {
                return Ok(message);
            }

            return Err(SessionError::UnexpectedReply {
                expected: request.name(),
                received: message.name(),
            });
        }
    }

    /// True for a reply to a timed-out request that cannot answer `request`
    fn is_late_reply(&self, message: &SysexMessage, request: &SysexMessage) -> bool {
        if matches!(message, SysexMessage::Status(_)) || message.is_reply_to(request) {
            return false;
        }
        self.stale
            .lock()
            .as_ref()
            .is_some_and(|stale| message.is_reply_to(stale))
    }

    fn notify(&self, message: SysexMessage) {
        match self.notify_tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!("Notification queue full, dropped {}", message);
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                trace!("No notification listener for {}", message);
            }
        }
    }

    /// Discard anything left over from an abandoned transfer
    async fn drain(&self, transport: &mut T) {
        let mut dropped = 0;
        while dropped < DRAIN_LIMIT {
            match transport.receive(Duration::ZERO).await {
                Ok(_) => dropped += 1,
                Err(_) => break,
            }
        }
        if dropped > 0 {
            debug!("Discarded {} stale message(s)", dropped);
        }
    }

    fn mark_indeterminate(&self, reason: &str) {
        warn!("Session state indeterminate: {}", reason);
        self.indeterminate.store(true, Ordering::Release);
    }
}
