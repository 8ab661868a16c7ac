//! USER SLOT DATA packetizer
//!
//! Splits oversized slot payloads into a bounded sequence of packets and
//! reassembles inbound packets into one logical payload.
//!
//! Every packet of a transfer carries a zero-based sequence number and the
//! index of the final packet (`max_sequence`); all packets of one transfer
//! agree on `max_sequence`.

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec;
use crate::error::PacketizerError;
use crate::sysex::{SlotChunk, SysexHeader};

/// Maximum total size of one sysex message
pub const MAX_PACKET_SIZE: usize = 4096;

/// Sequence numbers are 7-bit
pub const MAX_PACKETS: usize = 128;

/// One wire-level packet of a chunked transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEnvelope {
    pub header: SysexHeader,
    pub chunk: SlotChunk,
}

impl PacketEnvelope {
    pub fn new(header: SysexHeader, chunk: SlotChunk) -> Self {
        Self { header, chunk }
    }

    /// Complete F0 ... F7 frame
    pub fn encode(&self) -> Vec<u8> {
        self.chunk.encode(&self.header)
    }

    pub fn encoded_len(&self) -> usize {
        self.chunk.encoded_len()
    }
}

/// Largest chunk of payload data that fits a packet of `max_packet_size` bytes
pub fn chunk_capacity(max_packet_size: usize) -> Result<usize, PacketizerError> {
    max_packet_size
        .checked_sub(SlotChunk::OVERHEAD)
        .map(codec::max_unpacked_len)
        .and_then(|body| body.checked_sub(SlotChunk::SIZE_FIELD))
        .filter(|&data| data > 0)
        .ok_or(PacketizerError::PacketLimitTooSmall(max_packet_size))
}

/// Outbound splitter bound to one device header and packet limit
#[derive(Debug, Clone, Copy)]
pub struct Packetizer {
    header: SysexHeader,
    max_packet_size: usize,
}

impl Packetizer {
    pub fn new(header: SysexHeader, max_packet_size: usize) -> Self {
        Self {
            header,
            max_packet_size,
        }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Largest payload a single transfer can carry
    pub fn max_transfer_size(&self) -> usize {
        chunk_capacity(self.max_packet_size)
            .map(|cap| cap * MAX_PACKETS)
            .unwrap_or(0)
    }

    /// Split `payload` into contiguous packets for `module`/`slot`.
    ///
    /// An empty payload still produces one packet declaring zero bytes.
    pub fn split(
        &self,
        module: u8,
        slot: u8,
        payload: &[u8],
    ) -> Result<Vec<PacketEnvelope>, PacketizerError> {
        let capacity = chunk_capacity(self.max_packet_size)?;
        let count = payload.len().div_ceil(capacity).max(1);

        if count > MAX_PACKETS {
            return Err(PacketizerError::OversizeTransfer {
                size: payload.len(),
                limit: capacity * MAX_PACKETS,
            });
        }

        let max_sequence = (count - 1) as u8;
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(capacity).collect()
        };

        debug!(
            "Splitting {} bytes for module {} slot {} into {} packet(s)",
            payload.len(),
            module,
            slot,
            count
        );

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(sequence, data)| {
                PacketEnvelope::new(
                    self.header,
                    SlotChunk {
                        module,
                        slot,
                        sequence: sequence as u8,
                        max_sequence,
                        data: data.to_vec(),
                    },
                )
            })
            .collect())
    }

    /// Start reassembling an inbound transfer with this packetizer's limits
    pub fn transfer(&self, module: u8, slot: u8) -> ChunkedTransfer {
        ChunkedTransfer::with_limits(
            module,
            slot,
            self.max_packet_size,
            self.max_transfer_size(),
        )
    }
}

/// Lifecycle of an inbound transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Receiving,
    Complete,
    Aborted,
}

/// Result of feeding one packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// More packets expected; `received` bytes accumulated so far
    Pending { received: usize },
    /// Final packet accepted; the reassembled payload
    Complete(Vec<u8>),
}

/// Inbound reassembly of one (module, slot) transfer
#[derive(Debug)]
pub struct ChunkedTransfer {
    module: u8,
    slot: u8,
    max_packet_size: usize,
    max_transfer_size: usize,
    max_sequence: Option<u8>,
    next_sequence: u8,
    buffer: BytesMut,
    state: TransferState,
}

impl ChunkedTransfer {
    /// New transfer with the default 4096-byte packet limit
    pub fn new(module: u8, slot: u8) -> Self {
        let max_transfer = chunk_capacity(MAX_PACKET_SIZE)
            .map(|cap| cap * MAX_PACKETS)
            .unwrap_or(0);
        Self::with_limits(module, slot, MAX_PACKET_SIZE, max_transfer)
    }

    pub fn with_limits(
        module: u8,
        slot: u8,
        max_packet_size: usize,
        max_transfer_size: usize,
    ) -> Self {
        Self {
            module,
            slot,
            max_packet_size,
            max_transfer_size,
            max_sequence: None,
            next_sequence: 0,
            buffer: BytesMut::new(),
            state: TransferState::Receiving,
        }
    }

    pub fn module(&self) -> u8 {
        self.module
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Number of packets announced by the first accepted packet
    pub fn expected_packets(&self) -> Option<usize> {
        self.max_sequence.map(|max| max as usize + 1)
    }

    /// Packets accepted so far
    pub fn packets_received(&self) -> usize {
        self.next_sequence as usize + usize::from(self.state == TransferState::Complete)
    }

    /// Accept the next packet of the transfer.
    ///
    /// Any error aborts the transfer and discards what was accumulated;
    /// later calls fail with [`PacketizerError::TransferAborted`].
    pub fn feed(&mut self, packet: PacketEnvelope) -> Result<FeedStatus, PacketizerError> {
        match self.state {
            TransferState::Complete => return Err(PacketizerError::TransferComplete),
            TransferState::Aborted => return Err(PacketizerError::TransferAborted),
            TransferState::Receiving => {}
        }

        let encoded_len = packet.encoded_len();
        let result = self.accept(packet.chunk, encoded_len);
        if let Err(e) = &result {
            debug!(
                "Aborting transfer for module {} slot {}: {}",
                self.module, self.slot, e
            );
            self.state = TransferState::Aborted;
            self.buffer.clear();
        }
        result
    }

    fn accept(
        &mut self,
        chunk: SlotChunk,
        encoded_len: usize,
    ) -> Result<FeedStatus, PacketizerError> {
        if chunk.module != self.module || chunk.slot != self.slot {
            return Err(PacketizerError::ForeignPacket {
                module: chunk.module,
                slot: chunk.slot,
            });
        }

        if encoded_len > self.max_packet_size {
            return Err(PacketizerError::OversizeTransfer {
                size: encoded_len,
                limit: self.max_packet_size,
            });
        }

        if let Some(previous) = self.max_sequence {
            if previous != chunk.max_sequence {
                return Err(PacketizerError::SequenceMismatchMax {
                    previous,
                    received: chunk.max_sequence,
                });
            }
        }

        if chunk.sequence != self.next_sequence {
            return Err(PacketizerError::SequenceGap {
                expected: self.next_sequence,
                received: chunk.sequence,
            });
        }

        let total = self.buffer.len() + chunk.data.len();
        if total > self.max_transfer_size {
            return Err(PacketizerError::OversizeTransfer {
                size: total,
                limit: self.max_transfer_size,
            });
        }

        self.max_sequence = Some(chunk.max_sequence);
        self.buffer.extend_from_slice(&chunk.data);

        trace!(
            "Accepted packet {}/{} ({} bytes, {} total)",
            chunk.sequence,
            chunk.max_sequence,
            chunk.data.len(),
            self.buffer.len()
        );

        if chunk.sequence >= chunk.max_sequence {
            self.state = TransferState::Complete;
            Ok(FeedStatus::Complete(self.buffer.split().to_vec()))
        } else {
            self.next_sequence += 1;
            Ok(FeedStatus::Pending {
                received: self.buffer.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header() -> SysexHeader {
        SysexHeader::new(0, [0x00, 0x01, 0x73])
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn reassemble(packets: Vec<PacketEnvelope>, module: u8, slot: u8) -> Vec<u8> {
        let mut transfer = ChunkedTransfer::new(module, slot);
        let mut result = None;
        for packet in packets {
            if let FeedStatus::Complete(data) = transfer.feed(packet).unwrap() {
                result = Some(data);
            }
        }
        result.expect("transfer did not complete")
    }

    #[test]
    fn test_capacity_for_default_limit() {
        assert_eq!(chunk_capacity(MAX_PACKET_SIZE).unwrap(), 3569);
        assert!(matches!(
            chunk_capacity(SlotChunk::OVERHEAD + 5),
            Err(PacketizerError::PacketLimitTooSmall(_))
        ));
    }

    #[test]
    fn test_split_documented_example() {
        let packetizer = Packetizer::new(header(), MAX_PACKET_SIZE);
        let data = payload(4448);
        let packets = packetizer.split(1, 3, &data).unwrap();

        assert_eq!(packets.len(), 2);
        // size field plus chunk data, before 7-bit packing
        let bodies: Vec<usize> = packets
            .iter()
            .map(|p| SlotChunk::SIZE_FIELD + p.chunk.data.len())
            .collect();
        assert_eq!(bodies, vec![3573, 883]);

        let wire: Vec<usize> = packets.iter().map(|p| p.encode().len()).collect();
        assert_eq!(wire, vec![4096, 1022]);

        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.chunk.sequence as usize, i);
            assert_eq!(packet.chunk.max_sequence, 1);
        }

        assert_eq!(reassemble(packets, 1, 3), data);
    }

    #[test]
    fn test_exact_limit_is_single_packet() {
        let packetizer = Packetizer::new(header(), MAX_PACKET_SIZE);

        let packets = packetizer.split(4, 0, &payload(3569)).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].encode().len(), MAX_PACKET_SIZE);
        assert_eq!(packets[0].chunk.max_sequence, 0);

        let packets = packetizer.split(4, 0, &payload(3570)).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.encoded_len() <= MAX_PACKET_SIZE));
    }

    #[test]
    fn test_empty_payload() {
        let packetizer = Packetizer::new(header(), MAX_PACKET_SIZE);
        let packets = packetizer.split(2, 1, &[]).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].chunk.data.is_empty());
        assert_eq!(reassemble(packets, 2, 1), Vec::<u8>::new());
    }

    #[test]
    fn test_too_many_packets() {
        let packetizer = Packetizer::new(header(), 64);
        let capacity = chunk_capacity(64).unwrap();
        assert!(packetizer.split(1, 0, &payload(capacity * MAX_PACKETS)).is_ok());
        assert!(matches!(
            packetizer.split(1, 0, &payload(capacity * MAX_PACKETS + 1)),
            Err(PacketizerError::OversizeTransfer { .. })
        ));
    }

    #[test]
    fn test_repeated_sequence_is_gap() {
        let packetizer = Packetizer::new(header(), MAX_PACKET_SIZE);
        let packets = packetizer.split(1, 3, &payload(4448)).unwrap();
        let mut transfer = ChunkedTransfer::new(1, 3);

        assert_eq!(
            transfer.feed(packets[0].clone()).unwrap(),
            FeedStatus::Pending { received: 3569 }
        );
        assert_eq!(
            transfer.feed(packets[0].clone()),
            Err(PacketizerError::SequenceGap {
                expected: 1,
                received: 0
            })
        );
        assert_eq!(transfer.state(), TransferState::Aborted);
        assert_eq!(
            transfer.feed(packets[1].clone()),
            Err(PacketizerError::TransferAborted)
        );
    }

    #[test]
    fn test_out_of_order_is_gap() {
        let packetizer = Packetizer::new(header(), 200);
        let packets = packetizer.split(1, 0, &payload(1000)).unwrap();
        let mut transfer = packetizer.transfer(1, 0);

        assert!(matches!(
            transfer.feed(packets[1].clone()),
            Err(PacketizerError::SequenceGap {
                expected: 0,
                received: 1
            })
        ));
    }

    #[test]
    fn test_max_sequence_must_agree() {
        let packetizer = Packetizer::new(header(), 200);
        let mut packets = packetizer.split(1, 0, &payload(1000)).unwrap();
        let mut transfer = packetizer.transfer(1, 0);
        transfer.feed(packets[0].clone()).unwrap();

        packets[1].chunk.max_sequence += 1;
        assert!(matches!(
            transfer.feed(packets[1].clone()),
            Err(PacketizerError::SequenceMismatchMax { .. })
        ));
    }

    #[test]
    fn test_foreign_packet() {
        let packetizer = Packetizer::new(header(), MAX_PACKET_SIZE);
        let packets = packetizer.split(1, 0, &payload(10)).unwrap();
        let mut transfer = ChunkedTransfer::new(1, 1);
        assert_eq!(
            transfer.feed(packets[0].clone()),
            Err(PacketizerError::ForeignPacket { module: 1, slot: 0 })
        );
    }

    #[test]
    fn test_no_packets_after_completion() {
        let packetizer = Packetizer::new(header(), MAX_PACKET_SIZE);
        let packets = packetizer.split(1, 0, &payload(10)).unwrap();
        let mut transfer = ChunkedTransfer::new(1, 0);
        assert!(matches!(
            transfer.feed(packets[0].clone()),
            Ok(FeedStatus::Complete(_))
        ));
        assert_eq!(transfer.packets_received(), 1);
        assert_eq!(
            transfer.feed(packets[0].clone()),
            Err(PacketizerError::TransferComplete)
        );
    }

    #[test]
    fn test_oversize_packet_rejected() {
        let big = Packetizer::new(header(), MAX_PACKET_SIZE);
        let packets = big.split(1, 0, &payload(2000)).unwrap();
        let mut transfer = ChunkedTransfer::with_limits(1, 0, 1024, 100_000);
        assert!(matches!(
            transfer.feed(packets[0].clone()),
            Err(PacketizerError::OversizeTransfer { limit: 1024, .. })
        ));
    }

    #[test]
    fn test_transfer_size_limit() {
        let packetizer = Packetizer::new(header(), 200);
        let packets = packetizer.split(1, 0, &payload(1000)).unwrap();
        let mut transfer = ChunkedTransfer::with_limits(1, 0, 200, 300);
        let results: Vec<_> = packets.into_iter().map(|p| transfer.feed(p)).collect();
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(PacketizerError::OversizeTransfer { limit: 300, .. }))));
    }

    proptest! {
        #[test]
        fn prop_split_then_feed_reconstructs(
            data in proptest::collection::vec(any::<u8>(), 0..3000),
            max_packet in 100usize..600,
        ) {
            let packetizer = Packetizer::new(header(), max_packet);
            let capacity = chunk_capacity(max_packet).unwrap();
            let packets = packetizer.split(3, 5, &data).unwrap();

            prop_assert_eq!(packets.len(), data.len().div_ceil(capacity).max(1));
            let max_sequence = (packets.len() - 1) as u8;
            for (i, packet) in packets.iter().enumerate() {
                prop_assert_eq!(packet.chunk.sequence as usize, i);
                prop_assert_eq!(packet.chunk.max_sequence, max_sequence);
                prop_assert!(packet.encode().len() <= max_packet);
            }

            let mut transfer = packetizer.transfer(3, 5);
            let mut out = None;
            for packet in packets {
                if let FeedStatus::Complete(bytes) = transfer.feed(packet).unwrap() {
                    out = Some(bytes);
                }
            }
            prop_assert_eq!(out, Some(data));
        }
    }
}
