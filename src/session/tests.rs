use super::*;
use crate::error::PacketizerError;
use crate::sysex::{ApiVersion, DeviceVersion, ModuleInfo, Status};
use crate::transport::ChannelTransport;
use std::sync::Arc;

const WAIT: Duration = Duration::from_millis(500);

fn header() -> SysexHeader {
    SysexHeader::new(0, [0x00, 0x01, 0x73])
}

fn session() -> (Session<ChannelTransport>, ChannelTransport) {
    let (ours, peer) = ChannelTransport::pair();
    (Session::new(ours, header()), peer)
}

fn frame(message: &SysexMessage) -> Vec<u8> {
    message.encode(&header())
}

fn api_version() -> SysexMessage {
    SysexMessage::UserApiVersion(ApiVersion {
        major: 2,
        minor: 0,
        patch: 0,
    })
}

fn inquiry_reply() -> SysexMessage {
    SysexMessage::DeviceInquiryReply {
        channel: 0,
        manufacturer: 0x42,
        device: DeviceVersion {
            family: 0xF3,
            member: 1,
            minor: 3,
            major: 1,
        },
    }
}

/// Answer the next request the peer receives with `replies`
fn answer_next(
    mut peer: ChannelTransport,
    replies: Vec<Vec<u8>>,
) -> tokio::task::JoinHandle<ChannelTransport> {
    tokio::spawn(async move {
        let _request = peer.receive(WAIT).await.unwrap();
        for reply in replies {
            peer.send(&reply).await.unwrap();
        }
        peer
    })
}

#[tokio::test]
async fn test_exchange_returns_correlated_reply() {
    let (session, mut peer) = session();
    peer.send(&frame(&api_version())).await.unwrap();

    let reply = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await
        .unwrap();

    assert_eq!(reply, api_version());
    assert_eq!(session.state(), ExchangeState::Complete);
    assert_eq!(
        peer.try_receive(),
        Some(frame(&SysexMessage::UserApiVersionRequest))
    );
}

#[tokio::test]
async fn test_nak_in_place_of_dump_is_device_error() {
    let (session, mut peer) = session();
    peer.send(&frame(&SysexMessage::Status(Status::NAK)))
        .await
        .unwrap();

    let err = session
        .exchange(&SysexMessage::GlobalDataDumpRequest, WAIT)
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::Device(DeviceError { code: 0x24 }));
    assert_eq!(session.state(), ExchangeState::Failed);
}

#[tokio::test]
async fn test_undocumented_status_code_passes_through() {
    let (session, mut peer) = session();
    peer.send(&frame(&SysexMessage::Status(Status { code: 0x2A })))
        .await
        .unwrap();

    let err = session
        .exchange(&SysexMessage::ClearUserSlot { module: 4, slot: 1 }, WAIT)
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::Device(DeviceError { code: 0x2A }));
}

#[tokio::test]
async fn test_second_exchange_is_busy_without_touching_channel() {
    let (session, mut peer) = session();
    let session = Arc::new(session);

    let first = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .exchange(&SysexMessage::UserApiVersionRequest, Duration::from_secs(5))
                .await
        })
    };

    // The first request is on the wire, so its exchange holds the gate
    let sent = peer.receive(WAIT).await.unwrap();
    assert_eq!(sent, frame(&SysexMessage::UserApiVersionRequest));
    assert_eq!(session.state(), ExchangeState::AwaitingReply);

    let second = session
        .exchange(&SysexMessage::GlobalDataDumpRequest, WAIT)
        .await;
    assert_eq!(second, Err(SessionError::SessionBusy));
    assert!(peer.try_receive().is_none());

    peer.send(&frame(&api_version())).await.unwrap();
    assert_eq!(first.await.unwrap(), Ok(api_version()));
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let (session, _peer) = session();
    let timeout = Duration::from_millis(20);

    let err = session
        .exchange(&SysexMessage::UserApiVersionRequest, timeout)
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::Timeout(timeout));
    assert_eq!(session.state(), ExchangeState::TimedOut);
    assert!(!session.is_indeterminate());
}

fn module_info(module: u8) -> SysexMessage {
    SysexMessage::UserModuleInfo(ModuleInfo {
        module,
        max_program_size: 32,
        max_load_size: 48 * 1024,
        slot_count: 16,
    })
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_discarded() {
    let (session, mut peer) = session();
    let timeout = Duration::from_millis(20);

    let err = session
        .exchange(&SysexMessage::UserApiVersionRequest, timeout)
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::Timeout(timeout));
    assert!(!session.is_indeterminate());

    // The device answers the first request only now
    peer.send(&frame(&api_version())).await.unwrap();
    peer.send(&frame(&module_info(1))).await.unwrap();

    let reply = session
        .exchange(&SysexMessage::UserModuleInfoRequest { module: 1 }, WAIT)
        .await;
    assert_eq!(reply, Ok(module_info(1)));

    // Nothing is left queued for the exchange after that
    peer.send(&frame(&module_info(2))).await.unwrap();
    let reply = session
        .exchange(&SysexMessage::UserModuleInfoRequest { module: 2 }, WAIT)
        .await;
    assert_eq!(reply, Ok(module_info(2)));
}

#[tokio::test]
async fn test_retry_after_timeout_skips_duplicate_reply() {
    let (session, mut peer) = session();
    let timeout = Duration::from_millis(20);

    assert!(session
        .exchange(&SysexMessage::UserApiVersionRequest, timeout)
        .await
        .is_err());

    peer.send(&frame(&api_version())).await.unwrap();
    peer.send(&frame(&api_version())).await.unwrap();
    let retried = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await;
    assert_eq!(retried, Ok(api_version()));

    peer.send(&frame(&module_info(3))).await.unwrap();
    let reply = session
        .exchange(&SysexMessage::UserModuleInfoRequest { module: 3 }, WAIT)
        .await;
    assert_eq!(reply, Ok(module_info(3)));
}

#[tokio::test]
async fn test_unacknowledged_request_timeout_requires_resync() {
    let (session, _peer) = session();

    let err = session
        .exchange(
            &SysexMessage::ClearUserSlot { module: 1, slot: 0 },
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Timeout(_)));
    assert!(session.is_indeterminate());
    assert_eq!(
        session
            .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
            .await,
        Err(SessionError::NeedsResync)
    );
}

#[test]
fn test_max_packet_size_is_capped() {
    let (ours, _peer) = ChannelTransport::pair();
    let session = Session::new(ours, header()).with_max_packet_size(10_000);
    assert_eq!(session.max_packet_size(), MAX_PACKET_SIZE);

    let (ours, _peer) = ChannelTransport::pair();
    let session = Session::new(ours, header()).with_max_packet_size(512);
    assert_eq!(session.max_packet_size(), 512);
}

#[tokio::test]
async fn test_notification_is_forwarded_not_a_reply() {
    let (session, mut peer) = session();
    let mut notifications = session.take_notification_receiver().unwrap();
    assert!(session.take_notification_receiver().is_none());

    peer.send(&frame(&SysexMessage::CurrentProgramChanged { program: 5 }))
        .await
        .unwrap();
    peer.send(&frame(&api_version())).await.unwrap();

    let reply = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await
        .unwrap();

    assert_eq!(reply, api_version());
    assert_eq!(
        notifications.try_recv().unwrap(),
        SysexMessage::CurrentProgramChanged { program: 5 }
    );
}

#[tokio::test]
async fn test_non_sysex_traffic_is_skipped() {
    let (session, mut peer) = session();
    peer.send(&[0x90, 0x3C, 0x7F]).await.unwrap();
    peer.send(&[0xF8]).await.unwrap();
    peer.send(&frame(&api_version())).await.unwrap();

    let reply = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await;
    assert_eq!(reply, Ok(api_version()));
}

#[tokio::test]
async fn test_uncorrelated_reply_is_unexpected() {
    let (session, mut peer) = session();
    peer.send(&frame(&SysexMessage::GlobalDataDump { data: vec![1, 2] }))
        .await
        .unwrap();

    let err = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::UnexpectedReply {
            expected: "USER API VERSION REQUEST",
            received: "GLOBAL DATA DUMP",
        }
    );
}

#[tokio::test]
async fn test_slot_status_for_other_slot_is_unexpected() {
    let (session, mut peer) = session();
    let other = SysexMessage::UserSlotStatus {
        module: 4,
        slot: 3,
        contents: None,
    };
    peer.send(&frame(&other)).await.unwrap();

    let err = session
        .exchange(
            &SysexMessage::UserSlotStatusRequest { module: 4, slot: 2 },
            WAIT,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::UnexpectedReply { .. }));
}

#[tokio::test]
async fn test_decode_error_aborts_exchange() {
    let (session, mut peer) = session();
    peer.send(&[0xF0, 0x42, 0x30, 0x00, 0x01, 0x73, 0x7F, 0xF7])
        .await
        .unwrap();

    let err = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::Decode(crate::error::DecodeError::UnknownMessageType(0x7F))
    );
}

#[tokio::test]
async fn test_fetch_reassembles_chunked_transfer() {
    let (session, mut peer) = session();
    let payload: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();

    let packets = Packetizer::new(header(), MAX_PACKET_SIZE)
        .split(4, 2, &payload)
        .unwrap();
    assert_eq!(packets.len(), 2);
    for packet in &packets {
        peer.send(&packet.encode()).await.unwrap();
    }

    let reply = session
        .exchange(&SysexMessage::UserSlotDataRequest { module: 4, slot: 2 }, WAIT)
        .await
        .unwrap();

    match reply {
        SysexMessage::UserSlotData(chunk) => {
            assert_eq!((chunk.module, chunk.slot), (4, 2));
            assert_eq!(chunk.data, payload);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(!session.is_indeterminate());
}

#[tokio::test]
async fn test_fetch_gap_requires_resync() {
    let (session, mut peer) = session();
    let packets = Packetizer::new(header(), 100).split(4, 0, &[0x55; 200]).unwrap();
    assert!(packets.len() > 1);

    // First packet twice: the device restarted its transfer
    peer.send(&packets[0].encode()).await.unwrap();
    peer.send(&packets[0].encode()).await.unwrap();

    let session = session.with_max_packet_size(100);
    let err = session
        .exchange(&SysexMessage::UserSlotDataRequest { module: 4, slot: 0 }, WAIT)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::Packetizer(PacketizerError::SequenceGap {
            expected: 1,
            received: 0
        })
    );
    assert!(session.is_indeterminate());

    let blocked = session
        .exchange(&SysexMessage::UserApiVersionRequest, WAIT)
        .await;
    assert_eq!(blocked, Err(SessionError::NeedsResync));

    // The responder must only see the inquiry, not the earlier fetch request
    while peer.try_receive().is_some() {}

    // Stale frames are discarded before the inquiry goes out
    peer.send(&packets[1].encode()).await.unwrap();
    let responder = answer_next(peer, vec![frame(&inquiry_reply())]);

    let reply = session
        .exchange(&SysexMessage::DeviceInquiryRequest { channel: 0x7F }, WAIT)
        .await
        .unwrap();
    assert_eq!(reply, inquiry_reply());
    assert!(!session.is_indeterminate());
    responder.await.unwrap();
}

#[tokio::test]
async fn test_upload_splits_and_awaits_each_ack() {
    let (session, mut peer) = session();
    let payload: Vec<u8> = (0..6000u32).map(|i| (i % 251) as u8).collect();

    let device = tokio::spawn(async move {
        let mut chunks = Vec::new();
        loop {
            let bytes = peer.receive(WAIT).await.unwrap();
            let chunk = match SysexMessage::decode(&bytes, &header()).unwrap() {
                SysexMessage::UserSlotData(chunk) => chunk,
                other => panic!("unexpected {:?}", other),
            };
            let last = chunk.sequence == chunk.max_sequence;
            chunks.push(chunk);
            peer.send(&frame(&SysexMessage::Status(Status::ACK)))
                .await
                .unwrap();
            if last {
                return chunks;
            }
        }
    });

    let request = SysexMessage::UserSlotData(SlotChunk {
        module: 4,
        slot: 7,
        sequence: 0,
        max_sequence: 0,
        data: payload.clone(),
    });
    let reply = session.exchange(&request, WAIT).await.unwrap();
    assert_eq!(reply, SysexMessage::Status(Status::ACK));

    let chunks = device.await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.max_sequence == 1 && c.slot == 7));
    assert_eq!(chunks[0].sequence, 0);
    assert_eq!(chunks[1].sequence, 1);
    let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
    assert_eq!(joined, payload);
}

#[tokio::test]
async fn test_upload_nak_after_first_packet_requires_resync() {
    let (session, mut peer) = session();

    let device = tokio::spawn(async move {
        peer.receive(WAIT).await.unwrap();
        peer.send(&frame(&SysexMessage::Status(Status::ACK)))
            .await
            .unwrap();
        peer.receive(WAIT).await.unwrap();
        peer.send(&frame(&SysexMessage::Status(Status::NAK)))
            .await
            .unwrap();
    });

    let request = SysexMessage::UserSlotData(SlotChunk {
        module: 1,
        slot: 0,
        sequence: 0,
        max_sequence: 0,
        data: vec![0xAA; 8000],
    });
    let err = session.exchange(&request, WAIT).await.unwrap_err();

    assert_eq!(err, SessionError::Device(DeviceError { code: 0x24 }));
    assert!(session.is_indeterminate());
    device.await.unwrap();
}

#[tokio::test]
async fn test_upload_nak_on_first_packet_keeps_session_usable() {
    let (session, mut peer) = session();
    peer.send(&frame(&SysexMessage::Status(Status::NAK)))
        .await
        .unwrap();

    let request = SysexMessage::UserSlotData(SlotChunk {
        module: 1,
        slot: 0,
        sequence: 0,
        max_sequence: 0,
        data: vec![0x01; 16],
    });
    let err = session.exchange(&request, WAIT).await.unwrap_err();

    assert_eq!(err, SessionError::Device(DeviceError { code: 0x24 }));
    assert!(!session.is_indeterminate());
}

#[tokio::test]
async fn test_abandoned_exchange_marks_session_indeterminate() {
    let (session, _peer) = session();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        session.exchange(&SysexMessage::GlobalDataDumpRequest, Duration::from_secs(5)),
    )
    .await;

    assert!(abandoned.is_err());
    assert!(session.is_indeterminate());
    assert_eq!(session.state(), ExchangeState::Failed);
    assert_eq!(
        session
            .exchange(&SysexMessage::GlobalDataDumpRequest, WAIT)
            .await,
        Err(SessionError::NeedsResync)
    );
}

#[tokio::test]
async fn test_set_channel_changes_outbound_header() {
    let (session, mut peer) = session();
    session.set_channel(3);
    assert_eq!(session.header().channel, 3);

    peer.send(&SysexMessage::Status(Status::ACK).encode(&session.header()))
        .await
        .unwrap();
    session
        .exchange(&SysexMessage::ClearUserModule { module: 2 }, WAIT)
        .await
        .unwrap();

    let sent = peer.try_receive().unwrap();
    assert_eq!(sent[2], 0x33);
}
