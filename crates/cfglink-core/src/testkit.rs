//! Shared helpers for engine and session tests.

use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{Engine, Packet};
use crate::events::NullObserver;
use crate::platform::{FixedClock, IdentityInfo, StaticIdentity, reset_reason};
use crate::protocol::codec::{FrameDecoder, encode_frame};
use crate::protocol::constants::HEADER_SIZE;
use crate::protocol::crc::crc16_chained;
use crate::protocol::packet::{Opcode, PacketHeader};
use crate::store::MemStore;
use crate::update::MockUpdater;

pub(crate) struct TestRig {
    pub engine: Engine<NullObserver>,
    pub store: MemStore,
    pub updater: MockUpdater,
    pub clock: FixedClock,
    pub root: PathBuf,
}

/// Build an engine wired to mocks, rooted in a per-test temp directory.
pub(crate) fn rig(tag: &str) -> TestRig {
    let root = std::env::temp_dir().join(format!("cfglink-rig-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();

    let store = MemStore::new();
    let updater = MockUpdater::new();
    let clock = FixedClock::new(1_234_567, reset_reason::POWER_ON);
    let engine = Engine::new(
        Box::new(store.clone()),
        Box::new(updater.clone()),
        Box::new(clock.clone()),
        Box::new(StaticIdentity::new(IdentityInfo::default())),
        root.clone(),
        Arc::new(NullObserver),
    );
    TestRig {
        engine,
        store,
        updater,
        clock,
        root,
    }
}

/// Frame a request packet exactly as the host would.
pub(crate) fn request_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_frame(&Packet::new(opcode, payload.to_vec()).to_wire(), &mut out);
    out
}

/// Decode every reply frame in `bytes`, asserting the CRC of each.
pub(crate) fn parse_replies(bytes: &[u8]) -> Vec<(PacketHeader, Vec<u8>)> {
    let mut decoder = FrameDecoder::new();
    let mut replies = Vec::new();
    for &b in bytes {
        if let Some(frame) = decoder.push(b) {
            let header = PacketHeader::from_bytes(frame).unwrap();
            let payload = frame[HEADER_SIZE..].to_vec();
            assert_eq!(header.len as usize, payload.len());
            let mut zeroed = header;
            zeroed.crc = 0;
            assert_eq!(
                crc16_chained(&zeroed.to_bytes(), &payload),
                header.crc,
                "reply CRC must verify"
            );
            replies.push((header, payload));
        }
    }
    replies
}
