//! Session orchestrator: the single receive task.
//!
//! Reads bytes from the transport, decodes frames, hands them to the
//! engine, writes replies, and performs follow-up actions. Processing is
//! strictly serial, so replies leave in request order and each request gets
//! at most one reply.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{Action, Engine, Outcome, RebootMode};
use crate::events::{AgentEvent, AgentObserver};
use crate::platform::IdentityInfo;
use crate::protocol::codec::{FrameDecoder, encode_frame};
use crate::transport::{TransportError, WireTransport};

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Serial device path, e.g. `/dev/ttyACM0`.
    pub port: Option<String>,
    pub baud: u32,
    /// Directory file transfers operate under.
    pub fs_root: PathBuf,
    /// Backing file of the key-value store.
    pub store_path: PathBuf,
    /// Directory holding firmware slot images.
    pub slots_dir: PathBuf,
    pub flush_timeout_ms: u64,
    /// How long the final ACK gets to drain before a reboot acts.
    pub reboot_delay_ms: u64,
    pub identity: IdentityInfo,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            fs_root: "data".into(),
            store_path: "config.toml".into(),
            slots_dir: "slots".into(),
            flush_timeout_ms: 1_000,
            reboot_delay_ms: 3_500,
            identity: IdentityInfo::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Called once the reboot ACK has drained; returns `true` to leave the
/// receive loop (a real device restarts here instead).
pub type RebootHook = Box<dyn FnMut(RebootMode) -> bool + Send>;

/// The receive task: transport in, engine dispatch, replies out.
pub struct Session<W: WireTransport, O: AgentObserver> {
    wire: W,
    engine: Engine<O>,
    observer: Arc<O>,
    decoder: FrameDecoder,
    tx_buf: Vec<u8>,
    flush_timeout: Duration,
    reboot_delay: Duration,
    reboot_hook: RebootHook,
}

impl<W: WireTransport, O: AgentObserver> Session<W, O> {
    pub fn new(wire: W, engine: Engine<O>, observer: Arc<O>) -> Self {
        Self {
            wire,
            engine,
            observer,
            decoder: FrameDecoder::new(),
            tx_buf: Vec::new(),
            flush_timeout: Duration::from_millis(1_000),
            reboot_delay: Duration::from_millis(3_500),
            reboot_hook: Box::new(|mode| {
                info!(?mode, "Reboot hook: ending session");
                true
            }),
        }
    }

    pub fn with_timing(mut self, flush_timeout: Duration, reboot_delay: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self.reboot_delay = reboot_delay;
        self
    }

    pub fn with_reboot_hook(
        mut self,
        hook: impl FnMut(RebootMode) -> bool + Send + 'static,
    ) -> Self {
        self.reboot_hook = Box::new(hook);
        self
    }

    /// Run the receive loop until the transport disconnects or a reboot
    /// hook ends the session.
    pub fn run(&mut self) -> Result<()> {
        info!("Agent session started");
        loop {
            let bytes = match self.wire.read() {
                Ok(bytes) => bytes,
                Err(TransportError::Timeout) => continue,
                Err(TransportError::Disconnected) => {
                    info!("Transport disconnected, session ending");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Transient read error, retrying");
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }
            };

            for byte in bytes {
                let outcome = match self.decoder.push(byte) {
                    Some(frame) => self.engine.handle_frame(frame),
                    None => continue,
                };
                if !self.deliver(outcome)? {
                    return Ok(());
                }
            }
        }
    }

    /// Send the reply, then perform the follow-up action. Returns `false`
    /// when the session should end.
    fn deliver(&mut self, outcome: Outcome) -> Result<bool> {
        if let Some(reply) = &outcome.reply {
            encode_frame(&reply.to_wire(), &mut self.tx_buf);
            self.wire.write(&self.tx_buf)?;
            self.wire.flush(self.flush_timeout)?;
            self.observer.on_event(&AgentEvent::ReplySent {
                opcode: reply.opcode,
                payload_len: reply.payload.len(),
            });
        }
        match outcome.action {
            Action::None => Ok(true),
            Action::Reboot(mode) => {
                // Give the ACK time to reach the host before restarting.
                thread::sleep(self.reboot_delay);
                Ok(!(self.reboot_hook)(mode))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Packet;
    use crate::events::NullObserver;
    use crate::protocol::constants::{FRAME_END, FRAME_ESC, FRAME_START};
    use crate::protocol::packet::{
        CfgPacket, ChunkAckPacket, ChunkState, NackPacket, Opcode, PathPacket,
    };
    use crate::store::TypeTag;
    use crate::testkit::{parse_replies, request_frame, rig};
    use crate::transport::MockWire;

    fn session_for(tag: &str) -> (Session<MockWire, NullObserver>, MockWire) {
        let rig = rig(tag);
        let mock = MockWire::new();
        let session = Session::new(mock.clone(), rig.engine, Arc::new(NullObserver))
            .with_timing(Duration::from_millis(10), Duration::ZERO);
        (session, mock)
    }

    #[test]
    fn test_ping_roundtrip() {
        let (mut session, mock) = session_for("sess-ping");
        mock.queue_bytes(&request_frame(Opcode::Ping, &[]));
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 1);
        let (header, payload) = &replies[0];
        assert_eq!(header.opcode, Opcode::Ack as u8);
        assert_eq!(header.len, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_corrupted_frame_gets_nack_zero() {
        let (mut session, mock) = session_for("sess-crc");
        let mut frame = request_frame(Opcode::Ping, &[]);
        // Flip a bit in the middle of the framed header. The chosen byte is
        // not a sentinel, so framing survives and the CRC check fires.
        frame[2] ^= 0x01;
        assert!(frame[2] != FRAME_START && frame[2] != FRAME_END && frame[2] != FRAME_ESC);
        mock.queue_bytes(&frame);
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 1);
        let (header, payload) = &replies[0];
        assert_eq!(header.opcode, Opcode::Nack as u8);
        assert_eq!(NackPacket::from_bytes(payload).unwrap().err, 0);
    }

    #[test]
    fn test_config_value_with_sentinel_bytes_survives() {
        // The stored value contains every framing sentinel; the escape layer
        // must deliver it bit-identical both ways.
        let (mut session, mock) = session_for("sess-esc");
        let value = [0x5A, 0xC0, 0xDB, 0x00, 0xDC, 0xDD, 0xDE, 0x01];
        let set = CfgPacket {
            tag: TypeTag::Blob,
            ns: "cal".into(),
            key: "curve".into(),
            value: value.to_vec(),
        };
        mock.queue_bytes(&request_frame(Opcode::SetConfig, &set.to_bytes()));
        let get = CfgPacket {
            tag: TypeTag::Blob,
            ns: "cal".into(),
            key: "curve".into(),
            value: Vec::new(),
        };
        mock.queue_bytes(&request_frame(Opcode::GetConfig, &get.to_bytes()));
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].0.opcode, Opcode::Ack as u8);
        let result = CfgPacket::from_bytes(&replies[1].1).unwrap();
        assert_eq!(result.value, value);
    }

    #[test]
    fn test_file_write_over_the_wire() {
        let (mut session, mock) = session_for("sess-file");
        let begin = PathPacket {
            len: 10,
            path: "/f".into(),
        };
        mock.queue_bytes(&request_frame(Opcode::BeginFileWrite, &begin.to_bytes()));
        let data: Vec<u8> = (0u8..10).collect();
        mock.queue_bytes(&request_frame(Opcode::FileChunk, &data[..8]));
        mock.queue_bytes(&request_frame(Opcode::FileChunk, &data[8..]));
        session.run().unwrap();

        // BEGIN is silent, so two chunk ACKs are the only replies.
        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 2);
        let first = ChunkAckPacket::from_bytes(&replies[0].1).unwrap();
        assert_eq!(first.state, ChunkState::XferNext);
        assert_eq!(first.aux, 8);
        let second = ChunkAckPacket::from_bytes(&replies[1].1).unwrap();
        assert_eq!(second.state, ChunkState::XferDone);
        assert_eq!(second.aux, 10);
    }

    #[test]
    fn test_one_reply_per_request_in_order() {
        let (mut session, mock) = session_for("sess-order");
        mock.queue_bytes(&request_frame(Opcode::Ping, &[]));
        mock.queue_bytes(&request_frame(Opcode::GetUptime, &0u64.to_le_bytes()));
        mock.queue_bytes(&request_frame(Opcode::Ping, &[]));
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        let opcodes: Vec<u8> = replies.iter().map(|(h, _)| h.opcode).collect();
        assert_eq!(
            opcodes,
            vec![Opcode::Ack as u8, Opcode::Uptime as u8, Opcode::Ack as u8]
        );
    }

    #[test]
    fn test_split_frame_across_reads() {
        let (mut session, mock) = session_for("sess-split");
        let frame = request_frame(Opcode::Ping, &[]);
        let (a, b) = frame.split_at(3);
        mock.queue_bytes(a);
        mock.queue_bytes(b);
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0.opcode, Opcode::Ack as u8);
    }

    #[test]
    fn test_reboot_acks_then_fires_hook() {
        use std::sync::Mutex;

        let rig = rig("sess-reboot");
        let mock = MockWire::new();
        let fired: Arc<Mutex<Option<RebootMode>>> = Arc::new(Mutex::new(None));
        let fired_handle = fired.clone();
        let mut session = Session::new(mock.clone(), rig.engine, Arc::new(NullObserver))
            .with_timing(Duration::from_millis(10), Duration::ZERO)
            .with_reboot_hook(move |mode| {
                *fired_handle.lock().unwrap() = Some(mode);
                true
            });

        mock.queue_bytes(&request_frame(Opcode::RebootBootloader, &[]));
        // Never read: the session ends at the reboot hook.
        mock.queue_bytes(&request_frame(Opcode::Ping, &[]));
        session.run().unwrap();

        assert_eq!(*fired.lock().unwrap(), Some(RebootMode::Bootloader));
        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 1, "only the reboot ACK went out");
        assert_eq!(replies[0].0.opcode, Opcode::Ack as u8);
    }

    #[test]
    fn test_garbage_between_frames_is_ignored() {
        let (mut session, mock) = session_for("sess-noise");
        mock.queue_bytes(&[0x00, 0x13, 0x37]);
        mock.queue_bytes(&request_frame(Opcode::Ping, &[]));
        mock.queue_bytes(&[0xFF, 0xFE]);
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn test_config_roundtrip_persists_packet() {
        // Full S3 shape on the wire: SET then GET of a u32.
        let (mut session, mock) = session_for("sess-s3");
        let set = CfgPacket {
            tag: TypeTag::U32,
            ns: "net".into(),
            key: "port".into(),
            value: 0x0000BEEFu32.to_le_bytes().to_vec(),
        };
        mock.queue_bytes(&request_frame(Opcode::SetConfig, &set.to_bytes()));
        let get = CfgPacket {
            tag: TypeTag::U32,
            ns: "net".into(),
            key: "port".into(),
            value: Vec::new(),
        };
        mock.queue_bytes(&request_frame(Opcode::GetConfig, &get.to_bytes()));
        session.run().unwrap();

        let replies = parse_replies(&mock.written());
        assert_eq!(replies[0].0.opcode, Opcode::Ack as u8);
        assert_eq!(replies[1].0.opcode, Opcode::ConfigResult as u8);
        let result = CfgPacket::from_bytes(&replies[1].1).unwrap();
        assert_eq!(result.value, vec![0xEF, 0xBE, 0x00, 0x00]);
    }

    #[test]
    fn test_agent_config_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "cfglink-agent-config-{}.toml",
            std::process::id()
        ));
        let mut config = AgentConfig::default();
        config.port = Some("/dev/ttyACM0".into());
        config.identity.model_name = "bench-unit".into();
        config.save_to_file(&path).unwrap();

        let loaded = AgentConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(loaded.identity.model_name, "bench-unit");
        assert_eq!(loaded.baud, 115_200);
        let _ = std::fs::remove_file(&path);
    }
}
