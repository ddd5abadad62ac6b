//! Request handlers - dispatch logic for each opcode.
//!
//! This module is split into submodules by functionality:
//! - `config`: key-value configuration access
//! - `file`: streamed file writes, deletion, hashing
//! - `ota`: firmware update transaction
//! - `system`: ping, identity, uptime, reboot

mod config;
mod file;
mod ota;
mod system;

use tracing::warn;

use super::{Engine, Outcome, Packet, RebootMode};
use crate::events::AgentObserver;
use crate::protocol::packet::{ErrorCode, Opcode};

/// Route one validated packet to its handler.
///
/// Every path produces exactly one outcome; chunked transfers answer with
/// `CHUNK_ACK` instead of `ACK`/`NACK`, and `BEGIN_FILE_WRITE` alone may
/// stay silent on success.
pub(crate) fn dispatch<O: AgentObserver>(
    engine: &mut Engine<O>,
    opcode: Opcode,
    payload: &[u8],
) -> Outcome {
    match opcode {
        Opcode::GetDeviceInfo => system::handle_device_info(engine),
        Opcode::Ping => system::handle_ping(engine),
        Opcode::GetUptime => system::handle_uptime(engine, payload),
        Opcode::Reboot => system::handle_reboot(engine, RebootMode::Normal),
        Opcode::RebootBootloader => system::handle_reboot(engine, RebootMode::Bootloader),
        Opcode::GetConfig => config::handle_get(engine, payload),
        Opcode::SetConfig => config::handle_set(engine, payload),
        Opcode::DelConfig => config::handle_del(engine, payload),
        Opcode::NukeConfig => config::handle_nuke(engine, payload),
        Opcode::BeginFileWrite => file::handle_begin_write(engine, payload),
        Opcode::FileChunk => file::handle_chunk(engine, payload),
        Opcode::GetFileInfo => file::handle_file_info(engine, payload),
        Opcode::DeleteFile => file::handle_delete(engine, payload),
        Opcode::BeginOta => ota::handle_begin(engine),
        Opcode::OtaChunk => ota::handle_chunk(engine, payload),
        Opcode::OtaCommit => ota::handle_commit(engine),
        Opcode::Ack
        | Opcode::ChunkAck
        | Opcode::ConfigResult
        | Opcode::FileInfo
        | Opcode::Uptime
        | Opcode::DevInfo
        | Opcode::Nack => {
            warn!(opcode = %opcode, "Reply opcode received as a request");
            Outcome::reply(Packet::nack(ErrorCode::UnknownOpcode))
        }
    }
}
