//! Firmware update handlers (BEGIN_OTA, OTA_CHUNK, OTA_COMMIT).

use tracing::{error, info, warn};

use super::{Engine, Outcome, Packet};
use crate::engine::machine::OtaState;
use crate::events::{AgentEvent, AgentObserver};
use crate::protocol::packet::{ChunkState, ErrorCode};

pub(super) fn handle_begin<O: AgentObserver>(engine: &mut Engine<O>) -> Outcome {
    if engine.ota.is_writing() {
        error!("BeginOta: update already in progress");
        return Outcome::reply(Packet::nack(ErrorCode::InvalidState));
    }

    let slot = match engine.updater.next_slot() {
        Some(slot) => slot,
        None => {
            warn!("BeginOta: no update slot available");
            return Outcome::reply(Packet::nack(ErrorCode::NotSupported));
        }
    };

    if let Err(e) = engine.updater.begin(slot) {
        error!(slot, error = %e, "BeginOta: begin failed");
        return Outcome::reply(Packet::nack(e.wire_code()));
    }

    info!(slot, "Firmware update started");
    engine.ota = OtaState::Writing { slot, offset: 0 };
    engine.emit(AgentEvent::OtaStarted { slot });
    Outcome::reply(Packet::ack())
}

pub(super) fn handle_chunk<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let OtaState::Writing { slot, offset } = engine.ota else {
        error!("OtaChunk: update not started");
        return Outcome::reply(Packet::nack(ErrorCode::InvalidState));
    };

    if payload.is_empty() {
        warn!(offset, "OtaChunk: abort requested");
        return match engine.updater.abort() {
            Ok(()) => {
                engine.ota = OtaState::Idle;
                engine.emit(AgentEvent::OtaAborted);
                Outcome::reply(Packet::chunk_ack(ChunkState::AbortRequested, offset))
            }
            Err(e) => {
                error!(error = %e, "OtaChunk: abort failed");
                Outcome::reply(Packet::chunk_ack(
                    ChunkState::Internal,
                    e.wire_code().code() as u32,
                ))
            }
        };
    }

    match engine.updater.write(payload) {
        Ok(()) => {
            let offset = offset + payload.len() as u32;
            engine.ota = OtaState::Writing { slot, offset };
            engine.emit(AgentEvent::OtaProgress { offset });
            Outcome::reply(Packet::chunk_ack(ChunkState::XferNext, offset))
        }
        Err(e) => {
            // Stay in Writing; the host reacts with an abort.
            error!(offset, error = %e, "OtaChunk: write failed");
            Outcome::reply(Packet::chunk_ack(
                ChunkState::Internal,
                e.wire_code().code() as u32,
            ))
        }
    }
}

pub(super) fn handle_commit<O: AgentObserver>(engine: &mut Engine<O>) -> Outcome {
    let OtaState::Writing { slot, offset } = engine.ota else {
        error!("OtaCommit: update not started");
        return Outcome::reply(Packet::nack(ErrorCode::InvalidState));
    };

    // Whatever happens next, the transaction is over.
    engine.ota = OtaState::Idle;

    if let Err(e) = engine.updater.end() {
        error!(error = %e, "OtaCommit: finalise failed");
        return Outcome::reply(Packet::nack(e.wire_code()));
    }
    if let Err(e) = engine.updater.set_boot(slot) {
        error!(slot, error = %e, "OtaCommit: set boot slot failed");
        return Outcome::reply(Packet::nack(e.wire_code()));
    }

    info!(slot, staged = offset, "Firmware update committed");
    engine.emit(AgentEvent::OtaCommitted { slot });
    Outcome::reply(Packet::ack())
}
