//! File transfer handlers (BEGIN_FILE_WRITE, FILE_CHUNK, GET_FILE_INFO,
//! DELETE_FILE).

use std::fs::{self, File};
use std::io::{Read, Write};

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use super::{Engine, Outcome, Packet};
use crate::engine::machine::FileWriteState;
use crate::events::{AgentEvent, AgentObserver};
use crate::protocol::constants::HASH_CHUNK_SIZE;
use crate::protocol::packet::{ChunkState, ErrorCode, FileInfoPacket, Opcode, PathPacket};

pub(super) fn handle_begin_write<O: AgentObserver>(
    engine: &mut Engine<O>,
    payload: &[u8],
) -> Outcome {
    let req = match PathPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "BeginFileWrite: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };
    if req.len == 0 {
        warn!(path = %req.path, "BeginFileWrite: zero expected length");
        return Outcome::reply(Packet::nack(ErrorCode::InvalidArg));
    }
    let path = match engine.resolve_path(&req.path) {
        Ok(path) => path,
        Err(code) => {
            warn!(path = %req.path, "BeginFileWrite: path rejected");
            return Outcome::reply(Packet::nack(code));
        }
    };

    // A transfer the host never finished leaves no partial file behind.
    if let FileWriteState::Writing { file, path: old, .. } = std::mem::take(&mut engine.file_xfer)
    {
        warn!(path = %old.display(), "BeginFileWrite: discarding unfinished transfer");
        drop(file);
        let _ = fs::remove_file(&old);
    }

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        error!(path = %path.display(), error = %e, "BeginFileWrite: cannot create parent");
        return Outcome::reply(Packet::nack(ErrorCode::Io));
    }

    match File::create(&path) {
        Ok(file) => {
            info!(path = %path.display(), expected = req.len, "File write started");
            engine.emit(AgentEvent::FileWriteStarted {
                path: req.path,
                expected: req.len as u64,
            });
            engine.file_xfer = FileWriteState::Writing {
                file,
                path,
                expected: req.len as u64,
                written: 0,
            };
            // No reply: the first CHUNK_ACK confirms the transfer started.
            Outcome::silent()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "BeginFileWrite: open failed");
            Outcome::reply(Packet::nack(ErrorCode::Io))
        }
    }
}

pub(super) fn handle_chunk<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let (mut file, path, expected, written) = match std::mem::take(&mut engine.file_xfer) {
        FileWriteState::Idle => {
            error!("FileChunk: no transfer in progress");
            return Outcome::reply(Packet::nack(ErrorCode::InvalidState));
        }
        FileWriteState::Writing {
            file,
            path,
            expected,
            written,
        } => (file, path, expected, written),
    };

    // An empty chunk is the host's abort request; the partial file goes away.
    if payload.is_empty() {
        warn!(path = %path.display(), written, "FileChunk: abort requested");
        drop(file);
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "FileChunk: could not remove partial file");
        }
        engine.emit(AgentEvent::FileWriteAborted {
            path: path.display().to_string(),
        });
        return Outcome::reply(Packet::chunk_ack(ChunkState::AbortRequested, 0));
    }

    if written + payload.len() as u64 > expected {
        error!(
            written,
            chunk = payload.len(),
            expected,
            "FileChunk: chunk exceeds announced length"
        );
        engine.file_xfer = FileWriteState::Writing {
            file,
            path,
            expected,
            written,
        };
        return Outcome::reply(Packet::chunk_ack(
            ChunkState::Internal,
            ErrorCode::InvalidState.code() as u32,
        ));
    }

    if let Err(e) = file.write_all(payload) {
        error!(path = %path.display(), error = %e, "FileChunk: write failed");
        engine.file_xfer = FileWriteState::Writing {
            file,
            path,
            expected,
            written,
        };
        return Outcome::reply(Packet::chunk_ack(
            ChunkState::Internal,
            ErrorCode::InvalidSize.code() as u32,
        ));
    }

    let written = written + payload.len() as u64;
    if written == expected {
        let _ = file.flush();
        drop(file);
        info!(path = %path.display(), written, "File write finished");
        engine.emit(AgentEvent::FileWriteFinished {
            path: path.display().to_string(),
            written,
        });
        Outcome::reply(Packet::chunk_ack(ChunkState::XferDone, written as u32))
    } else {
        engine.emit(AgentEvent::FileWriteProgress { written, expected });
        engine.file_xfer = FileWriteState::Writing {
            file,
            path,
            expected,
            written,
        };
        Outcome::reply(Packet::chunk_ack(ChunkState::XferNext, written as u32))
    }
}

pub(super) fn handle_delete<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let req = match PathPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "DeleteFile: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };
    let path = match engine.resolve_path(&req.path) {
        Ok(path) => path,
        Err(code) => return Outcome::reply(Packet::nack(code)),
    };

    match fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), "File deleted");
            Outcome::reply(Packet::ack())
        }
        // Absent already means the goal state is reached.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "DeleteFile: already absent");
            Outcome::reply(Packet::ack())
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "DeleteFile: unlink failed");
            Outcome::reply(Packet::nack(ErrorCode::Io))
        }
    }
}

pub(super) fn handle_file_info<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let req = match PathPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "GetFileInfo: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };
    let path = match engine.resolve_path(&req.path) {
        Ok(path) => path,
        Err(code) => return Outcome::reply(Packet::nack(code)),
    };

    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "GetFileInfo: not found");
            return Outcome::reply(Packet::nack(ErrorCode::NotFound));
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "GetFileInfo: open failed");
            return Outcome::reply(Packet::nack(ErrorCode::Io));
        }
    };

    let size = match file.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "GetFileInfo: stat failed");
            return Outcome::reply(Packet::nack(ErrorCode::Io));
        }
    };

    // An empty file reports an all-zero hash rather than SHA-256 of nothing.
    if size == 0 {
        let info = FileInfoPacket {
            size: 0,
            hash: [0u8; 32],
        };
        return Outcome::reply(Packet::new(Opcode::FileInfo, info.to_bytes()));
    }

    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) => {
                error!(path = %path.display(), error = %e, "GetFileInfo: read failed");
                return Outcome::reply(Packet::nack(ErrorCode::Io));
            }
        }
    }

    let info = FileInfoPacket {
        size: size as u32,
        hash: hasher.finalize().into(),
    };
    info!(path = %path.display(), size, "GetFileInfo: hashed");
    Outcome::reply(Packet::new(Opcode::FileInfo, info.to_bytes()))
}
