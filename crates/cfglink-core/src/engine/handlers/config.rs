//! Key-value configuration handlers (GET, SET, DEL, NUKE).

use tracing::{error, info};

use super::{Engine, Outcome, Packet};
use crate::events::AgentObserver;
use crate::protocol::packet::{CfgPacket, DelCfgPacket, Opcode};
use crate::store::Value;

pub(super) fn handle_get<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let req = match CfgPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "GetConfig: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    match engine.store.get(&req.ns, &req.key, req.tag) {
        Ok(value) => {
            let reply = CfgPacket {
                tag: req.tag,
                ns: req.ns,
                key: req.key,
                value: value.to_wire_bytes(),
            };
            info!(ns = %reply.ns, key = %reply.key, len = reply.value.len(), "GetConfig: sending value");
            Outcome::reply(Packet::new(Opcode::ConfigResult, reply.to_bytes()))
        }
        Err(e) => {
            error!(ns = %req.ns, key = %req.key, error = %e, "GetConfig: read failed");
            Outcome::reply(Packet::nack(e.wire_code()))
        }
    }
}

pub(super) fn handle_set<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let req = match CfgPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "SetConfig: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    // Fixed-width tags require the exact width; STR must carry its NUL.
    let value = match Value::from_wire_bytes(req.tag, &req.value) {
        Ok(value) => value,
        Err(e) => {
            error!(ns = %req.ns, key = %req.key, error = %e, "SetConfig: bad value");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    match engine.store.set(&req.ns, &req.key, value) {
        Ok(()) => {
            info!(ns = %req.ns, key = %req.key, "SetConfig: stored");
            Outcome::reply(Packet::ack())
        }
        Err(e) => {
            error!(ns = %req.ns, key = %req.key, error = %e, "SetConfig: store failed");
            Outcome::reply(Packet::nack(e.wire_code()))
        }
    }
}

pub(super) fn handle_del<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let req = match DelCfgPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "DelConfig: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    let result = engine
        .store
        .erase(&req.ns, &req.key)
        .and_then(|_| engine.store.commit());
    match result {
        Ok(()) => {
            info!(ns = %req.ns, key = %req.key, "DelConfig: erased");
            Outcome::reply(Packet::ack())
        }
        Err(e) => {
            error!(ns = %req.ns, key = %req.key, error = %e, "DelConfig: erase failed");
            Outcome::reply(Packet::nack(e.wire_code()))
        }
    }
}

pub(super) fn handle_nuke<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    // Same wire layout as DEL_CONFIG; the key field is ignored.
    let req = match DelCfgPacket::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "NukeConfig: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    let result = engine
        .store
        .erase_all(&req.ns)
        .and_then(|_| engine.store.commit());
    match result {
        Ok(()) => {
            info!(ns = %req.ns, "NukeConfig: namespace wiped");
            Outcome::reply(Packet::ack())
        }
        Err(e) => {
            error!(ns = %req.ns, error = %e, "NukeConfig: wipe failed");
            Outcome::reply(Packet::nack(e.wire_code()))
        }
    }
}
