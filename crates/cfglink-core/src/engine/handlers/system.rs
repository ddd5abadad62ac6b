//! Device management handlers (PING, GET_DEVICE_INFO, GET_UPTIME, REBOOT).

use tracing::{error, info, warn};

use super::{Engine, Outcome, Packet, RebootMode};
use crate::events::{AgentEvent, AgentObserver};
use crate::protocol::packet::{DeviceInfoPacket, Opcode, UptimePacket, UptimeRequest};

pub(super) fn handle_ping<O: AgentObserver>(_engine: &mut Engine<O>) -> Outcome {
    info!("Got PING");
    Outcome::reply(Packet::ack())
}

pub(super) fn handle_device_info<O: AgentObserver>(engine: &mut Engine<O>) -> Outcome {
    let info = match engine.identity.read() {
        Ok(info) => info,
        Err(e) => {
            error!(error = %e, "DeviceInfo: identity read failed");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    let pkt = DeviceInfoPacket {
        mac: info.mac,
        flash_id: info.flash_id,
        sdk_version: info.sdk_version,
        compile_time: info.compile_time,
        compile_date: info.compile_date,
        model_name: info.model_name,
        firmware_version: info.firmware_version,
        firmware_sha256: info.firmware_sha256,
    };
    Outcome::reply(Packet::new(Opcode::DevInfo, pkt.to_bytes()))
}

pub(super) fn handle_uptime<O: AgentObserver>(engine: &mut Engine<O>, payload: &[u8]) -> Outcome {
    let req = match UptimeRequest::from_bytes(payload) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Uptime: malformed request");
            return Outcome::reply(Packet::nack(e.wire_code()));
        }
    };

    // 0 and u64::MAX mean the host has no wall clock to offer.
    if req.realtime_ms != 0 && req.realtime_ms != u64::MAX {
        info!(epoch_ms = req.realtime_ms, "Uptime: adopting host wall clock");
        engine.clock.set_realtime_ms(req.realtime_ms);
    }

    let pkt = UptimePacket {
        reset_reason: engine.clock.last_reset_reason(),
        micros: engine.clock.monotonic_micros(),
    };
    Outcome::reply(Packet::new(Opcode::Uptime, pkt.to_bytes()))
}

pub(super) fn handle_reboot<O: AgentObserver>(engine: &mut Engine<O>, mode: RebootMode) -> Outcome {
    warn!(?mode, "Reboot requested");
    engine.emit(AgentEvent::RebootRequested {
        bootloader: mode == RebootMode::Bootloader,
    });
    // The session flushes the ACK and waits for it to drain before acting.
    Outcome::reboot(Packet::ack(), mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handlers::dispatch;
    use crate::engine::Action;
    use crate::platform::reset_reason;
    use crate::protocol::packet::{ErrorCode, NackPacket};
    use crate::testkit::rig;

    #[test]
    fn test_ping_acks() {
        let mut rig = rig("sys-ping");
        let outcome = dispatch(&mut rig.engine, Opcode::Ping, &[]);
        let reply = outcome.reply.unwrap();
        assert_eq!(reply.opcode, Opcode::Ack);
        assert!(reply.payload.is_empty());
        assert_eq!(outcome.action, Action::None);
    }

    #[test]
    fn test_device_info_fields() {
        let mut rig = rig("sys-devinfo");
        let outcome = dispatch(&mut rig.engine, Opcode::GetDeviceInfo, &[]);
        let reply = outcome.reply.unwrap();
        assert_eq!(reply.opcode, Opcode::DevInfo);
        let info = DeviceInfoPacket::from_bytes(&reply.payload).unwrap();
        assert_eq!(info.model_name, "cfglink-dev");
        assert_eq!(info.mac, [0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_device_info_failure_nacks() {
        use crate::platform::UnavailableIdentity;

        let mut rig = rig("sys-devinfo-fail");
        rig.engine.identity = Box::new(UnavailableIdentity);
        let outcome = dispatch(&mut rig.engine, Opcode::GetDeviceInfo, &[]);
        let reply = outcome.reply.unwrap();
        assert_eq!(
            NackPacket::from_bytes(&reply.payload).unwrap().err,
            ErrorCode::Io.code()
        );
    }

    #[test]
    fn test_uptime_reports_clock() {
        let mut rig = rig("sys-uptime");
        let req = UptimeRequest { realtime_ms: 0 }.to_bytes();
        let outcome = dispatch(&mut rig.engine, Opcode::GetUptime, &req);
        let pkt = UptimePacket::from_bytes(&outcome.reply.unwrap().payload).unwrap();
        assert_eq!(pkt.reset_reason, reset_reason::POWER_ON);
        assert_eq!(pkt.micros, 1_234_567);
        // Sentinel epoch values never set the clock.
        assert_eq!(rig.clock.realtime_ms(), None);
    }

    #[test]
    fn test_uptime_adopts_host_epoch() {
        let mut rig = rig("sys-uptime-set");
        let req = UptimeRequest {
            realtime_ms: 1_700_000_000_123,
        }
        .to_bytes();
        dispatch(&mut rig.engine, Opcode::GetUptime, &req);
        assert_eq!(rig.clock.realtime_ms(), Some(1_700_000_000_123));

        let req = UptimeRequest {
            realtime_ms: u64::MAX,
        }
        .to_bytes();
        dispatch(&mut rig.engine, Opcode::GetUptime, &req);
        assert_eq!(rig.clock.realtime_ms(), Some(1_700_000_000_123));
    }

    #[test]
    fn test_uptime_wrong_length_nacks() {
        let mut rig = rig("sys-uptime-len");
        let outcome = dispatch(&mut rig.engine, Opcode::GetUptime, &[0; 4]);
        let reply = outcome.reply.unwrap();
        assert_eq!(
            NackPacket::from_bytes(&reply.payload).unwrap().err,
            ErrorCode::InvalidSize.code()
        );
    }

    #[test]
    fn test_reboot_acks_then_requests_reset() {
        let mut rig = rig("sys-reboot");
        let outcome = dispatch(&mut rig.engine, Opcode::Reboot, &[]);
        assert_eq!(outcome.reply.unwrap().opcode, Opcode::Ack);
        assert_eq!(outcome.action, Action::Reboot(RebootMode::Normal));

        let outcome = dispatch(&mut rig.engine, Opcode::RebootBootloader, &[]);
        assert_eq!(outcome.action, Action::Reboot(RebootMode::Bootloader));
    }
}
