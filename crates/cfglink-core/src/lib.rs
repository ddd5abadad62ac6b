//! cfglink-core: device-side configuration & provisioning protocol engine.
//!
//! This crate implements the device end of a host↔device channel running
//! over a serial byte stream (typically a USB-CDC virtual COM port). The
//! host issues typed commands — key-value configuration access, streamed
//! file writes, firmware update, identity and uptime queries, reboot — and
//! the device answers each with exactly one typed acknowledgement or error.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: framing codec, CRC, packet header and payload types
//! - **Transport**: serial byte-stream abstraction (serialport, mock)
//! - **Store**: typed key-value configuration store
//! - **Update**: firmware image staging and slot activation
//! - **Platform**: clock and device identity sources
//! - **Engine**: packet validation, dispatch, transfer state machines
//! - **Events**: observer pattern for front-end decoupling
//! - **Session**: receive-loop orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cfglink_core::platform::{StaticIdentity, SystemClock, reset_reason};
//! use cfglink_core::store::TomlStore;
//! use cfglink_core::update::FileSlots;
//! use cfglink_core::{Engine, Session, SerialWire, TracingObserver};
//!
//! let observer = Arc::new(TracingObserver);
//! let engine = Engine::new(
//!     Box::new(TomlStore::open("config.toml").expect("store")),
//!     Box::new(FileSlots::new("slots").expect("slots")),
//!     Box::new(SystemClock::new(reset_reason::POWER_ON)),
//!     Box::new(StaticIdentity::default()),
//!     "data".into(),
//!     observer.clone(),
//! );
//! let wire = SerialWire::open("/dev/ttyACM0", 115_200).expect("serial");
//! Session::new(wire, engine, observer).run().expect("session");
//! ```

pub mod engine;
pub mod events;
pub mod platform;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod update;

#[cfg(test)]
pub(crate) mod testkit;

// Re-exports for convenience
pub use engine::{Action, Engine, FileWriteState, OtaState, Outcome, Packet, RebootMode};
pub use events::{AgentEvent, AgentObserver, NullObserver, TracingObserver};
pub use platform::{Clock, DeviceIdentity, IdentityInfo, StaticIdentity, SystemClock};
pub use protocol::{FrameDecoder, Opcode, PacketHeader};
pub use session::{AgentConfig, Session};
pub use store::{ConfigStore, MemStore, StoreError, TomlStore, TypeTag, Value};
pub use transport::{MockWire, SerialWire, TransportError, WireTransport};
pub use update::{FileSlots, FirmwareUpdate, MockUpdater, UpdateError};
