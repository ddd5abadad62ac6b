//! Device identity source for the `DEV_INFO` reply.

use serde::{Deserialize, Serialize};

use super::PlatformError;

/// Everything `GET_DEVICE_INFO` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityInfo {
    pub mac: [u8; 6],
    pub flash_id: [u8; 8],
    pub sdk_version: String,
    pub compile_time: String,
    pub compile_date: String,
    pub model_name: String,
    pub firmware_version: String,
    pub firmware_sha256: [u8; 32],
}

impl Default for IdentityInfo {
    fn default() -> Self {
        Self {
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            flash_id: [0; 8],
            sdk_version: format!("rust-{}", env!("CARGO_PKG_VERSION")),
            compile_time: "unknown".into(),
            compile_date: "unknown".into(),
            model_name: "cfglink-dev".into(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
            firmware_sha256: [0; 32],
        }
    }
}

/// Identity source consumed by the engine.
pub trait DeviceIdentity: Send {
    fn read(&self) -> Result<IdentityInfo, PlatformError>;
}

/// Identity loaded once from configuration.
#[derive(Default)]
pub struct StaticIdentity {
    info: IdentityInfo,
}

impl StaticIdentity {
    pub fn new(info: IdentityInfo) -> Self {
        Self { info }
    }
}

impl DeviceIdentity for StaticIdentity {
    fn read(&self) -> Result<IdentityInfo, PlatformError> {
        Ok(self.info.clone())
    }
}

/// Identity source that always fails, for NACK-path tests.
pub struct UnavailableIdentity;

impl DeviceIdentity for UnavailableIdentity {
    fn read(&self) -> Result<IdentityInfo, PlatformError> {
        Err(PlatformError::Unavailable("identity fuses unreadable".into()))
    }
}
