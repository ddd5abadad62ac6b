//! Mock update backend for engine tests.

use std::sync::{Arc, Mutex};

use super::{FirmwareUpdate, SlotId, UpdateError};

#[derive(Default)]
struct Inner {
    no_slot: bool,
    fail_write: bool,
    fail_abort: bool,
    fail_end: bool,
    active: bool,
    begun_slot: Option<SlotId>,
    written: Vec<u8>,
    aborted: bool,
    ended: bool,
    boot_slot: Option<SlotId>,
}

/// Scriptable update backend with shared handles for test inspection.
#[derive(Clone, Default)]
pub struct MockUpdater {
    inner: Arc<Mutex<Inner>>,
}

impl MockUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report no available update slot.
    pub fn set_no_slot(&self, no_slot: bool) {
        self.inner.lock().unwrap().no_slot = no_slot;
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.inner.lock().unwrap().fail_write = fail;
    }

    pub fn set_fail_abort(&self, fail: bool) {
        self.inner.lock().unwrap().fail_abort = fail;
    }

    pub fn set_fail_end(&self, fail: bool) {
        self.inner.lock().unwrap().fail_end = fail;
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active
    }

    pub fn was_aborted(&self) -> bool {
        self.inner.lock().unwrap().aborted
    }

    pub fn was_ended(&self) -> bool {
        self.inner.lock().unwrap().ended
    }

    pub fn begun_slot(&self) -> Option<SlotId> {
        self.inner.lock().unwrap().begun_slot
    }

    pub fn boot_slot(&self) -> Option<SlotId> {
        self.inner.lock().unwrap().boot_slot
    }
}

impl FirmwareUpdate for MockUpdater {
    fn next_slot(&self) -> Option<SlotId> {
        let inner = self.inner.lock().unwrap();
        if inner.no_slot { None } else { Some(1) }
    }

    fn begin(&mut self, slot: SlotId) -> Result<(), UpdateError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.active {
            return Err(UpdateError::AlreadyActive);
        }
        inner.active = true;
        inner.begun_slot = Some(slot);
        inner.written.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), UpdateError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active {
            return Err(UpdateError::NotActive);
        }
        if inner.fail_write {
            return Err(UpdateError::Backend("injected write failure".into()));
        }
        inner.written.extend_from_slice(data);
        Ok(())
    }

    fn abort(&mut self) -> Result<(), UpdateError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active {
            return Err(UpdateError::NotActive);
        }
        if inner.fail_abort {
            return Err(UpdateError::Backend("injected abort failure".into()));
        }
        inner.active = false;
        inner.aborted = true;
        Ok(())
    }

    fn end(&mut self) -> Result<(), UpdateError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active {
            return Err(UpdateError::NotActive);
        }
        if inner.fail_end {
            return Err(UpdateError::Backend("injected end failure".into()));
        }
        inner.active = false;
        inner.ended = true;
        Ok(())
    }

    fn set_boot(&mut self, slot: SlotId) -> Result<(), UpdateError> {
        self.inner.lock().unwrap().boot_slot = Some(slot);
        Ok(())
    }
}
