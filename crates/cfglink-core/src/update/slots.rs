//! File-backed A/B slot update backend.
//!
//! Each slot is an image file under the slots directory; a `boot` marker
//! file names the active slot. Incoming images are staged to a `.staging`
//! file and renamed into place on `end`, so a torn transfer never replaces
//! a good image.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{FirmwareUpdate, SlotId, UpdateError};

pub const SLOT_A: SlotId = 0;
pub const SLOT_B: SlotId = 1;

const BOOT_MARKER: &str = "boot";

pub struct FileSlots {
    dir: PathBuf,
    staging: Option<(SlotId, File)>,
}

impl FileSlots {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, UpdateError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, staging: None })
    }

    fn slot_path(&self, slot: SlotId) -> PathBuf {
        let name = if slot == SLOT_A { "slot_a.bin" } else { "slot_b.bin" };
        self.dir.join(name)
    }

    fn staging_path(&self, slot: SlotId) -> PathBuf {
        let mut path = self.slot_path(slot);
        path.set_extension("bin.staging");
        path
    }

    /// The slot marked for boot; defaults to slot A with no marker.
    pub fn boot_slot(&self) -> SlotId {
        match fs::read_to_string(self.dir.join(BOOT_MARKER)) {
            Ok(text) if text.trim() == "b" => SLOT_B,
            _ => SLOT_A,
        }
    }
}

impl FirmwareUpdate for FileSlots {
    fn next_slot(&self) -> Option<SlotId> {
        // The inactive slot of the A/B pair.
        Some(if self.boot_slot() == SLOT_A { SLOT_B } else { SLOT_A })
    }

    fn begin(&mut self, slot: SlotId) -> Result<(), UpdateError> {
        if self.staging.is_some() {
            return Err(UpdateError::AlreadyActive);
        }
        let path = self.staging_path(slot);
        let file = File::create(&path)?;
        info!(slot, path = %path.display(), "Update staging started");
        self.staging = Some((slot, file));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), UpdateError> {
        let (_, file) = self.staging.as_mut().ok_or(UpdateError::NotActive)?;
        file.write_all(data)?;
        Ok(())
    }

    fn abort(&mut self) -> Result<(), UpdateError> {
        let (slot, file) = self.staging.take().ok_or(UpdateError::NotActive)?;
        drop(file);
        let path = self.staging_path(slot);
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove staging file");
        }
        info!(slot, "Update aborted");
        Ok(())
    }

    fn end(&mut self) -> Result<(), UpdateError> {
        let (slot, mut file) = self.staging.take().ok_or(UpdateError::NotActive)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);
        fs::rename(self.staging_path(slot), self.slot_path(slot))?;
        info!(slot, "Update image finalised");
        Ok(())
    }

    fn set_boot(&mut self, slot: SlotId) -> Result<(), UpdateError> {
        let name = if slot == SLOT_A { "a" } else { "b" };
        fs::write(self.dir.join(BOOT_MARKER), name)?;
        info!(slot, "Boot slot updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_slots(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cfglink-slots-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_full_update_cycle() {
        let dir = temp_slots("cycle");
        let mut slots = FileSlots::new(&dir).unwrap();

        // Fresh device boots slot A, so updates target slot B.
        assert_eq!(slots.boot_slot(), SLOT_A);
        let target = slots.next_slot().unwrap();
        assert_eq!(target, SLOT_B);

        slots.begin(target).unwrap();
        slots.write(b"firmware ").unwrap();
        slots.write(b"image").unwrap();
        slots.end().unwrap();
        slots.set_boot(target).unwrap();

        assert_eq!(fs::read(dir.join("slot_b.bin")).unwrap(), b"firmware image");
        assert!(!dir.join("slot_b.bin.staging").exists());
        assert_eq!(slots.boot_slot(), SLOT_B);
        // The next update targets the now-inactive slot A.
        assert_eq!(slots.next_slot(), Some(SLOT_A));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_abort_removes_staging() {
        let dir = temp_slots("abort");
        let mut slots = FileSlots::new(&dir).unwrap();
        let target = slots.next_slot().unwrap();
        slots.begin(target).unwrap();
        slots.write(b"partial").unwrap();
        slots.abort().unwrap();

        assert!(!dir.join("slot_b.bin.staging").exists());
        assert!(!dir.join("slot_b.bin").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_double_begin_rejected() {
        let dir = temp_slots("double");
        let mut slots = FileSlots::new(&dir).unwrap();
        slots.begin(SLOT_B).unwrap();
        assert!(matches!(slots.begin(SLOT_B), Err(UpdateError::AlreadyActive)));
        slots.abort().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_without_begin_rejected() {
        let dir = temp_slots("nobegin");
        let mut slots = FileSlots::new(&dir).unwrap();
        assert!(matches!(slots.write(b"x"), Err(UpdateError::NotActive)));
        let _ = fs::remove_dir_all(&dir);
    }
}
