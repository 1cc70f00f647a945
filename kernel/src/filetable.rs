//! Per-Process Open-File Table
//!
//! A fixed array of 20 slots mapping small integer ids to open files. Ids
//! are 1-based so that 0 stays free to signal failure on the syscall
//! surface.

use crate::{KernelError, KernelResult};
use seedos_fs::OpenFile;

/// Open-file slots per process
pub const OPEN_FILE_SLOTS: usize = 20;

/// User-visible open-file id; 0 is never a valid id
pub type OpenFileId = i32;

/// Fixed table of open files for one process
pub struct FileTable {
    slots: [Option<OpenFile>; OPEN_FILE_SLOTS],
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Bind `file` to the lowest free slot and return its id
    pub fn open(&mut self, file: OpenFile) -> KernelResult<OpenFileId> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::SlotExhausted)?;
        self.slots[slot] = Some(file);
        Ok(slot as OpenFileId + 1)
    }

    /// Release the slot bound to `id`.
    ///
    /// Closing an id that is out of range or already free fails without
    /// side effect.
    pub fn close(&mut self, id: OpenFileId) -> KernelResult<()> {
        let slot = Self::slot_index(id)?;
        if self.slots[slot].is_none() {
            return Err(KernelError::InvalidFileId(id));
        }
        self.slots[slot] = None;
        Ok(())
    }

    /// The open file bound to `id`
    pub fn get_mut(&mut self, id: OpenFileId) -> KernelResult<&mut OpenFile> {
        let slot = Self::slot_index(id)?;
        self.slots[slot]
            .as_mut()
            .ok_or(KernelError::InvalidFileId(id))
    }

    /// Number of occupied slots
    pub fn num_open(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn slot_index(id: OpenFileId) -> KernelResult<usize> {
        if (1..=OPEN_FILE_SLOTS as OpenFileId).contains(&id) {
            Ok((id - 1) as usize)
        } else {
            Err(KernelError::InvalidFileId(id))
        }
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
