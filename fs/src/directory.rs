//! Directory Table
//!
//! A directory is a fixed table of 64 named entries, each pointing at the
//! header sector of a file or of a sub-directory. Directories are stored as
//! ordinary files whose contents are the packed entry table.
//!
//! # Entry image (19 bytes, little-endian)
//!
//! ```text
//! +-----------+----------------+------------+----------+
//! | inUse (1) | name (10, NUL) | sector (4) | kind (4) |
//! +-----------+----------------+------------+----------+
//! ```

use crate::disk::SectorIo;
use crate::error::{FsError, FsResult};
use crate::filehdr::FileHeader;
use crate::openfile::OpenFile;
use crate::{DIRECTORY_FILE_SIZE, DIR_ENTRY_SIZE, FILE_NAME_MAX_LEN, NUM_DIR_ENTRIES};
use bytes::{Buf, BufMut};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What a directory entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EntryKind {
    /// An ordinary file
    File = 0,
    /// A sub-directory
    Directory = 1,
}

impl TryFrom<i32> for EntryKind {
    type Error = FsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EntryKind::File),
            1 => Ok(EntryKind::Directory),
            _ => Err(FsError::Io(format!("unknown directory entry kind {value}"))),
        }
    }
}

/// One named entry of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry name, at most [`FILE_NAME_MAX_LEN`] bytes
    pub name: String,
    /// Sector holding the entry's file header
    pub sector: u32,
    pub kind: EntryKind,
}

/// Fixed-capacity table of named entries
#[derive(Debug, Clone)]
pub struct Directory {
    slots: Vec<Option<DirectoryEntry>>,
}

impl Directory {
    /// An empty directory
    pub fn new() -> Self {
        Self {
            slots: vec![None; NUM_DIR_ENTRIES],
        }
    }

    /// Iterate over the in-use entries
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.slots.iter().flatten()
    }

    /// Index of the slot holding `name`
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.name == name))
    }

    /// Look up `name` at this level only
    pub fn find(&self, name: &str) -> Option<(u32, EntryKind)> {
        self.find_index(name)
            .and_then(|i| self.slots[i].as_ref())
            .map(|e| (e.sector, e.kind))
    }

    /// Depth-first search for `name` anywhere under this directory.
    ///
    /// Returns the first match in table order. Path resolution never uses
    /// this; it exists for explicit find-anywhere queries only, since the
    /// first match for a duplicated name depends on traversal order.
    pub fn find_anywhere(&self, disk: &Arc<dyn SectorIo>, name: &str) -> FsResult<Option<u32>> {
        if let Some((sector, _)) = self.find(name) {
            return Ok(Some(sector));
        }
        for entry in self.entries() {
            if entry.kind == EntryKind::Directory {
                let mut file = OpenFile::open(disk.clone(), entry.sector)?;
                let sub = Directory::fetch_from(&mut file)?;
                if let Some(found) = sub.find_anywhere(disk, name)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Add an entry into the lowest free slot
    pub fn add(&mut self, name: &str, sector: u32, kind: EntryKind) -> FsResult<()> {
        if name.is_empty() || name.len() > FILE_NAME_MAX_LEN {
            return Err(FsError::InvalidPath(name.into()));
        }
        if self.find_index(name).is_some() {
            return Err(FsError::AlreadyExists(name.into()));
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::NoSpace)?;
        self.slots[slot] = Some(DirectoryEntry {
            name: name.into(),
            sector,
            kind,
        });
        Ok(())
    }

    /// Mark the entry for `name` free.
    ///
    /// With `file_only`, refuses to remove a sub-directory entry. Does not
    /// cascade into the entry's contents; callers choose.
    pub fn remove(&mut self, name: &str, file_only: bool) -> FsResult<()> {
        let index = self
            .find_index(name)
            .ok_or_else(|| FsError::NotFound(name.into()))?;
        if file_only
            && self.slots[index]
                .as_ref()
                .is_some_and(|e| e.kind == EntryKind::Directory)
        {
            return Err(FsError::TypeMismatch(format!("{name} is a directory")));
        }
        self.slots[index] = None;
        Ok(())
    }

    /// Post-order walk collecting every sector owned by the subtree under
    /// this directory: each entry's header sector, its chained header
    /// sectors, and its data sectors.
    pub fn collect_subtree(
        &self,
        disk: &Arc<dyn SectorIo>,
        doomed: &mut BTreeSet<u32>,
    ) -> FsResult<()> {
        for entry in self.entries() {
            if entry.kind == EntryKind::Directory {
                let mut file = OpenFile::open(disk.clone(), entry.sector)?;
                let sub = Directory::fetch_from(&mut file)?;
                sub.collect_subtree(disk, doomed)?;
            }
            let header = FileHeader::fetch_from(disk, entry.sector)?;
            header.chain_sectors(doomed);
            doomed.insert(entry.sector);
        }
        Ok(())
    }

    /// Render the listing at `depth`, descending into sub-directories when
    /// `recursive`. Entries print as `[F] name` / `[D] name`, indented three
    /// spaces per level.
    pub fn list(
        &self,
        disk: &Arc<dyn SectorIo>,
        depth: usize,
        recursive: bool,
        out: &mut String,
    ) -> FsResult<()> {
        for entry in self.entries() {
            for _ in 0..depth {
                out.push_str("   ");
            }
            match entry.kind {
                EntryKind::File => {
                    out.push_str("[F] ");
                    out.push_str(&entry.name);
                    out.push('\n');
                }
                EntryKind::Directory => {
                    out.push_str("[D] ");
                    out.push_str(&entry.name);
                    out.push('\n');
                    if recursive {
                        let mut file = OpenFile::open(disk.clone(), entry.sector)?;
                        let sub = Directory::fetch_from(&mut file)?;
                        sub.list(disk, depth + 1, true, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read the whole entry table from the backing file
    pub fn fetch_from(file: &mut OpenFile) -> FsResult<Self> {
        let mut image = vec![0u8; DIRECTORY_FILE_SIZE];
        file.read_at(&mut image, 0)?;

        let mut buf = &image[..];
        let mut slots = Vec::with_capacity(NUM_DIR_ENTRIES);
        for _ in 0..NUM_DIR_ENTRIES {
            let in_use = buf.get_u8() != 0;
            let mut name_bytes = [0u8; FILE_NAME_MAX_LEN + 1];
            buf.copy_to_slice(&mut name_bytes);
            let sector = buf.get_i32_le();
            let kind = buf.get_i32_le();
            if in_use {
                let end = name_bytes
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(name_bytes.len());
                slots.push(Some(DirectoryEntry {
                    name: String::from_utf8_lossy(&name_bytes[..end]).into_owned(),
                    sector: sector as u32,
                    kind: EntryKind::try_from(kind)?,
                }));
            } else {
                slots.push(None);
            }
        }
        Ok(Self { slots })
    }

    /// Write the whole entry table to the backing file
    pub fn write_back(&self, file: &mut OpenFile) -> FsResult<()> {
        let mut image = Vec::with_capacity(DIRECTORY_FILE_SIZE);
        for slot in &self.slots {
            match slot {
                Some(entry) => {
                    image.put_u8(1);
                    let mut name_bytes = [0u8; FILE_NAME_MAX_LEN + 1];
                    let n = entry.name.len().min(FILE_NAME_MAX_LEN);
                    name_bytes[..n].copy_from_slice(&entry.name.as_bytes()[..n]);
                    image.put_slice(&name_bytes);
                    image.put_i32_le(entry.sector as i32);
                    image.put_i32_le(entry.kind as i32);
                }
                None => image.put_bytes(0, DIR_ENTRY_SIZE),
            }
        }
        file.write_at(&image, 0)?;
        Ok(())
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find() {
        let mut dir = Directory::new();
        dir.add("a", 10, EntryKind::File).unwrap();
        dir.add("b", 11, EntryKind::Directory).unwrap();

        assert_eq!(dir.find("a"), Some((10, EntryKind::File)));
        assert_eq!(dir.find("b"), Some((11, EntryKind::Directory)));
        assert_eq!(dir.find("c"), None);
        assert_eq!(dir.find_index("b"), Some(1));
    }

    #[test]
    fn test_add_duplicate() {
        let mut dir = Directory::new();
        dir.add("a", 10, EntryKind::File).unwrap();
        assert!(matches!(
            dir.add("a", 11, EntryKind::File),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_add_name_too_long() {
        let mut dir = Directory::new();
        assert!(matches!(
            dir.add("abcdefghij", 10, EntryKind::File),
            Err(FsError::InvalidPath(_))
        ));
        dir.add("abcdefghi", 10, EntryKind::File).unwrap();
    }

    #[test]
    fn test_table_full() {
        let mut dir = Directory::new();
        for i in 0..NUM_DIR_ENTRIES {
            dir.add(&format!("f{i}"), i as u32, EntryKind::File).unwrap();
        }
        assert_eq!(
            dir.add("extra", 999, EntryKind::File),
            Err(FsError::NoSpace)
        );
    }

    #[test]
    fn test_remove_reuses_lowest_slot() {
        let mut dir = Directory::new();
        dir.add("a", 1, EntryKind::File).unwrap();
        dir.add("b", 2, EntryKind::File).unwrap();
        dir.add("c", 3, EntryKind::File).unwrap();

        dir.remove("b", true).unwrap();
        assert_eq!(dir.find("b"), None);

        dir.add("d", 4, EntryKind::File).unwrap();
        assert_eq!(dir.find_index("d"), Some(1));
    }

    #[test]
    fn test_remove_file_only_refuses_directory() {
        let mut dir = Directory::new();
        dir.add("sub", 5, EntryKind::Directory).unwrap();
        assert!(matches!(
            dir.remove("sub", true),
            Err(FsError::TypeMismatch(_))
        ));
        // Still present, then removable without the restriction
        assert!(dir.find("sub").is_some());
        dir.remove("sub", false).unwrap();
        assert_eq!(dir.find("sub"), None);
    }

    #[test]
    fn test_remove_missing() {
        let mut dir = Directory::new();
        assert!(matches!(dir.remove("ghost", false), Err(FsError::NotFound(_))));
    }
}
