//! SeedOS File System
//!
//! A persistent, hierarchical file system built over a simulated
//! sector-addressed disk.
//!
//! # Architecture
//!
//! The file system is layered, leaves first:
//!
//! 1. **Sector device** - the [`SectorIo`] trait plus an in-memory and an
//!    image-file backed implementation
//! 2. **Free map** - a persistent bitmap arbitrating sector ownership
//! 3. **File header** - a linked chain of fixed-size index blocks holding
//!    direct pointers to data sectors
//! 4. **Directory** - a fixed 64-entry table of named entries, itself stored
//!    as an ordinary file
//! 5. **File system** - path resolution and the namespace operations
//!    (create, mkdir, open, remove, list)
//!
//! # On-disk layout
//!
//! ```text
//! +----------+----------+------------------------------------------+
//! | Sector 0 | Sector 1 | Data sectors                             |
//! | free-map | root-dir | (allocated through the free map)         |
//! | header   | header   |                                          |
//! +----------+----------+------------------------------------------+
//! ```
//!
//! Both well-known files (the free map and the root directory) are ordinary
//! files whose headers live at fixed sectors so the file system can find
//! them on boot.
//!
//! # Key concepts
//!
//! - **Sector**: fixed 128-byte unit of disk transfer
//! - **Header chain**: linked list of header sectors representing a file
//!   longer than one header's direct array
//! - **Free map**: on-disk bitmap marking which sectors are allocated
//!
//! The file system assumes single-threaded entry; every public call holds
//! exclusive access. Files have a fixed size, set at creation.

pub mod directory;
pub mod disk;
pub mod error;
pub mod filehdr;
pub mod filesys;
pub mod freemap;
pub mod openfile;

pub use directory::{Directory, DirectoryEntry, EntryKind};
pub use disk::{ImageDisk, MemoryDisk, SectorIo};
pub use error::{FsError, FsResult};
pub use filehdr::FileHeader;
pub use filesys::FileSystem;
pub use freemap::FreeMap;
pub use openfile::OpenFile;

/// Bytes per disk sector.
pub const SECTOR_SIZE: usize = 128;

/// Sectors per disk.
pub const NUM_SECTORS: usize = 1024;

/// Direct sector pointers per file header (header fits exactly one sector).
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 3 * 4) / 4;

/// Bytes addressed by a single header's direct array.
pub const MAX_FILE_SIZE: usize = NUM_DIRECT * SECTOR_SIZE;

/// Well-known sector of the free-map file header.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Well-known sector of the root directory file header.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// Size of the free-map backing file (one bit per sector).
pub const FREE_MAP_FILE_SIZE: usize = NUM_SECTORS / 8;

/// Maximum length of a single path component.
pub const FILE_NAME_MAX_LEN: usize = 9;

/// Entries per directory.
pub const NUM_DIR_ENTRIES: usize = 64;

/// Packed on-disk size of one directory entry.
pub const DIR_ENTRY_SIZE: usize = 1 + (FILE_NAME_MAX_LEN + 1) + 4 + 4;

/// Size of a directory's backing file.
pub const DIRECTORY_FILE_SIZE: usize = NUM_DIR_ENTRIES * DIR_ENTRY_SIZE;

/// Maximum length of a full path.
pub const MAX_PATH_LEN: usize = 255;

/// Sentinel for "no sector" in on-disk images (the -1 of the wire format).
pub const SECTOR_NONE: u32 = u32::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry() {
        assert_eq!(NUM_DIRECT, 29);
        assert_eq!(MAX_FILE_SIZE, 3712);
        assert_eq!(FREE_MAP_FILE_SIZE, 128);
        assert_eq!(DIR_ENTRY_SIZE, 19);
        assert_eq!(DIRECTORY_FILE_SIZE, 1216);
    }
}
