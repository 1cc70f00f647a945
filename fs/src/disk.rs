//! Sector Device Abstraction
//!
//! Abstract interface for sector-addressed disk I/O with:
//! - In-memory implementation for tests and demos
//! - Image-file implementation simulating a physical disk
//!
//! Every transfer moves exactly one [`SECTOR_SIZE`]-byte sector. Disks are
//! shared as `Arc<dyn SectorIo>` between the file system and open files.

use crate::error::{FsError, FsResult};
use crate::SECTOR_SIZE;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::RwLock;

/// Sector-addressed disk interface
pub trait SectorIo: Send + Sync {
    /// Read one sector into `buf`
    fn read_sector(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> FsResult<()>;

    /// Write one sector from `buf`
    fn write_sector(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> FsResult<()>;

    /// Number of sectors on the device
    fn num_sectors(&self) -> usize;
}

/// In-memory disk for testing
pub struct MemoryDisk {
    sectors: RwLock<Vec<[u8; SECTOR_SIZE]>>,
}

impl MemoryDisk {
    /// Create a zero-filled disk with `num_sectors` sectors
    pub fn new(num_sectors: usize) -> Self {
        Self {
            sectors: RwLock::new(vec![[0u8; SECTOR_SIZE]; num_sectors]),
        }
    }

    fn check_range(&self, sector: u32) -> FsResult<usize> {
        let index = sector as usize;
        if index >= self.num_sectors() {
            return Err(FsError::Io(format!(
                "sector {} out of range (disk has {})",
                sector,
                self.num_sectors()
            )));
        }
        Ok(index)
    }
}

impl SectorIo for MemoryDisk {
    fn read_sector(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> FsResult<()> {
        let index = self.check_range(sector)?;
        let sectors = self
            .sectors
            .read()
            .map_err(|e| FsError::Io(e.to_string()))?;
        buf.copy_from_slice(&sectors[index]);
        Ok(())
    }

    fn write_sector(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> FsResult<()> {
        let index = self.check_range(sector)?;
        let mut sectors = self
            .sectors
            .write()
            .map_err(|e| FsError::Io(e.to_string()))?;
        sectors[index].copy_from_slice(buf);
        Ok(())
    }

    fn num_sectors(&self) -> usize {
        self.sectors.read().map(|s| s.len()).unwrap_or(0)
    }
}

/// Disk backed by a raw image file on the host
///
/// The image holds the sectors back to back; its length is always a
/// multiple of [`SECTOR_SIZE`].
pub struct ImageDisk {
    file: RwLock<std::fs::File>,
    num_sectors: usize,
}

impl ImageDisk {
    /// Create (or truncate) an image with `num_sectors` zeroed sectors
    pub fn create(path: &Path, num_sectors: usize) -> FsResult<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.set_len((num_sectors * SECTOR_SIZE) as u64)
            .map_err(|e| FsError::Io(e.to_string()))?;
        tracing::debug!(target: "fs", path = %path.display(), num_sectors, "created disk image");
        Ok(Self {
            file: RwLock::new(file),
            num_sectors,
        })
    }

    /// Open an existing image; the sector count is derived from its length
    pub fn open(path: &Path) -> FsResult<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| FsError::Io(e.to_string()))?;
        let len = file
            .metadata()
            .map_err(|e| FsError::Io(e.to_string()))?
            .len() as usize;
        if len == 0 || len % SECTOR_SIZE != 0 {
            return Err(FsError::Io(format!(
                "disk image {} has length {}, not a multiple of the sector size",
                path.display(),
                len
            )));
        }
        Ok(Self {
            file: RwLock::new(file),
            num_sectors: len / SECTOR_SIZE,
        })
    }

    fn check_range(&self, sector: u32) -> FsResult<u64> {
        if sector as usize >= self.num_sectors {
            return Err(FsError::Io(format!(
                "sector {} out of range (disk has {})",
                sector, self.num_sectors
            )));
        }
        Ok(sector as u64 * SECTOR_SIZE as u64)
    }
}

impl SectorIo for ImageDisk {
    fn read_sector(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> FsResult<()> {
        let offset = self.check_range(sector)?;
        let mut file = self.file.write().map_err(|e| FsError::Io(e.to_string()))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.read_exact(buf).map_err(|e| FsError::Io(e.to_string()))
    }

    fn write_sector(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> FsResult<()> {
        let offset = self.check_range(sector)?;
        let mut file = self.file.write().map_err(|e| FsError::Io(e.to_string()))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.write_all(buf).map_err(|e| FsError::Io(e.to_string()))
    }

    fn num_sectors(&self) -> usize {
        self.num_sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_disk_round_trip() {
        let disk = MemoryDisk::new(4);
        let mut out = [0u8; SECTOR_SIZE];
        let mut data = [0u8; SECTOR_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }

        disk.write_sector(2, &data).unwrap();
        disk.read_sector(2, &mut out).unwrap();
        assert_eq!(out, data);

        // Untouched sectors stay zeroed
        disk.read_sector(0, &mut out).unwrap();
        assert_eq!(out, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn test_memory_disk_out_of_range() {
        let disk = MemoryDisk::new(4);
        let mut buf = [0u8; SECTOR_SIZE];
        assert!(matches!(
            disk.read_sector(4, &mut buf),
            Err(FsError::Io(_))
        ));
        assert!(matches!(disk.write_sector(9, &buf), Err(FsError::Io(_))));
    }
}
