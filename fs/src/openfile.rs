//! Open File Handle
//!
//! Binds a loaded file-header chain to a byte cursor. Positional reads and
//! writes translate byte offsets to sectors through the header and move
//! whole sectors over the device, read-modify-writing the partial ones.
//!
//! Files have a fixed size: reads clamp at end of file and writes clamp at
//! the capacity fixed when the file was created.

use crate::disk::SectorIo;
use crate::error::FsResult;
use crate::filehdr::FileHeader;
use crate::SECTOR_SIZE;
use std::sync::Arc;

/// In-memory handle to a file on the simulated disk
#[derive(Clone)]
pub struct OpenFile {
    disk: Arc<dyn SectorIo>,
    header: FileHeader,
    header_sector: u32,
    pos: usize,
}

impl OpenFile {
    /// Open the file whose header chain starts at `sector`
    pub fn open(disk: Arc<dyn SectorIo>, sector: u32) -> FsResult<Self> {
        let header = FileHeader::fetch_from(&disk, sector)?;
        Ok(Self {
            disk,
            header,
            header_sector: sector,
            pos: 0,
        })
    }

    /// Total file length in bytes
    pub fn length(&self) -> usize {
        self.header.file_length()
    }

    /// Sector holding the head of the header chain
    pub fn header_sector(&self) -> u32 {
        self.header_sector
    }

    /// The loaded header chain
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Move the cursor to an absolute byte position
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Current cursor position
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Read at the cursor, advancing it. Returns the bytes transferred.
    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let n = self.read_at(buf, self.pos)?;
        self.pos += n;
        Ok(n)
    }

    /// Write at the cursor, advancing it. Returns the bytes transferred.
    pub fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        let n = self.write_at(buf, self.pos)?;
        self.pos += n;
        Ok(n)
    }

    /// Read up to `buf.len()` bytes starting at `offset`, clamped at end of
    /// file. Returns the bytes transferred.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> FsResult<usize> {
        let len = buf.len().min(self.length().saturating_sub(offset));
        let mut copied = 0;
        let mut sector_buf = [0u8; SECTOR_SIZE];

        while copied < len {
            let pos = offset + copied;
            let within = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within).min(len - copied);
            let sector = self.header.byte_to_sector(pos);
            self.disk.read_sector(sector, &mut sector_buf)?;
            buf[copied..copied + chunk].copy_from_slice(&sector_buf[within..within + chunk]);
            copied += chunk;
        }
        Ok(len)
    }

    /// Write up to `buf.len()` bytes starting at `offset`, clamped at the
    /// file's fixed capacity. Returns the bytes transferred.
    pub fn write_at(&mut self, buf: &[u8], offset: usize) -> FsResult<usize> {
        let len = buf.len().min(self.length().saturating_sub(offset));
        let mut copied = 0;
        let mut sector_buf = [0u8; SECTOR_SIZE];

        while copied < len {
            let pos = offset + copied;
            let within = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within).min(len - copied);
            let sector = self.header.byte_to_sector(pos);
            if chunk < SECTOR_SIZE {
                // Partial sector: preserve the bytes around the span
                self.disk.read_sector(sector, &mut sector_buf)?;
            }
            sector_buf[within..within + chunk].copy_from_slice(&buf[copied..copied + chunk]);
            self.disk.write_sector(sector, &sector_buf)?;
            copied += chunk;
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDisk;
    use crate::freemap::FreeMap;
    use crate::{MAX_FILE_SIZE, NUM_SECTORS};

    /// Allocate a file of `size` bytes directly on a fresh disk, header at
    /// sector 0, and open it.
    fn open_fresh(size: usize) -> OpenFile {
        let disk: Arc<dyn SectorIo> = Arc::new(MemoryDisk::new(NUM_SECTORS));
        let mut map = FreeMap::new();
        map.mark(0);
        let mut hdr = FileHeader::new();
        hdr.allocate(&mut map, size).unwrap();
        hdr.write_back(&disk, 0).unwrap();
        OpenFile::open(disk, 0).unwrap()
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut file = open_fresh(3 * SECTOR_SIZE);
        let data: Vec<u8> = (0..3 * SECTOR_SIZE).map(|i| i as u8).collect();

        assert_eq!(file.write_at(&data, 0).unwrap(), data.len());
        let mut out = vec![0u8; data.len()];
        assert_eq!(file.read_at(&mut out, 0).unwrap(), data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_unaligned_offsets() {
        let mut file = open_fresh(4 * SECTOR_SIZE);
        let data = vec![0xabu8; 200];

        // Starts mid-sector, ends mid-sector two sectors later
        assert_eq!(file.write_at(&data, 100).unwrap(), 200);
        let mut out = vec![0u8; 200];
        file.read_at(&mut out, 100).unwrap();
        assert_eq!(out, data);

        // Bytes around the span are untouched
        let mut edge = [0u8; 1];
        file.read_at(&mut edge, 99).unwrap();
        assert_eq!(edge[0], 0);
        file.read_at(&mut edge, 300).unwrap();
        assert_eq!(edge[0], 0);
    }

    #[test]
    fn test_read_clamps_at_eof() {
        let mut file = open_fresh(100);
        file.write_at(&[1u8; 100], 0).unwrap();

        let mut out = vec![0u8; 200];
        assert_eq!(file.read_at(&mut out, 0).unwrap(), 100);
        assert_eq!(file.read_at(&mut out, 60).unwrap(), 40);
        assert_eq!(file.read_at(&mut out, 100).unwrap(), 0);
        assert_eq!(file.read_at(&mut out, 500).unwrap(), 0);
    }

    #[test]
    fn test_write_clamps_at_capacity() {
        let mut file = open_fresh(100);
        assert_eq!(file.write_at(&[2u8; 200], 0).unwrap(), 100);
        assert_eq!(file.write_at(&[2u8; 10], 100).unwrap(), 0);
    }

    #[test]
    fn test_cursor_advances() {
        let mut file = open_fresh(2 * SECTOR_SIZE);
        assert_eq!(file.write(&[7u8; 50]).unwrap(), 50);
        assert_eq!(file.write(&[8u8; 50]).unwrap(), 50);
        assert_eq!(file.tell(), 100);

        file.seek(0);
        let mut out = [0u8; 100];
        assert_eq!(file.read(&mut out).unwrap(), 100);
        assert_eq!(&out[..50], &[7u8; 50]);
        assert_eq!(&out[50..], &[8u8; 50]);
    }

    #[test]
    fn test_spans_header_chain() {
        let size = MAX_FILE_SIZE + 2 * SECTOR_SIZE;
        let mut file = open_fresh(size);
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

        assert_eq!(file.write_at(&data, 0).unwrap(), size);
        let mut out = vec![0u8; size];
        assert_eq!(file.read_at(&mut out, 0).unwrap(), size);
        assert_eq!(out, data);

        // A read straddling the chain boundary
        let mut span = vec![0u8; 256];
        file.read_at(&mut span, MAX_FILE_SIZE - 128).unwrap();
        assert_eq!(span[..], data[MAX_FILE_SIZE - 128..MAX_FILE_SIZE + 128]);
    }
}
