//! Linked-Index File Header
//!
//! Each file header is a fixed-size index block holding direct pointers to
//! data sectors; it is sized to occupy exactly one disk sector. Files longer
//! than one header's direct array are represented as a chain of headers.
//!
//! # Header image (one sector, little-endian)
//!
//! ```text
//! +-----------+-------------+--------------------+------------------------+
//! | bytes (4) | sectors (4) | next sector (4)    | direct pointers (4x29) |
//! +-----------+-------------+--------------------+------------------------+
//! |<--------------------------- 128 bytes ---------------------------->|
//! ```
//!
//! The in-memory chain node and the persisted image are distinct: the image
//! stores the successor's sector number (`u32::MAX` when the chain ends),
//! and `fetch_from` rebuilds the in-memory links by following it.
//!
//! Invariant: every header with a successor is full, i.e. covers
//! [`MAX_FILE_SIZE`] bytes through all [`NUM_DIRECT`] direct pointers.

use crate::disk::SectorIo;
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::{MAX_FILE_SIZE, NUM_DIRECT, SECTOR_NONE, SECTOR_SIZE};
use bytes::{Buf, BufMut};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A link to the next header in a chain
#[derive(Debug, Clone)]
struct HeaderLink {
    /// Sector holding the successor's image
    sector: u32,
    header: FileHeader,
}

/// One index block of a file, possibly chained
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Bytes of the file covered by this header (<= [`MAX_FILE_SIZE`])
    num_bytes: u32,
    /// Direct pointers to data sectors, in file order
    data_sectors: Vec<u32>,
    next: Option<Box<HeaderLink>>,
}

impl FileHeader {
    /// Fresh header for a file about to be allocated
    pub fn new() -> Self {
        Self {
            num_bytes: 0,
            data_sectors: Vec::new(),
            next: None,
        }
    }

    /// Allocate data sectors for a file of `file_size` bytes.
    ///
    /// This header takes up to [`MAX_FILE_SIZE`] bytes; any remainder goes
    /// into a freshly allocated chained header, recursively. On failure the
    /// partially updated free map must be discarded by the caller (nothing
    /// has been flushed to disk).
    pub fn allocate(&mut self, free_map: &mut FreeMap, file_size: usize) -> FsResult<()> {
        let take = file_size.min(MAX_FILE_SIZE);
        let remainder = file_size - take;
        let need = take.div_ceil(SECTOR_SIZE);

        if free_map.num_clear() < need {
            return Err(FsError::NoSpace);
        }
        self.num_bytes = take as u32;
        for _ in 0..need {
            let sector = free_map
                .find_and_set()
                .expect("free map exhausted after num_clear check");
            self.data_sectors.push(sector);
        }

        if remainder > 0 {
            let sector = free_map.find_and_set().ok_or(FsError::NoSpace)?;
            let mut header = FileHeader::new();
            header.allocate(free_map, remainder)?;
            self.next = Some(Box::new(HeaderLink { sector, header }));
        }
        Ok(())
    }

    /// Release every data sector and every chained header sector.
    ///
    /// The sector holding this header's own image is the caller's to clear.
    pub fn deallocate(&self, free_map: &mut FreeMap) {
        for &sector in &self.data_sectors {
            free_map.clear(sector);
        }
        if let Some(link) = &self.next {
            free_map.clear(link.sector);
            link.header.deallocate(free_map);
        }
    }

    /// Collect every sector reachable from this header (data sectors and
    /// chained header sectors, not the head's own sector) into `out`.
    pub fn chain_sectors(&self, out: &mut BTreeSet<u32>) {
        for &sector in &self.data_sectors {
            out.insert(sector);
        }
        if let Some(link) = &self.next {
            out.insert(link.sector);
            link.header.chain_sectors(out);
        }
    }

    /// Load a header chain starting at `sector`
    pub fn fetch_from(disk: &Arc<dyn SectorIo>, sector: u32) -> FsResult<Self> {
        let mut image = [0u8; SECTOR_SIZE];
        disk.read_sector(sector, &mut image)?;

        let mut buf = &image[..];
        let num_bytes = buf.get_u32_le();
        let num_sectors = buf.get_u32_le() as usize;
        let next_sector = buf.get_u32_le();
        assert!(
            num_sectors <= NUM_DIRECT,
            "corrupt header at sector {sector}: {num_sectors} direct pointers"
        );
        let data_sectors = (0..num_sectors).map(|_| buf.get_u32_le()).collect();

        let next = if next_sector != SECTOR_NONE {
            let header = FileHeader::fetch_from(disk, next_sector)?;
            Some(Box::new(HeaderLink {
                sector: next_sector,
                header,
            }))
        } else {
            None
        };

        Ok(Self {
            num_bytes,
            data_sectors,
            next,
        })
    }

    /// Write the whole chain back, this header at `sector`
    pub fn write_back(&self, disk: &Arc<dyn SectorIo>, sector: u32) -> FsResult<()> {
        let mut image = [0u8; SECTOR_SIZE];
        {
            let mut buf = &mut image[..];
            buf.put_u32_le(self.num_bytes);
            buf.put_u32_le(self.data_sectors.len() as u32);
            buf.put_u32_le(match &self.next {
                Some(link) => link.sector,
                None => SECTOR_NONE,
            });
            for slot in 0..NUM_DIRECT {
                buf.put_u32_le(self.data_sectors.get(slot).copied().unwrap_or(SECTOR_NONE));
            }
        }
        disk.write_sector(sector, &image)?;

        if let Some(link) = &self.next {
            link.header.write_back(disk, link.sector)?;
        }
        Ok(())
    }

    /// Translate a byte offset to the data sector storing it.
    ///
    /// The offset must be mapped; a missing chained header is a bug in the
    /// caller's bounds handling.
    pub fn byte_to_sector(&self, offset: usize) -> u32 {
        let index = offset / SECTOR_SIZE;
        if index < NUM_DIRECT {
            self.data_sectors[index]
        } else {
            self.next
                .as_ref()
                .expect("byte offset beyond the header chain")
                .header
                .byte_to_sector(offset - MAX_FILE_SIZE)
        }
    }

    /// Total file length: the sum of bytes covered along the chain
    pub fn file_length(&self) -> usize {
        let mut total = 0usize;
        let mut header = self;
        loop {
            total += header.num_bytes as usize;
            match &header.next {
                Some(link) => header = &link.header,
                None => return total,
            }
        }
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
