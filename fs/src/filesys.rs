//! File System
//!
//! Maps textual path names to files and directories. Each file has a header
//! chain stored on disk, a number of data sectors, and an entry in some
//! directory; the free map and the root directory are themselves ordinary
//! files whose headers live at well-known sectors.
//!
//! # Transactional discipline
//!
//! Operations that modify the namespace build their new state in memory
//! first. On any recoverable error the in-memory objects are dropped before
//! anything is flushed, leaving the disk unchanged. Successful operations
//! flush in the order header, directory, free map: a crash before the
//! free-map flush can leak sectors but can never leave a directory entry
//! pointing at unallocated storage.
//!
//! # Path resolution
//!
//! Paths are absolute, `/`-separated, at most 255 bytes, with components of
//! at most 9 bytes. Every interior segment is resolved strictly against its
//! immediate parent; nothing ever searches sub-trees during resolution.

use crate::directory::{Directory, EntryKind};
use crate::disk::SectorIo;
use crate::error::{FsError, FsResult};
use crate::filehdr::FileHeader;
use crate::freemap::FreeMap;
use crate::openfile::OpenFile;
use crate::{
    DIRECTORY_FILE_SIZE, FILE_NAME_MAX_LEN, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, MAX_PATH_LEN,
    ROOT_DIR_SECTOR,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The file system over one sector device
pub struct FileSystem {
    disk: Arc<dyn SectorIo>,
    /// Bit map of free disk sectors, represented as a file
    free_map_file: OpenFile,
    /// Root directory, represented as a file
    directory_file: OpenFile,
}

impl FileSystem {
    /// Initialize the file system.
    ///
    /// With `format`, the disk is assumed empty: the free map and the root
    /// directory are created from scratch, their headers written to the
    /// well-known sectors. Otherwise the two well-known files are opened
    /// from the existing disk contents.
    pub fn new(disk: Arc<dyn SectorIo>, format: bool) -> FsResult<Self> {
        if !format {
            let free_map_file = OpenFile::open(disk.clone(), FREE_MAP_SECTOR)?;
            let directory_file = OpenFile::open(disk.clone(), ROOT_DIR_SECTOR)?;
            return Ok(Self {
                disk,
                free_map_file,
                directory_file,
            });
        }

        tracing::debug!(target: "fs", "formatting the file system");
        let mut free_map = FreeMap::new();
        // The two well-known header sectors are never up for grabs
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIR_SECTOR);

        let mut map_hdr = FileHeader::new();
        map_hdr.allocate(&mut free_map, FREE_MAP_FILE_SIZE)?;
        let mut dir_hdr = FileHeader::new();
        dir_hdr.allocate(&mut free_map, DIRECTORY_FILE_SIZE)?;

        // Headers must hit the disk before the files can be opened, since
        // opening reads the header back off the (so far empty) disk
        map_hdr.write_back(&disk, FREE_MAP_SECTOR)?;
        dir_hdr.write_back(&disk, ROOT_DIR_SECTOR)?;

        let mut free_map_file = OpenFile::open(disk.clone(), FREE_MAP_SECTOR)?;
        let mut directory_file = OpenFile::open(disk.clone(), ROOT_DIR_SECTOR)?;

        free_map.write_back(&mut free_map_file)?;
        Directory::new().write_back(&mut directory_file)?;

        Ok(Self {
            disk,
            free_map_file,
            directory_file,
        })
    }

    /// The sector device this file system lives on
    pub fn disk(&self) -> &Arc<dyn SectorIo> {
        &self.disk
    }

    /// Current free-map state, fetched from disk
    pub fn free_map(&mut self) -> FsResult<FreeMap> {
        FreeMap::fetch_from(&mut self.free_map_file)
    }

    fn flush_free_map(&mut self, free_map: &FreeMap) -> FsResult<()> {
        free_map.write_back(&mut self.free_map_file)
    }

    /// Split a validated path into interior directory segments and the
    /// final name.
    fn split_path(path: &str) -> FsResult<(Vec<&str>, &str)> {
        if path.len() > MAX_PATH_LEN {
            return Err(FsError::InvalidPath(format!("path longer than {MAX_PATH_LEN}")));
        }
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| FsError::InvalidPath(format!("{path}: paths must be absolute")))?;
        if rest.is_empty() {
            return Err(FsError::InvalidPath("the root has no name".into()));
        }
        let mut segments: Vec<&str> = rest.split('/').collect();
        for segment in &segments {
            if segment.is_empty() || segment.len() > FILE_NAME_MAX_LEN {
                return Err(FsError::InvalidPath(format!("bad path component {segment:?}")));
            }
        }
        let name = segments.pop().expect("split of a non-empty path");
        Ok((segments, name))
    }

    /// Walk `segments` from the root, strictly one directory at a time.
    /// Returns the final directory and its backing file.
    fn resolve_dir(&self, segments: &[&str]) -> FsResult<(Directory, OpenFile)> {
        let mut dir_file = self.directory_file.clone();
        let mut dir = Directory::fetch_from(&mut dir_file)?;
        for &segment in segments {
            match dir.find(segment) {
                Some((sector, EntryKind::Directory)) => {
                    dir_file = OpenFile::open(self.disk.clone(), sector)?;
                    dir = Directory::fetch_from(&mut dir_file)?;
                }
                Some((_, EntryKind::File)) => {
                    return Err(FsError::TypeMismatch(format!(
                        "{segment} is a file, not a directory"
                    )));
                }
                None => return Err(FsError::NotFound(segment.into())),
            }
        }
        Ok((dir, dir_file))
    }

    /// Create a file of `initial_size` bytes at `path`.
    ///
    /// Files cannot grow, so the size is fixed here. Fails if the name
    /// already exists, the parent directory is full, or the disk lacks
    /// space for the header and data sectors.
    pub fn create(&mut self, path: &str, initial_size: usize) -> FsResult<()> {
        let (dirs, name) = Self::split_path(path)?;
        let (mut parent, mut parent_file) = self.resolve_dir(&dirs)?;

        if parent.find(name).is_some() {
            return Err(FsError::AlreadyExists(path.into()));
        }

        let mut free_map = self.free_map()?;
        let header_sector = free_map.find_and_set().ok_or(FsError::NoSpace)?;
        parent.add(name, header_sector, EntryKind::File)?;

        let mut header = FileHeader::new();
        header.allocate(&mut free_map, initial_size)?;

        // Everything worked: flush header, then directory, then free map
        header.write_back(&self.disk, header_sector)?;
        parent.write_back(&mut parent_file)?;
        self.flush_free_map(&free_map)?;

        tracing::debug!(target: "fs", path, initial_size, header_sector, "created file");
        Ok(())
    }

    /// Create an empty directory at `path`
    pub fn create_directory(&mut self, path: &str) -> FsResult<()> {
        let (dirs, name) = Self::split_path(path)?;
        let (mut parent, mut parent_file) = self.resolve_dir(&dirs)?;

        if parent.find(name).is_some() {
            return Err(FsError::AlreadyExists(path.into()));
        }

        let mut free_map = self.free_map()?;
        let header_sector = free_map.find_and_set().ok_or(FsError::NoSpace)?;
        parent.add(name, header_sector, EntryKind::Directory)?;

        let mut header = FileHeader::new();
        header.allocate(&mut free_map, DIRECTORY_FILE_SIZE)?;

        header.write_back(&self.disk, header_sector)?;
        let mut backing = OpenFile::open(self.disk.clone(), header_sector)?;
        Directory::new().write_back(&mut backing)?;
        parent.write_back(&mut parent_file)?;
        self.flush_free_map(&free_map)?;

        tracing::debug!(target: "fs", path, header_sector, "created directory");
        Ok(())
    }

    /// Open the object at `path` for reading and writing
    pub fn open(&self, path: &str) -> FsResult<OpenFile> {
        let (dirs, name) = Self::split_path(path)?;
        let (parent, _) = self.resolve_dir(&dirs)?;
        match parent.find(name) {
            Some((sector, _)) => OpenFile::open(self.disk.clone(), sector),
            None => Err(FsError::NotFound(path.into())),
        }
    }

    /// Remove the object at `path`.
    ///
    /// Without `recursive`, directories are refused. With it, the whole
    /// subtree is walked post-order once, every owned sector collected, and
    /// the free map updated in a single pass.
    pub fn remove(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        let (dirs, name) = Self::split_path(path)?;
        let (mut parent, mut parent_file) = self.resolve_dir(&dirs)?;
        let (sector, kind) = parent
            .find(name)
            .ok_or_else(|| FsError::NotFound(path.into()))?;

        let mut doomed = BTreeSet::new();
        if kind == EntryKind::Directory {
            if !recursive {
                return Err(FsError::TypeMismatch(format!("{path} is a directory")));
            }
            let mut target_file = OpenFile::open(self.disk.clone(), sector)?;
            let target = Directory::fetch_from(&mut target_file)?;
            target.collect_subtree(&self.disk, &mut doomed)?;
        }
        let header = FileHeader::fetch_from(&self.disk, sector)?;
        header.chain_sectors(&mut doomed);
        doomed.insert(sector);

        let mut free_map = self.free_map()?;
        for &s in &doomed {
            free_map.clear(s);
        }
        parent.remove(name, false)?;

        // Directory first: a crash here leaks sectors, never dangles
        parent.write_back(&mut parent_file)?;
        self.flush_free_map(&free_map)?;

        tracing::debug!(target: "fs", path, recursive, freed = doomed.len(), "removed");
        Ok(())
    }

    /// Render the listing of the directory at `path` (the root for `/`)
    pub fn list(&self, path: &str, recursive: bool) -> FsResult<String> {
        let mut out = String::new();
        if path == "/" {
            let mut root_file = self.directory_file.clone();
            let root = Directory::fetch_from(&mut root_file)?;
            root.list(&self.disk, 0, recursive, &mut out)?;
            return Ok(out);
        }

        let (dirs, name) = Self::split_path(path)?;
        let (parent, _) = self.resolve_dir(&dirs)?;
        match parent.find(name) {
            Some((sector, EntryKind::Directory)) => {
                let mut dir_file = OpenFile::open(self.disk.clone(), sector)?;
                let dir = Directory::fetch_from(&mut dir_file)?;
                dir.list(&self.disk, 0, recursive, &mut out)?;
                Ok(out)
            }
            Some((_, EntryKind::File)) => {
                Err(FsError::TypeMismatch(format!("{path} is not a directory")))
            }
            None => Err(FsError::NotFound(path.into())),
        }
    }

    /// Depth-first search for a bare name anywhere in the tree; first match
    /// in traversal order wins
    pub fn find_anywhere(&self, name: &str) -> FsResult<Option<u32>> {
        let mut root_file = self.directory_file.clone();
        let root = Directory::fetch_from(&mut root_file)?;
        root.find_anywhere(&self.disk, name)
    }
}
