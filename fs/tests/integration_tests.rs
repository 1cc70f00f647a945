//! End-to-end file-system scenarios over an in-memory disk, plus one pass
//! over the image-file backend.

use rand::{Rng, SeedableRng};
use seedos_fs::{
    FileSystem, FsError, ImageDisk, MemoryDisk, SectorIo, MAX_FILE_SIZE, NUM_SECTORS, SECTOR_SIZE,
};
use std::sync::Arc;

fn fresh_fs() -> FileSystem {
    let disk: Arc<dyn SectorIo> = Arc::new(MemoryDisk::new(NUM_SECTORS));
    FileSystem::new(disk, true).unwrap()
}

#[test]
fn create_open_length() {
    let mut fs = fresh_fs();
    fs.create("/f", SECTOR_SIZE * 5).unwrap();

    let file = fs.open("/f").unwrap();
    assert_eq!(file.length(), 5 * SECTOR_SIZE);
}

#[test]
fn nested_tree_listing_and_recursive_remove() {
    let mut fs = fresh_fs();
    let pristine = fs.free_map().unwrap();

    fs.create_directory("/d").unwrap();
    fs.create("/d/g", SECTOR_SIZE).unwrap();

    let listing = fs.list("/", true).unwrap();
    assert_eq!(listing, "[D] d\n   [F] g\n");

    fs.remove("/d", true).unwrap();
    assert_eq!(fs.list("/", true).unwrap(), "");

    // Byte-for-byte back to the post-format state
    let after = fs.free_map().unwrap();
    assert_eq!(after.as_bytes(), pristine.as_bytes());
}

#[test]
fn create_remove_round_trip_law() {
    let mut fs = fresh_fs();
    fs.create("/keep", 64).unwrap();

    let before_map = fs.free_map().unwrap();
    let before_listing = fs.list("/", true).unwrap();

    fs.create("/p", 3 * SECTOR_SIZE).unwrap();
    fs.remove("/p", false).unwrap();

    assert_eq!(fs.free_map().unwrap().as_bytes(), before_map.as_bytes());
    assert_eq!(fs.list("/", true).unwrap(), before_listing);
}

#[test]
fn write_read_round_trip_law() {
    let mut fs = fresh_fs();
    // Long enough to span a three-header chain
    let size = 2 * MAX_FILE_SIZE + 5 * SECTOR_SIZE + 17;
    fs.create("/blob", size).unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let data: Vec<u8> = (0..size).map(|_| rng.gen()).collect();

    let mut file = fs.open("/blob").unwrap();
    assert_eq!(file.write_at(&data, 0).unwrap(), size);

    let mut out = vec![0u8; size];
    assert_eq!(file.read_at(&mut out, 0).unwrap(), size);
    assert_eq!(out, data);

    // Survives a reopen
    let again = fs.open("/blob").unwrap();
    let mut out2 = vec![0u8; size];
    again.read_at(&mut out2, 0).unwrap();
    assert_eq!(out2, data);
}

#[test]
fn deep_tree_recursive_remove_frees_everything() {
    let mut fs = fresh_fs();
    let pristine = fs.free_map().unwrap();

    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/b").unwrap();
    fs.create_directory("/a/b/c").unwrap();
    fs.create("/a/f1", 2 * SECTOR_SIZE).unwrap();
    fs.create("/a/b/f2", MAX_FILE_SIZE + 100).unwrap();
    fs.create("/a/b/c/f3", 0).unwrap();

    fs.remove("/a", true).unwrap();

    assert_eq!(fs.free_map().unwrap().as_bytes(), pristine.as_bytes());
    assert!(matches!(fs.open("/a/b/f2"), Err(FsError::NotFound(_))));
}

#[test]
fn remove_file_inside_subdirectory() {
    let mut fs = fresh_fs();
    fs.create_directory("/d").unwrap();
    fs.create("/d/x", SECTOR_SIZE).unwrap();
    fs.create("/d/y", SECTOR_SIZE).unwrap();

    fs.remove("/d/x", false).unwrap();

    assert!(matches!(fs.open("/d/x"), Err(FsError::NotFound(_))));
    assert!(fs.open("/d/y").is_ok());
    assert_eq!(fs.list("/d", false).unwrap(), "[F] y\n");
}

#[test]
fn listing_indents_by_depth() {
    let mut fs = fresh_fs();
    fs.create_directory("/top").unwrap();
    fs.create_directory("/top/mid").unwrap();
    fs.create("/top/mid/leaf", 8).unwrap();

    let listing = fs.list("/", true).unwrap();
    assert_eq!(listing, "[D] top\n   [D] mid\n      [F] leaf\n");

    // Non-recursive stops at the first level
    assert_eq!(fs.list("/top", false).unwrap(), "[D] mid\n");
}

#[test]
fn duplicate_names_in_different_directories() {
    let mut fs = fresh_fs();
    fs.create_directory("/d1").unwrap();
    fs.create_directory("/d2").unwrap();
    fs.create("/d1/same", 32).unwrap();
    fs.create("/d2/same", 96).unwrap();

    assert_eq!(fs.open("/d1/same").unwrap().length(), 32);
    assert_eq!(fs.open("/d2/same").unwrap().length(), 96);

    fs.remove("/d1/same", false).unwrap();
    assert_eq!(fs.open("/d2/same").unwrap().length(), 96);
}

#[test]
fn image_disk_persists_across_reopen() {
    let mut path = std::env::temp_dir();
    let tag: u32 = rand::thread_rng().gen();
    path.push(format!("seedos-test-{tag:08x}.disk"));

    {
        let disk: Arc<dyn SectorIo> = Arc::new(ImageDisk::create(&path, NUM_SECTORS).unwrap());
        let mut fs = FileSystem::new(disk, true).unwrap();
        fs.create("/persist", 256).unwrap();
        let mut file = fs.open("/persist").unwrap();
        file.write_at(b"written before reopen", 0).unwrap();
    }

    {
        let disk: Arc<dyn SectorIo> = Arc::new(ImageDisk::open(&path).unwrap());
        let fs = FileSystem::new(disk, false).unwrap();
        let file = fs.open("/persist").unwrap();
        let mut buf = [0u8; 21];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"written before reopen");
    }

    let _ = std::fs::remove_file(&path);
}
