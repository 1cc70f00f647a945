//! System Call Surface
//!
//! Thin numeric wrappers over the file system and the open-file table, with
//! the return-code ABI user programs see:
//! - `Create` and `Close` return 1 on success, 0 on failure
//! - `Open` returns an id in 1..=20, or 0 on failure
//! - `Read` and `Write` return the byte count, or -1 for a bad id
//!
//! Errors never escape as `Err` here; they are folded into the codes after
//! being logged.

use crate::filetable::OpenFileId;
use crate::{Kernel, KernelError, KernelResult};
use seedos_fs::FileSystem;

impl Kernel {
    fn fs_mut(&mut self) -> KernelResult<&mut FileSystem> {
        self.file_system.as_mut().ok_or(KernelError::NoFileSystem)
    }

    /// Create a file of `initial_size` bytes; 1 on success, 0 on failure
    pub fn sys_create(&mut self, path: &str, initial_size: usize) -> i32 {
        let outcome = self
            .fs_mut()
            .and_then(|fs| fs.create(path, initial_size).map_err(KernelError::from));
        match outcome {
            Ok(()) => 1,
            Err(e) => {
                tracing::debug!(target: "sys", path, %e, "create failed");
                0
            }
        }
    }

    /// Open a file; the returned id is 0 on failure
    pub fn sys_open(&mut self, path: &str) -> OpenFileId {
        let outcome = (|| -> KernelResult<OpenFileId> {
            let file = self.fs_mut()?.open(path)?;
            self.file_table.open(file)
        })();
        match outcome {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(target: "sys", path, %e, "open failed");
                0
            }
        }
    }

    /// Read from the file bound to `id` at its cursor; -1 for a bad id
    pub fn sys_read(&mut self, buf: &mut [u8], id: OpenFileId) -> i32 {
        match self
            .file_table
            .get_mut(id)
            .and_then(|file| file.read(buf).map_err(KernelError::from))
        {
            Ok(n) => n as i32,
            Err(e) => {
                tracing::debug!(target: "sys", id, %e, "read failed");
                -1
            }
        }
    }

    /// Write to the file bound to `id` at its cursor; -1 for a bad id
    pub fn sys_write(&mut self, buf: &[u8], id: OpenFileId) -> i32 {
        match self
            .file_table
            .get_mut(id)
            .and_then(|file| file.write(buf).map_err(KernelError::from))
        {
            Ok(n) => n as i32,
            Err(e) => {
                tracing::debug!(target: "sys", id, %e, "write failed");
                -1
            }
        }
    }

    /// Close the file bound to `id`; 1 on success, 0 on failure
    pub fn sys_close(&mut self, id: OpenFileId) -> i32 {
        match self.file_table.close(id) {
            Ok(()) => 1,
            Err(e) => {
                tracing::debug!(target: "sys", id, %e, "close failed");
                0
            }
        }
    }

    /// Stop the machine
    pub fn sys_halt(&mut self) {
        tracing::info!("machine halting");
        self.halted = true;
    }
}

#[cfg(test)]
mod tests {
    use crate::machine::TraceSwitch;
    use crate::sys::scheduler::SchedPolicy;
    use crate::Kernel;
    use seedos_fs::{FileSystem, MemoryDisk, SectorIo, NUM_SECTORS, SECTOR_SIZE};
    use std::sync::Arc;

    fn kernel_with_fs() -> Kernel {
        let (switch, _) = TraceSwitch::new();
        let mut kernel = Kernel::new(SchedPolicy::default(), Box::new(switch));
        let disk: Arc<dyn SectorIo> = Arc::new(MemoryDisk::new(NUM_SECTORS));
        kernel.mount_file_system(FileSystem::new(disk, true).unwrap());
        kernel
    }

    #[test]
    fn test_create_open_write_read_close() {
        let mut kernel = kernel_with_fs();

        assert_eq!(kernel.sys_create("/data", 2 * SECTOR_SIZE), 1);
        let id = kernel.sys_open("/data");
        assert_eq!(id, 1);

        assert_eq!(kernel.sys_write(b"hello from user space", id), 21);

        // A second handle has its own cursor
        let id2 = kernel.sys_open("/data");
        assert_eq!(id2, 2);
        let mut buf = [0u8; 21];
        assert_eq!(kernel.sys_read(&mut buf, id2), 21);
        assert_eq!(&buf, b"hello from user space");

        assert_eq!(kernel.sys_close(id), 1);
        assert_eq!(kernel.sys_close(id2), 1);
    }

    #[test]
    fn test_failure_codes() {
        let mut kernel = kernel_with_fs();

        assert_eq!(kernel.sys_create("relative", 10), 0);
        assert_eq!(kernel.sys_open("/missing"), 0);

        let mut buf = [0u8; 4];
        assert_eq!(kernel.sys_read(&mut buf, 0), -1);
        assert_eq!(kernel.sys_write(&buf, 7), -1);
        assert_eq!(kernel.sys_close(3), 0);
        // Closing twice fails the second time
        assert_eq!(kernel.sys_create("/f", 8), 1);
        let id = kernel.sys_open("/f");
        assert_eq!(kernel.sys_close(id), 1);
        assert_eq!(kernel.sys_close(id), 0);
    }

    #[test]
    fn test_halt() {
        let mut kernel = kernel_with_fs();
        assert!(!kernel.halted());
        kernel.sys_halt();
        assert!(kernel.halted());
    }
}
