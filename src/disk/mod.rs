//! Synchronous, page-granular disk I/O.
//!
//! One file per page under a storage directory, opened fresh on every
//! read/write. No caching lives here — that's the buffer pool's job.

use crate::config::PAGE_SIZE;
use crate::error::DbResult;
use crate::page::PageId;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

#[cfg(test)]
pub fn test_path() -> String {
    use uuid::Uuid;
    format!("data/test/test_{}/", Uuid::new_v4())
}

/// Thread-safe at page granularity: every page lives in its own file, so
/// concurrent reads/writes to different pages never contend, and the buffer
/// pool never issues concurrent I/O against the same `page_id`.
#[derive(Debug)]
pub struct DiskManager {
    dir: PathBuf,
    next_page_id: AtomicI64,
}

impl DiskManager {
    pub fn new(path: &str) -> Self {
        let dir = Path::new(path).to_path_buf();
        std::fs::create_dir_all(&dir).expect("failed to create disk storage directory");
        Self {
            dir,
            next_page_id: AtomicI64::new(0),
        }
    }

    fn page_path(&self, page_id: PageId) -> PathBuf {
        self.dir.join(page_id.to_string())
    }

    /// Monotonic counter for fresh page ids. The buffer pool is the only
    /// caller; it serializes calls behind the pool mutex.
    pub fn allocate_page_id(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> DbResult<()> {
        let mut file = OpenOptions::new().read(true).open(self.page_path(page_id))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> DbResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.page_path(page_id))?;
        file.write_all(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() -> DbResult<()> {
        let path = test_path();
        let disk = DiskManager::new(&path);

        let page_id = disk.allocate_page_id();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        disk.write_page(page_id, &data)?;

        let mut read_back = [0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut read_back)?;
        assert_eq!(data, read_back);

        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    #[test]
    fn test_page_ids_are_monotonic() {
        let path = test_path();
        let disk = DiskManager::new(&path);
        let ids: Vec<_> = (0..5).map(|_| disk.allocate_page_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        let _ = std::fs::remove_dir_all(path);
    }
}
