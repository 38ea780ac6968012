use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use onyxdb::common::types::{PageId, PAGE_SIZE};
use onyxdb::storage::buffer::BufferPoolManager;
use onyxdb::storage::disk::{DiskManager, DiskManagerError, FileDiskManager};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager over a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(FileDiskManager::new(path)?);
    Ok((Arc::new(BufferPoolManager::new(pool_size, disk_manager)), file))
}

// Create a buffer pool manager whose disk traffic can be inspected
#[allow(dead_code)]
pub fn create_counting_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, Arc<CountingDiskManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(CountingDiskManager::new(path)?);
    Ok((
        Arc::new(BufferPoolManager::new(pool_size, disk_manager.clone())),
        disk_manager,
        file,
    ))
}

/// Disk manager wrapper that records which pages were written and
/// deallocated.
pub struct CountingDiskManager {
    inner: FileDiskManager,
    writes: Mutex<Vec<PageId>>,
    deallocations: Mutex<Vec<PageId>>,
}

impl CountingDiskManager {
    #[allow(dead_code)]
    pub fn new(path: String) -> Result<Self, DiskManagerError> {
        Ok(Self {
            inner: FileDiskManager::new(path)?,
            writes: Mutex::new(Vec::new()),
            deallocations: Mutex::new(Vec::new()),
        })
    }

    #[allow(dead_code)]
    pub fn writes_to(&self, page_id: PageId) -> usize {
        self.writes.lock().iter().filter(|&&id| id == page_id).count()
    }

    #[allow(dead_code)]
    pub fn deallocations_of(&self, page_id: PageId) -> usize {
        self.deallocations
            .lock()
            .iter()
            .filter(|&&id| id == page_id)
            .count()
    }
}

impl DiskManager for CountingDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        self.inner.read_page(page_id, buf)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        self.writes.lock().push(page_id);
        self.inner.write_page(page_id, buf)
    }

    fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        self.inner.allocate_page()
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskManagerError> {
        self.deallocations.lock().push(page_id);
        self.inner.deallocate_page(page_id)
    }
}
