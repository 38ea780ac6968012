use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use crate::common::types::{FrameId, PageBuf, PageHandle, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::page_table::ExtendibleHashTable;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

const PAGE_TABLE_BUCKET_SIZE: usize = 50;

/// One slot of the frame pool. The content buffer is shared out to callers
/// behind its own reader/writer latch; the metadata here is only ever
/// touched under the pool mutex.
struct Frame {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
    buf: PagePtr,
}

impl Frame {
    fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
            buf: Arc::new(RwLock::new(PageBuf::new())),
        }
    }

    /// Restore the free-frame invariant: invalid id, unpinned, clean, zeroed.
    fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
        self.buf.write().reset();
    }
}

/// Everything the pool mutex guards. Exactly one of three states per frame:
/// free (on the free list), resident-pinned (in the page table, pin > 0, not
/// in the replacer), or resident-unpinned (in the page table, pin == 0, in
/// the replacer).
struct PoolState {
    frames: Vec<Frame>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruReplacer<FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Fixed-size frame cache over the disk manager.
///
/// A single coarse mutex guards all frame metadata and is held for the whole
/// of every operation, disk I/O included. That serialises page misses but
/// keeps the pin/replacer/page-table state transitions trivially atomic.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Mutex<PoolState>,
    disk_manager: Arc<dyn DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            frames.push(Frame::new());
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            state: Mutex::new(PoolState {
                frames,
                page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
                replacer: LruReplacer::new(),
                free_list,
            }),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Pin a page, reading it from disk if it is not resident. Fails with
    /// `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageHandle, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.find(&page_id) {
            state.frames[frame_id].pin_count += 1;
            state.replacer.erase(&frame_id);
            return Ok(PageHandle::new(page_id, state.frames[frame_id].buf.clone()));
        }

        let frame_id = Self::find_victim(&mut state, self.disk_manager.as_ref())?;

        let read_result = {
            let frame = &mut state.frames[frame_id];
            let mut guard = frame.buf.write();
            self.disk_manager.read_page(page_id, &mut guard.data)
        };
        if let Err(e) = read_result {
            // The frame is already reset; hand it back to the free list.
            state.free_list.push_back(frame_id);
            return Err(e.into());
        }

        let frame = &mut state.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;

        state.page_table.insert(page_id, frame_id);
        Ok(PageHandle::new(page_id, state.frames[frame_id].buf.clone()))
    }

    /// Allocate a fresh page on disk and pin it. The page starts dirty so it
    /// reaches the disk even if the caller never writes to it.
    pub fn new_page(&self) -> Result<(PageHandle, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = Self::find_victim(&mut state, self.disk_manager.as_ref())?;

        let page_id = match self.disk_manager.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e.into());
            }
        };

        let frame = &mut state.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = true;

        state.page_table.insert(page_id, frame_id);
        debug!("allocated page {} in frame {}", page_id, frame_id);
        Ok((PageHandle::new(page_id, state.frames[frame_id].buf.clone()), page_id))
    }

    /// Drop one pin. The dirty flag is sticky: once set it survives until
    /// the page is flushed or evicted.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = state
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        frame.pin_count -= 1;
        if is_dirty {
            frame.is_dirty = true;
        }
        if frame.pin_count == 0 {
            state.replacer.insert(frame_id);
        }
        Ok(())
    }

    /// Write a resident page through to disk if dirty. A clean flush is a
    /// no-op.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        let frame_id = state
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        if state.frames[frame_id].is_dirty {
            {
                let guard = state.frames[frame_id].buf.read();
                self.disk_manager.write_page(page_id, &guard.data)?;
            }
            state.frames[frame_id].is_dirty = false;
        }
        Ok(())
    }

    /// Flush every dirty resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        for frame in state.frames.iter_mut() {
            if frame.page_id != INVALID_PAGE_ID && frame.is_dirty {
                {
                    let guard = frame.buf.read();
                    self.disk_manager.write_page(frame.page_id, &guard.data)?;
                }
                frame.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Evict a page from the pool and deallocate it on disk. A pinned page
    /// cannot be evicted and yields `PagePinned` — but the disk-level
    /// deallocation still runs; callers must not delete pages they have
    /// pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.find(&page_id) {
            if state.frames[frame_id].pin_count != 0 {
                self.disk_manager.deallocate_page(page_id)?;
                return Err(BufferPoolError::PagePinned(page_id));
            }
            state.frames[frame_id].reset();
            state.replacer.erase(&frame_id);
            state.page_table.remove(&page_id);
            state.free_list.push_back(frame_id);
        }

        self.disk_manager.deallocate_page(page_id)?;
        Ok(())
    }

    /// Current pin count of a resident page. Test introspection.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .find(&page_id)
            .map(|frame_id| state.frames[frame_id].pin_count)
    }

    /// True when no frame holds a pin. Test introspection.
    pub fn all_pages_unpinned(&self) -> bool {
        let state = self.state.lock();
        state.frames.iter().all(|frame| frame.pin_count == 0)
    }

    /// Pick a frame for reuse: free list first, then the replacer. An
    /// evicted frame has its dirty contents written back and is reset to the
    /// free-frame invariant before being returned.
    fn find_victim(
        state: &mut PoolState,
        disk_manager: &dyn DiskManager,
    ) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            debug_assert_eq!(state.frames[frame_id].page_id, INVALID_PAGE_ID);
            debug_assert_eq!(state.frames[frame_id].pin_count, 0);
            debug_assert!(!state.frames[frame_id].is_dirty);
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .victim()
            .ok_or(BufferPoolError::BufferPoolFull)?;
        debug_assert_eq!(state.frames[frame_id].pin_count, 0);

        let old_page_id = state.frames[frame_id].page_id;
        if state.frames[frame_id].is_dirty {
            let write_result = {
                let guard = state.frames[frame_id].buf.read();
                disk_manager.write_page(old_page_id, &guard.data)
            };
            if let Err(e) = write_result {
                state.replacer.insert(frame_id);
                return Err(e.into());
            }
            state.frames[frame_id].is_dirty = false;
        }

        trace!("evicting page {} from frame {}", old_page_id, frame_id);
        state.page_table.remove(&old_page_id);
        state.frames[frame_id].reset();
        Ok(frame_id)
    }
}
