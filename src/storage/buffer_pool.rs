use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, RwLock,
};

use log::debug;

use crate::{
    database::Database,
    error::DbError,
    storage::{
        heap::{heap_page::HeapPage, page_id::HeapPageID},
        tuple::{Tuple, WrappedTuple},
    },
    transaction::{
        concurrent_status::{ConcurrentStatus, Permission},
        Transaction,
    },
    types::{ConcurrentHashMap, DbResult, Pod, ResultPod},
    utils::HandyRwLock,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Default number of pages the cache may hold at once.
pub const DEFAULT_PAGES: usize = 50;

/// The page cache, and the only legal path to a page for a transaction.
/// Every `get_page` goes through the lock table first, so whoever holds a
/// page reference also holds the matching page lock. Dirty pages are pinned
/// in memory until their transaction completes (NO STEAL) and are written
/// out at commit time (FORCE).
pub struct BufferPool {
    buffer: ConcurrentHashMap<HeapPageID, Pod<HeapPage>>,
    capacity: AtomicUsize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            buffer: ConcurrentHashMap::new(),
            capacity: AtomicUsize::new(DEFAULT_PAGES),
        }
    }

    pub fn clear(&self) {
        self.buffer.clear();
    }

    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::Relaxed);
    }

    pub fn get_page_size() -> usize {
        PAGE_SIZE.load(Ordering::Relaxed)
    }

    pub fn reset_page_size() {
        PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::Relaxed);
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Number of pages currently cached.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Retrieve the specified page with the associated permissions. Blocks
    /// until the matching page lock is granted and fails with a
    /// transaction-aborted error when the wait times out.
    ///
    /// A cached page is returned as-is; a miss is read through the owning
    /// table and installed, evicting one clean page when the pool is full.
    pub fn get_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &HeapPageID,
    ) -> ResultPod<HeapPage> {
        ConcurrentStatus::acquire_lock(tx, &perm.to_lock(), pid)?;

        if let Some(page_rc) = self.buffer.get(pid) {
            return Ok(page_rc);
        }

        // stage 1: get the owning table
        let table_rc = Database::catalog()
            .get_table(&pid.get_table_id())
            .ok_or_else(|| DbError::database(&format!("table {} not found", pid.get_table_id())))?;

        // stage 2: read the page content from disk
        let page = table_rc.rl().read_page(pid)?;
        let page_rc = Arc::new(RwLock::new(page));

        // stage 3: install, evicting a clean page if the pool is full
        let mut buffer = self.buffer.get_inner_wl();
        if let Some(existing) = buffer.get(pid) {
            // another thread brought the page in while we were reading; the
            // cache must keep exactly one version of every page
            return Ok(existing.clone());
        }

        while buffer.len() >= self.get_capacity() {
            // NO STEAL: dirty pages are pinned until their transaction
            // completes, only a clean page may be dropped
            let victim = buffer
                .iter()
                .find(|(_, page_rc)| page_rc.rl().is_dirty().is_none())
                .map(|(victim_pid, _)| *victim_pid);
            match victim {
                Some(victim_pid) => {
                    buffer.remove(&victim_pid);
                    debug!("evicted clean page {}", victim_pid);
                }
                None => return Err(DbError::database("unable evict dirty page")),
            }
        }

        buffer.insert(*pid, page_rc.clone());
        Ok(page_rc)
    }

    /// Release one page lock before the transaction completes.
    ///
    /// WARNING: breaks the strict two-phase-locking protocol; see
    /// [`ConcurrentStatus::release_page`]. Using it is very risky.
    pub fn release_page(&self, tx: &Transaction, pid: &HeapPageID) {
        Database::mut_concurrent_status().release_page(tx, pid);
    }

    pub fn holds_lock(&self, tx: &Transaction, pid: &HeapPageID) -> bool {
        Database::concurrent_status().holds_lock(tx, pid)
    }

    /// Finish the transaction: flush its pages on commit (FORCE), drop its
    /// cached pages on abort (the disk still has the pre-transaction images
    /// thanks to NO STEAL), then release all of its locks.
    pub fn tx_complete(&self, tx: &Transaction, commit: bool) -> DbResult {
        if commit {
            self.flush_pages(tx)?;
        } else {
            for pid in self.buffer.keys() {
                if Database::concurrent_status().holds_lock(tx, &pid) {
                    self.discard_page(&pid);
                }
            }
        }

        Database::mut_concurrent_status().release_all(tx);
        Ok(())
    }

    /// Write all pages of the specified transaction to disk and mark them
    /// clean.
    fn flush_pages(&self, tx: &Transaction) -> DbResult {
        for pid in self.buffer.keys() {
            if Database::concurrent_status().holds_lock(tx, &pid) {
                self.flush_page(&pid)?;
            }
        }
        Ok(())
    }

    /// Flush all dirty pages to disk.
    ///
    /// NB: Be careful using this routine -- it writes dirty data to disk and
    /// therefore breaks NO STEAL when invoked while transactions are in
    /// flight. Dirty marks are left untouched.
    pub fn flush_all_pages(&self) -> DbResult {
        for pid in self.buffer.keys() {
            let dirty = match self.buffer.get(&pid) {
                Some(page_rc) => page_rc.rl().is_dirty().is_some(),
                None => false,
            };
            if dirty {
                self.write_through(&pid)?;
            }
        }
        Ok(())
    }

    /// Write the content of a specific page to disk and clear its dirty
    /// mark. Does not evict.
    fn flush_page(&self, pid: &HeapPageID) -> DbResult {
        self.write_through(pid)?;
        if let Some(page_rc) = self.buffer.get(pid) {
            page_rc.wl().mark_dirty(None);
        }
        Ok(())
    }

    fn write_through(&self, pid: &HeapPageID) -> DbResult {
        let page_rc = match self.buffer.get(pid) {
            Some(page_rc) => page_rc,
            None => return Ok(()),
        };

        let table_rc = Database::catalog()
            .get_table(&pid.get_table_id())
            .ok_or_else(|| DbError::database(&format!("table {} not found", pid.get_table_id())))?;

        debug!("flushing page {}", pid);
        let page = page_rc.rl();
        let result = table_rc.rl().write_page(&page);
        result
    }

    /// Remove the specific page id from the buffer pool without flushing.
    /// Needed on abort so the pool doesn't keep a rolled-back page in its
    /// cache.
    pub fn discard_page(&self, pid: &HeapPageID) {
        self.buffer.remove(pid);
    }

    /// Add a tuple to the specified table on behalf of the transaction.
    /// Every page dirtied by the operation is marked with the transaction
    /// id; the pages are already cached because the table routes its writes
    /// through `get_page`.
    pub fn insert_tuple(&self, tx: &Transaction, table_id: u32, tuple: &Tuple) -> DbResult {
        let table_rc = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::database(&format!("table {} not found", table_id)))?;

        let dirtied = table_rc.rl().insert_tuple(tx, tuple)?;
        self.install_dirtied(tx, dirtied);
        Ok(())
    }

    /// Remove the tuple from its table on behalf of the transaction.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &WrappedTuple) -> DbResult {
        let table_id = tuple.get_record_id().pid.get_table_id();
        let table_rc = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::database(&format!("table {} not found", table_id)))?;

        let dirtied = table_rc.rl().delete_tuple(tx, tuple)?;
        self.install_dirtied(tx, dirtied);
        Ok(())
    }

    // Mark the pages a mutation touched and put them (back) into the cache,
    // overwriting whatever version is there. The page may have been evicted
    // between the mutation and this call; re-installing it keeps the dirty
    // version the one every later request sees.
    fn install_dirtied(&self, tx: &Transaction, dirtied: Vec<Pod<HeapPage>>) {
        for page_rc in dirtied {
            page_rc.wl().mark_dirty(Some(tx));
            let pid = page_rc.rl().get_pid();
            self.buffer.insert(pid, page_rc);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
