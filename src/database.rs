use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::OnceCell;

use crate::{
    catalog::Catalog, storage::buffer_pool::BufferPool,
    transaction::concurrent_status::ConcurrentStatus, types::Pod, utils::HandyRwLock,
};

static DB: OnceCell<Database> = OnceCell::new();

/// Process-wide owner of the catalog, the buffer pool and the lock table.
/// One instance lives for the whole process; `reset` drops all cached state
/// (on-disk files are untouched), which is how tests simulate a restart.
pub struct Database {
    catalog: Pod<Catalog>,
    buffer_pool: Pod<BufferPool>,
    concurrent_status: Pod<ConcurrentStatus>,
}

impl Database {
    fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog::new())),
            buffer_pool: Arc::new(RwLock::new(BufferPool::new())),
            concurrent_status: Arc::new(RwLock::new(ConcurrentStatus::new())),
        }
    }

    pub fn global() -> &'static Self {
        DB.get_or_init(Database::new)
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }

    // The buffer pool is a concurrent structure: handing out write guards on
    // it would serialize every page access (and deadlock a transaction that
    // sleeps on a lock while holding one), so only the read accessor exists.
    pub fn buffer_pool() -> RwLockReadGuard<'static, BufferPool> {
        Self::global().buffer_pool.rl()
    }

    pub fn concurrent_status() -> RwLockReadGuard<'static, ConcurrentStatus> {
        Self::global().concurrent_status.rl()
    }

    pub fn mut_concurrent_status() -> RwLockWriteGuard<'static, ConcurrentStatus> {
        Self::global().concurrent_status.wl()
    }

    /// Drop all cached state: registered tables, cached pages, and the lock
    /// table.
    pub fn reset() {
        Self::mut_catalog().clear();
        Self::buffer_pool().clear();
        Self::mut_concurrent_status().clear();
    }
}
