use crate::{
    database::Database,
    error::DbError,
    storage::{heap::page_id::HeapPageID, tuple::WrappedTuple},
    transaction::{concurrent_status::Permission, Transaction},
    utils::HandyRwLock,
};

/// Page-at-a-time scan over a heap table. Every page fetch goes through the
/// buffer pool with a read permission, so the scan sees the same versions
/// (including pages dirtied by its own transaction) as everyone else, and
/// the page count is re-read on each advance so pages appended mid-scan are
/// picked up.
///
/// A page fetch can time out waiting for a lock; that abort is part of the
/// scan's contract. `try_next` returns it directly. The plain `Iterator`
/// interface cannot, so there `next` ends the scan and parks the error in
/// [`SequentialScan::error`] for the driver to check before trusting an
/// exhausted scan.
pub struct SequentialScan {
    tx: Transaction,
    table_id: u32,

    /// index of the next page to fetch
    next_page_index: u32,

    /// snapshot of the current page's occupied slots
    tuples: Vec<WrappedTuple>,
    cursor: usize,

    err: Option<DbError>,
}

impl SequentialScan {
    pub fn new(tx: &Transaction, table_id: u32) -> Self {
        Self {
            tx: tx.clone(),
            table_id,
            next_page_index: 0,
            tuples: Vec::new(),
            cursor: 0,
            err: None,
        }
    }

    /// Restart the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page_index = 0;
        self.tuples.clear();
        self.cursor = 0;
        self.err = None;
    }

    /// Fallible advance. A lock timeout while fetching the next page comes
    /// back as a transaction-aborted error; the caller is expected to stop
    /// scanning, unwind, and abort its transaction.
    pub fn try_next(&mut self) -> Result<Option<WrappedTuple>, DbError> {
        loop {
            if self.cursor < self.tuples.len() {
                let tuple = self.tuples[self.cursor].clone();
                self.cursor += 1;
                return Ok(Some(tuple));
            }

            if !self.load_next_page()? {
                return Ok(None);
            }
        }
    }

    /// The error that ended the scan, if the plain `Iterator` interface hit
    /// one. `None` after a clean exhaustion.
    pub fn error(&self) -> Option<&DbError> {
        self.err.as_ref()
    }

    fn pages_count(&self) -> usize {
        let table_rc = match Database::catalog().get_table(&self.table_id) {
            Some(table_rc) => table_rc,
            None => return 0,
        };
        let count = table_rc.rl().pages_count();
        count
    }

    fn load_next_page(&mut self) -> Result<bool, DbError> {
        while (self.next_page_index as usize) < self.pages_count() {
            let pid = HeapPageID::new(self.table_id, self.next_page_index);
            self.next_page_index += 1;

            let page_rc =
                Database::buffer_pool().get_page(&self.tx, Permission::ReadOnly, &pid)?;

            let tuples: Vec<WrappedTuple> = page_rc.rl().iterator().collect();
            if tuples.is_empty() {
                continue;
            }

            self.tuples = tuples;
            self.cursor = 0;
            return Ok(true);
        }

        Ok(false)
    }
}

impl Iterator for SequentialScan {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        match self.try_next() {
            Ok(tuple) => tuple,
            Err(e) => {
                self.err = Some(e);
                None
            }
        }
    }
}
