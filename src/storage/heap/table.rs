use core::fmt;
use std::{
    collections::hash_map::DefaultHasher,
    fs,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use log::debug;

use crate::{
    database::Database,
    error::DbError,
    storage::{
        buffer_pool::BufferPool,
        heap::{heap_page::HeapPage, page_id::HeapPageID, table_iter::SequentialScan},
        schema::Schema,
        tuple::{Tuple, WrappedTuple},
    },
    transaction::{concurrent_status::Permission, Transaction},
    types::Pod,
    utils::HandyRwLock,
};

/// An unordered table stored as a sequence of fixed-size pages in a single
/// file: page N lives at byte offset `N * page_size`. Tuple reads and
/// writes are routed through the buffer pool; only raw page io touches the
/// file directly.
pub struct HeapTable {
    file_path: String,

    file: Mutex<File>,

    pub schema: Schema,

    table_id: u32,

    /// number of physical page reads, used by tests to observe cache
    /// behavior
    pub read_count: AtomicUsize,
}

impl HeapTable {
    /// Open (or create) the backing file. An existing file is never
    /// truncated, so constructing a table over old data reattaches to it.
    pub fn new(file_path: &str, schema: &Schema) -> Self {
        let f = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .open(file_path)
            .expect("io error");

        // the id must survive restarts, so it hashes the absolute path and
        // nothing else
        let abs_path = fs::canonicalize(file_path).expect("io error");
        let mut hasher = DefaultHasher::new();
        abs_path.hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        Self {
            file_path: file_path.to_string(),
            file: Mutex::new(f),
            schema: schema.clone(),
            table_id,
            read_count: AtomicUsize::new(0),
        }
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_schema(&self) -> Schema {
        self.schema.clone()
    }

    pub fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    /// Read the page image at the pid's offset. Short reads (a page index
    /// past the end of the file) surface as io errors; caching is the buffer
    /// pool's concern, not ours.
    pub fn read_page(&self, pid: &HeapPageID) -> Result<HeapPage, DbError> {
        let page_size = BufferPool::get_page_size();
        let start_pos = pid.page_index as usize * page_size;

        let mut file = self.get_file();
        file.seek(SeekFrom::Start(start_pos as u64))
            .map_err(|e| DbError::io(&e.to_string()))?;

        let mut buf: Vec<u8> = vec![0; page_size];
        file.read_exact(&mut buf)
            .map_err(|e| DbError::io(&format!("read page {} failed: {}", pid, e)))?;
        self.read_count.fetch_add(1, Ordering::Relaxed);

        Ok(HeapPage::new(pid, &buf, &self.schema))
    }

    /// Write the page image at its offset. Writing at index == pages_count
    /// extends the file by exactly one page.
    pub fn write_page(&self, page: &HeapPage) -> Result<(), DbError> {
        let page_size = BufferPool::get_page_size();
        let pid = page.get_pid();
        let data = page.get_page_data();

        let mut file = self.get_file();
        file.seek(SeekFrom::Start((pid.page_index as usize * page_size) as u64))
            .map_err(|e| DbError::io(&e.to_string()))?;
        file.write_all(&data)
            .map_err(|e| DbError::io(&format!("write page {} failed: {}", pid, e)))?;
        file.flush().map_err(|e| DbError::io(&e.to_string()))?;

        Ok(())
    }

    pub fn pages_count(&self) -> usize {
        let len = self.get_file().metadata().expect("io error").len() as usize;
        let page_size = BufferPool::get_page_size();
        (len + page_size - 1) / page_size
    }

    /// Add the tuple to the first page with a free slot, appending a fresh
    /// page when the table is packed. Returns the dirtied pages (always
    /// exactly one).
    pub fn insert_tuple(
        &self,
        tx: &Transaction,
        tuple: &Tuple,
    ) -> Result<Vec<Pod<HeapPage>>, DbError> {
        // probe with a read lock; only the page we actually write gets the
        // exclusive lock
        for i in 0..self.pages_count() {
            let pid = HeapPageID::new(self.table_id, i as u32);

            let page_rc = Database::buffer_pool().get_page(tx, Permission::ReadOnly, &pid)?;
            if page_rc.rl().empty_slots_count() == 0 {
                continue;
            }

            let page_rc = Database::buffer_pool().get_page(tx, Permission::ReadWrite, &pid)?;
            page_rc.wl().insert_tuple(tuple)?;
            return Ok(vec![page_rc]);
        }

        // every existing page is packed: materialize a new page at the end
        // of the file, then pull it back in through the buffer pool
        let pid = HeapPageID::new(self.table_id, self.pages_count() as u32);
        let mut page = HeapPage::new(&pid, &HeapPage::empty_page_data(), &self.schema);
        page.insert_tuple(tuple)?;
        self.write_page(&page)?;
        debug!(
            "table {} extended to {} pages",
            self.table_id,
            self.pages_count()
        );

        let page_rc = Database::buffer_pool().get_page(tx, Permission::ReadWrite, &pid)?;
        Ok(vec![page_rc])
    }

    /// Remove the tuple from the page recorded in its record id. Returns the
    /// dirtied pages (always exactly one).
    pub fn delete_tuple(
        &self,
        tx: &Transaction,
        tuple: &WrappedTuple,
    ) -> Result<Vec<Pod<HeapPage>>, DbError> {
        let rid = tuple.get_record_id();
        if rid.pid.get_table_id() != self.table_id {
            return Err(DbError::database(&format!(
                "tuple at {:?} does not belong to table {}",
                rid, self.table_id
            )));
        }

        let page_rc = Database::buffer_pool().get_page(tx, Permission::ReadWrite, &rid.pid)?;
        page_rc.wl().delete_tuple(rid.slot_index)?;
        Ok(vec![page_rc])
    }

    pub fn iterator(&self, tx: &Transaction) -> SequentialScan {
        SequentialScan::new(tx, self.table_id)
    }
}

impl fmt::Display for HeapTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<HeapTable, file: {}, id: {}>",
            self.file_path, self.table_id
        )
    }
}
