use core::fmt;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
    thread::sleep,
    time::{Duration, Instant},
};

use log::debug;
use rand::Rng;

use crate::{
    database::Database, error::DbError, storage::heap::page_id::HeapPageID,
    transaction::Transaction, types::DbResult,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

static TIMEOUT_SECS: AtomicU64 = AtomicU64::new(DEFAULT_TIMEOUT_SECS);

// retry window for a denied lock request, in milliseconds
const RETRY_MIN_MS: u64 = 500;
const RETRY_MAX_MS: u64 = 550;

#[derive(Debug, PartialEq)]
pub enum Lock {
    XLock,
    SLock,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

/// The lock table: page-granularity shared/exclusive locks held by live
/// transactions. A single `RwLock` around the whole structure (owned by
/// [`Database`]) serializes every operation; the critical sections are
/// O(holders of one page), so contention stays tolerable.
pub struct ConcurrentStatus {
    s_lock_map: HashMap<HeapPageID, HashSet<Transaction>>,
    x_lock_map: HashMap<HeapPageID, Transaction>,
    hold_pages: HashMap<Transaction, HashSet<HeapPageID>>,
}

impl ConcurrentStatus {
    pub fn new() -> Self {
        Self {
            s_lock_map: HashMap::new(),
            x_lock_map: HashMap::new(),
            hold_pages: HashMap::new(),
        }
    }

    pub fn set_timeout(secs: u64) {
        TIMEOUT_SECS.store(secs, Ordering::Relaxed);
    }

    pub fn get_timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECS.load(Ordering::Relaxed))
    }

    /// Request a lock on the given page. This api is blocking: a denied
    /// request is retried after a randomized sleep until the cumulative wait
    /// exceeds the configured timeout, at which point the requesting
    /// transaction is told to abort. The randomization breaks livelock
    /// between symmetric waiters; the timeout is what resolves deadlocks.
    pub fn acquire_lock(tx: &Transaction, lock: &Lock, page_id: &HeapPageID) -> DbResult {
        let start_time = Instant::now();
        loop {
            // acquire RwLock on "concurrent_status"
            {
                let mut concurrent_status = Database::mut_concurrent_status();
                if concurrent_status.add_lock(tx, lock, page_id) {
                    return Ok(());
                }
            }
            // release RwLock on "concurrent_status"

            if start_time.elapsed() >= Self::get_timeout() {
                let err = DbError::aborted(&format!(
                    "acquire lock timeout, args: {:?}, {:?}, {:?}",
                    tx, lock, page_id,
                ));
                debug!("{}", err);
                return Err(err);
            }

            let mut rng = rand::thread_rng();
            sleep(Duration::from_millis(rng.gen_range(RETRY_MIN_MS, RETRY_MAX_MS)));
        }
    }

    // Add a lock to the given page. This api is idempotent and never blocks;
    // waiting is the caller's concern.
    //
    // # Return
    //
    // Whether the lock is now held by the transaction at the requested
    // strength (or stronger).
    fn add_lock(&mut self, tx: &Transaction, lock: &Lock, page_id: &HeapPageID) -> bool {
        if let Some(holder) = self.x_lock_map.get(page_id) {
            if holder != tx {
                return false;
            }
            // tx already holds the exclusive lock, which covers both
            // request kinds
            return true;
        }

        match lock {
            Lock::SLock => {
                self.s_lock_map
                    .entry(*page_id)
                    .or_insert_with(HashSet::new)
                    .insert(tx.clone());
            }
            Lock::XLock => {
                if let Some(holders) = self.s_lock_map.get(page_id) {
                    if holders.iter().any(|holder| holder != tx) {
                        return false;
                    }
                }

                // either nobody reads the page, or tx is the sole reader:
                // the shared entry (if any) is replaced by the exclusive one
                if let Some(holders) = self.s_lock_map.get_mut(page_id) {
                    holders.remove(tx);
                    if holders.is_empty() {
                        self.s_lock_map.remove(page_id);
                    }
                }
                self.x_lock_map.insert(*page_id, tx.clone());
            }
        }

        self.hold_pages
            .entry(tx.clone())
            .or_insert_with(HashSet::new)
            .insert(*page_id);
        true
    }

    /// Remove every lock held by the transaction. Called at the
    /// commit/abort boundary, which is what makes the locking strict
    /// two-phase.
    pub fn release_all(&mut self, tx: &Transaction) {
        if let Some(pages) = self.hold_pages.remove(tx) {
            for page_id in pages {
                self.remove_lock(tx, &page_id);
            }
        }
    }

    /// Release a single page before the transaction completes.
    ///
    /// WARNING: this forfeits the strict two-phase-locking guarantee for the
    /// calling transaction; a value read under the released lock may change
    /// before the transaction finishes. Using it is very risky.
    pub fn release_page(&mut self, tx: &Transaction, page_id: &HeapPageID) {
        self.remove_lock(tx, page_id);
        if let Some(pages) = self.hold_pages.get_mut(tx) {
            pages.remove(page_id);
            if pages.is_empty() {
                self.hold_pages.remove(tx);
            }
        }
    }

    fn remove_lock(&mut self, tx: &Transaction, page_id: &HeapPageID) {
        if let Some(holders) = self.s_lock_map.get_mut(page_id) {
            holders.remove(tx);
            if holders.is_empty() {
                self.s_lock_map.remove(page_id);
            }
        }

        if let Some(holder) = self.x_lock_map.get(page_id) {
            if holder == tx {
                self.x_lock_map.remove(page_id);
            }
        }
    }

    pub fn holds_lock(&self, tx: &Transaction, page_id: &HeapPageID) -> bool {
        self.hold_pages
            .get(tx)
            .map_or(false, |pages| pages.contains(page_id))
    }

    pub fn hold_pages(&self, tx: &Transaction) -> HashSet<HeapPageID> {
        self.hold_pages.get(tx).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.s_lock_map.clear();
        self.x_lock_map.clear();
        self.hold_pages.clear();
    }
}

impl fmt::Display for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depiction = "\n".to_string();

        depiction.push_str("s_lock_map: {");
        for (page_id, holders) in self.s_lock_map.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", page_id, holders));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("x_lock_map: {");
        for (page_id, holder) in self.x_lock_map.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", page_id, holder));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("hold_pages: {");
        for (tx, pages) in self.hold_pages.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", tx, pages));
        }
        depiction.push_str("\n}\n");

        write!(f, "{}", depiction)
    }
}

impl fmt::Debug for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
