use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::{database::Database, types::DbResult};

pub type TransactionID = u32;

static TRANSACTION_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Eq, PartialEq, Clone)]
pub struct Transaction {
    // increase monotonically by 1
    id: TransactionID,
}

impl Transaction {
    pub fn new() -> Self {
        let id = TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        Self { id }
    }

    /// Flush every page this transaction dirtied to disk, then release its
    /// locks (FORCE at commit).
    pub fn commit(&self) -> DbResult {
        Database::buffer_pool().tx_complete(self, true)
    }

    /// Drop this transaction's cached pages, then release its locks. Under
    /// NO STEAL the on-disk images were never overwritten, so dropping the
    /// cached copies is a complete rollback.
    pub fn abort(&self) -> DbResult {
        Database::buffer_pool().tx_complete(self, false)
    }

    pub fn get_id(&self) -> TransactionID {
        self.id
    }
}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
