#![allow(dead_code)]

use std::{
    env,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use once_cell::sync::Lazy;
use rand::Rng;

use heap_db::{
    database::Database,
    storage::{
        buffer_pool::{BufferPool, DEFAULT_PAGES},
        heap::table::HeapTable,
        schema::small_int_schema,
        tuple::Tuple,
    },
    transaction::{
        concurrent_status::{ConcurrentStatus, DEFAULT_TIMEOUT_SECS},
        Transaction,
    },
    types::Pod,
    utils::{self, HandyRwLock},
};

// The database is a process-wide singleton, so tests inside one binary must
// not interleave. Every test starts by grabbing this guard through setup().
static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// # Conduct the initialization
///
/// - Setting up log configurations.
/// - Drop all cached state (catalog, pages, locks).
/// - Reset page size, pool capacity and lock timeout.
pub fn setup() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    utils::init_log();
    Database::reset();
    BufferPool::reset_page_size();
    Database::buffer_pool().set_capacity(DEFAULT_PAGES);
    ConcurrentStatus::set_timeout(DEFAULT_TIMEOUT_SECS);

    guard
}

/// Path for a test table under the system temp dir. Any leftover file from a
/// previous run is removed so table contents start deterministic.
pub fn table_path(name: &str) -> String {
    let mut path = env::temp_dir();
    path.push(format!("heap_db_test_{}.db", name));
    let _ = std::fs::remove_file(&path);
    path.to_str().unwrap().to_string()
}

pub fn new_empty_heap_table(path: &str, columns: usize) -> Pod<HeapTable> {
    let schema = small_int_schema(columns, "");
    let table_rc = Arc::new(RwLock::new(HeapTable::new(path, &schema)));
    Database::mut_catalog().add_table(Arc::clone(&table_rc));
    table_rc
}

/// Create a table with a given number of random rows.
///
/// Rows are inserted through the buffer pool by a single transaction that
/// commits at the end, so the table is durable when this returns.
///
/// # Arguments:
///
/// - int_tuples: This is a reference used to return all inserted data. Only
///   works when it's not None.
pub fn new_random_heap_table(
    path: &str,
    columns: usize,
    rows: usize,
    int_tuples: Option<&mut Vec<Vec<i64>>>,
) -> Pod<HeapTable> {
    let table_rc = new_empty_heap_table(path, columns);
    let table_id = table_rc.rl().get_id();

    let mut rng = rand::thread_rng();
    let mut tuples: Vec<Tuple> = Vec::new();
    for _ in 0..rows {
        let insert_value = rng.gen_range(-10_000, 10_000);
        tuples.push(Tuple::new_int_tuple(insert_value, columns));
    }

    if let Some(int_tuples) = int_tuples {
        for tuple in &tuples {
            let row = tuple
                .get_cells()
                .iter()
                .map(|cell| cell.get_int64().unwrap())
                .collect();
            int_tuples.push(row);
        }
    }

    let write_tx = Transaction::new();
    for tuple in &tuples {
        Database::buffer_pool()
            .insert_tuple(&write_tx, table_id, tuple)
            .unwrap();
    }
    write_tx.commit().unwrap();

    table_rc
}
