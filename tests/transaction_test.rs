mod test_utils;

use std::{
    sync::{Arc, Barrier, RwLock},
    thread,
    time::Duration,
};

use log::debug;

use heap_db::{
    database::Database,
    error::ErrorKind,
    storage::{heap::page_id::HeapPageID, heap::table::HeapTable, schema::small_int_schema, tuple::Tuple},
    transaction::{
        concurrent_status::{ConcurrentStatus, Lock, Permission},
        Transaction,
    },
    utils::HandyRwLock,
};

use crate::test_utils::{new_random_heap_table, setup, table_path};

#[test]
// A sole reader may upgrade its shared lock in place; a reader with company
// has to wait for the other readers to finish.
fn test_lock_upgrade() {
    let _guard = setup();
    ConcurrentStatus::set_timeout(1);

    let path = table_path("upgrade");
    let table_rc = new_random_heap_table(&path, 1, 10, None);
    let table_id = table_rc.rl().get_id();
    let pid = HeapPageID::new(table_id, 0);

    // sole shared holder: the upgrade succeeds immediately
    let tx1 = Transaction::new();
    Database::buffer_pool()
        .get_page(&tx1, Permission::ReadOnly, &pid)
        .unwrap();
    Database::buffer_pool()
        .get_page(&tx1, Permission::ReadWrite, &pid)
        .unwrap();
    assert!(Database::buffer_pool().holds_lock(&tx1, &pid));
    tx1.commit().unwrap();

    // two shared holders: the upgrade is denied until the other one leaves
    let tx2 = Transaction::new();
    let tx3 = Transaction::new();
    Database::buffer_pool()
        .get_page(&tx2, Permission::ReadOnly, &pid)
        .unwrap();
    Database::buffer_pool()
        .get_page(&tx3, Permission::ReadOnly, &pid)
        .unwrap();

    let err = Database::buffer_pool()
        .get_page(&tx2, Permission::ReadWrite, &pid)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionAborted);

    tx3.commit().unwrap();
    Database::buffer_pool()
        .get_page(&tx2, Permission::ReadWrite, &pid)
        .unwrap();
    tx2.commit().unwrap();
}

#[test]
// Two transactions grab one page each and then ask for the other's: the
// victim times out and aborts, the survivor finishes its work.
fn test_deadlock_resolved_by_timeout() {
    let _guard = setup();
    ConcurrentStatus::set_timeout(1);

    let path = table_path("deadlock");
    // 2 pages of single-column rows
    let table_rc = new_random_heap_table(&path, 1, 505, None);
    let table_id = table_rc.rl().get_id();

    let barrier = Arc::new(Barrier::new(2));
    let (sender, receiver) = crossbeam::channel::unbounded();

    let mut handles = Vec::new();
    for (own_index, other_index, patience) in [(0u32, 1u32, 3000u64), (1, 0, 0)].iter() {
        let own = HeapPageID::new(table_id, *own_index);
        let other = HeapPageID::new(table_id, *other_index);
        let patience = *patience;
        let local_barrier = Arc::clone(&barrier);
        let local_sender = sender.clone();

        let handle = thread::spawn(move || {
            let tx = Transaction::new();
            Database::buffer_pool()
                .get_page(&tx, Permission::ReadWrite, &own)
                .unwrap();
            local_barrier.wait();

            // the patient thread outlives the other's timeout, so its
            // second lock request finds the page free
            thread::sleep(Duration::from_millis(patience));

            match Database::buffer_pool().get_page(&tx, Permission::ReadWrite, &other) {
                Ok(_) => {
                    tx.commit().unwrap();
                    local_sender.send("committed").unwrap();
                }
                Err(e) => {
                    e.show_backtrace();
                    assert_eq!(e.kind(), ErrorKind::TransactionAborted);
                    tx.abort().unwrap();
                    local_sender.send("aborted").unwrap();
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
    drop(sender);

    let mut outcomes: Vec<&str> = receiver.iter().collect();
    outcomes.sort();
    debug!("deadlock outcomes: {:?}", outcomes);
    assert_eq!(outcomes, vec!["aborted", "committed"]);
}

#[test]
// Committed work survives a restart: a fresh buffer pool over the same file
// sees every inserted tuple, and the table keeps its identity.
fn test_commit_is_durable() {
    let _guard = setup();

    let path = table_path("durable");
    let mut int_tuples: Vec<Vec<i64>> = Vec::new();
    let table_rc = new_random_heap_table(&path, 2, 777, Some(&mut int_tuples));
    let table_id = table_rc.rl().get_id();
    drop(table_rc);

    // simulate a restart: drop every in-memory structure, reattach to the
    // same file
    Database::reset();
    let schema = small_int_schema(2, "");
    let table_rc = Arc::new(RwLock::new(HeapTable::new(&path, &schema)));
    Database::mut_catalog().add_table(Arc::clone(&table_rc));

    // the id hashes the absolute path, so it is stable across restarts
    assert_eq!(table_rc.rl().get_id(), table_id);
    assert_eq!(table_rc.rl().get_schema(), schema);

    let tx = Transaction::new();
    let rows: Vec<Vec<i64>> = table_rc
        .rl()
        .iterator(&tx)
        .map(|t| {
            t.get_cells()
                .iter()
                .map(|cell| cell.get_int64().unwrap())
                .collect()
        })
        .collect();
    tx.commit().unwrap();

    assert_eq!(rows, int_tuples);

    // the file is always a whole number of pages
    let file_len = std::fs::metadata(&path).unwrap().len() as usize;
    assert_eq!(file_len % 4096, 0);
    assert_eq!(table_rc.rl().pages_count(), (file_len + 4095) / 4096);
}

#[test]
// An aborted transaction leaves no trace: its cached pages are dropped and
// the disk still holds the pre-transaction images.
fn test_abort_rolls_back() {
    let _guard = setup();

    let path = table_path("abort");
    let table_rc = new_random_heap_table(&path, 1, 10, None);
    let table_id = table_rc.rl().get_id();
    let pid = HeapPageID::new(table_id, 0);

    let tx = Transaction::new();
    Database::buffer_pool()
        .insert_tuple(&tx, table_id, &Tuple::new_int_tuple(999, 1))
        .unwrap();

    // the writer sees its own uncommitted row
    assert_eq!(table_rc.rl().iterator(&tx).count(), 11);

    tx.abort().unwrap();

    // nobody is left holding the page, and the cached version (re-read from
    // disk on demand) carries no dirty mark and no phantom row
    let tx2 = Transaction::new();
    let page_rc = Database::buffer_pool()
        .get_page(&tx2, Permission::ReadOnly, &pid)
        .unwrap();
    assert_eq!(page_rc.rl().is_dirty(), None);
    assert_eq!(table_rc.rl().iterator(&tx2).count(), 10);
    tx2.commit().unwrap();
}

#[test]
// Deleted tuples stay deleted across commit and restart.
fn test_delete_tuple() {
    let _guard = setup();

    let path = table_path("delete");
    let table_rc = new_random_heap_table(&path, 1, 20, None);

    let tx = Transaction::new();
    let victims: Vec<_> = table_rc.rl().iterator(&tx).take(5).collect();
    for tuple in &victims {
        Database::buffer_pool().delete_tuple(&tx, tuple).unwrap();
    }
    assert_eq!(table_rc.rl().iterator(&tx).count(), 15);
    tx.commit().unwrap();

    Database::reset();
    let schema = small_int_schema(1, "");
    let table_rc = Arc::new(RwLock::new(HeapTable::new(&path, &schema)));
    Database::mut_catalog().add_table(Arc::clone(&table_rc));

    let tx = Transaction::new();
    assert_eq!(table_rc.rl().iterator(&tx).count(), 15);
    tx.commit().unwrap();
}

#[test]
// A scan whose page fetch times out surfaces the abort instead of killing
// the thread, so the caller can roll its transaction back.
fn test_scan_surfaces_lock_timeout() {
    let _guard = setup();
    ConcurrentStatus::set_timeout(1);

    let path = table_path("scan_timeout");
    let table_rc = new_random_heap_table(&path, 1, 10, None);
    let table_id = table_rc.rl().get_id();

    // a writer parks an exclusive lock on page 0
    let writer = Transaction::new();
    Database::buffer_pool()
        .insert_tuple(&writer, table_id, &Tuple::new_int_tuple(7, 1))
        .unwrap();

    // fallible interface: the abort comes back as an error
    let reader = Transaction::new();
    let mut scan = table_rc.rl().iterator(&reader);
    let err = scan.try_next().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionAborted);
    reader.abort().unwrap();

    // plain Iterator interface: the scan ends and parks the error
    let reader = Transaction::new();
    let mut scan = table_rc.rl().iterator(&reader);
    assert!(scan.next().is_none());
    assert_eq!(
        scan.error().map(|e| e.kind()),
        Some(ErrorKind::TransactionAborted)
    );
    reader.abort().unwrap();

    writer.commit().unwrap();

    // with the writer gone the same scan works after a rewind
    let reader = Transaction::new();
    let mut scan = table_rc.rl().iterator(&reader);
    scan.rewind();
    assert_eq!(scan.by_ref().count(), 11);
    assert!(scan.error().is_none());
    reader.commit().unwrap();
}

#[test]
// The single-page release escape hatch drops the lock immediately, letting
// another writer in while the first transaction is still running.
fn test_release_single_page_lock() {
    let _guard = setup();
    ConcurrentStatus::set_timeout(1);

    let path = table_path("release_page");
    let table_rc = new_random_heap_table(&path, 1, 10, None);
    let table_id = table_rc.rl().get_id();
    let pid = HeapPageID::new(table_id, 0);

    let tx1 = Transaction::new();
    Database::buffer_pool()
        .get_page(&tx1, Permission::ReadOnly, &pid)
        .unwrap();
    assert!(Database::buffer_pool().holds_lock(&tx1, &pid));

    Database::buffer_pool().release_page(&tx1, &pid);
    assert!(!Database::buffer_pool().holds_lock(&tx1, &pid));

    // with tx1 out of the way, a writer acquires the page without waiting
    let tx2 = Transaction::new();
    ConcurrentStatus::acquire_lock(&tx2, &Lock::XLock, &pid).unwrap();
    assert!(Database::buffer_pool().holds_lock(&tx2, &pid));
    tx2.commit().unwrap();
    tx1.commit().unwrap();
}
