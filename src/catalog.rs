use std::collections::HashMap;

use crate::{storage::heap::table::HeapTable, types::Pod, utils::HandyRwLock};

/// Registry of the tables the engine knows about, keyed by table id. The
/// buffer pool consults it to find the file behind a page id.
pub struct Catalog {
    table_map: HashMap<u32, Pod<HeapTable>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            table_map: HashMap::new(),
        }
    }

    pub fn add_table(&mut self, table: Pod<HeapTable>) {
        let table_id = table.rl().get_id();
        self.table_map.insert(table_id, table);
    }

    pub fn get_table(&self, table_id: &u32) -> Option<Pod<HeapTable>> {
        self.table_map.get(table_id).cloned()
    }

    pub fn clear(&mut self) {
        self.table_map.clear();
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
