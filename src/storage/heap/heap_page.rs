use std::io::Cursor;

use bit_vec::BitVec;

use crate::{
    error::DbError,
    io::ByteWriter,
    storage::{
        buffer_pool::BufferPool,
        heap::page_id::HeapPageID,
        schema::Schema,
        tuple::{RecordId, Tuple, WrappedTuple},
    },
    transaction::{Transaction, TransactionID},
    types::DbResult,
};

/// A fixed-size slotted page: a slot-status bitmap followed by fixed-width
/// tuple slots, zero padding at the tail. The byte image produced by
/// `get_page_data` is always exactly one page long.
#[derive(Debug)]
pub struct HeapPage {
    pid: HeapPageID,

    pub slot_count: usize,

    // indicate slots' status: true means occupied, false means empty
    header: BitVec<u32>,

    // all tuples (include empty tuples)
    tuples: Vec<Tuple>,

    schema: Schema,

    // the transaction that last modified the page, None when the in-memory
    // version matches the disk image
    dirtier: Option<TransactionID>,
}

impl HeapPage {
    pub fn new(pid: &HeapPageID, bytes: &[u8], schema: &Schema) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);

        let mut tuples = Vec::new();
        for i in 0..slot_count {
            let start = header_size + i * schema.get_size();
            let end = start + schema.get_size();
            let mut reader = Cursor::new(&bytes[start..end]);
            tuples.push(Tuple::read_from(&mut reader, schema));
        }

        Self {
            pid: *pid,
            slot_count,
            header: BitVec::from_bytes(&bytes[..header_size]),
            tuples,
            schema: schema.clone(),
            dirtier: None,
        }
    }

    pub fn empty_page_data() -> Vec<u8> {
        vec![0; BufferPool::get_page_size()]
    }

    pub fn get_pid(&self) -> HeapPageID {
        self.pid
    }

    /// Retrieve the maximum number of tuples this page can hold: each slot
    /// costs its tuple bytes plus one header bit.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        let bits_per_tuple_including_header = schema.get_size() * 8 + 1;
        BufferPool::get_page_size() * 8 / bits_per_tuple_including_header
    }

    // Computes the number of bytes in the header of a page with each tuple
    // occupying tuple-size bytes
    pub fn calculate_header_size(slot_count: usize) -> usize {
        slot_count / 8 + 1
    }

    /// Serialize the page into its on-disk image.
    pub fn get_page_data(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_bytes(&self.header.to_bytes());
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                writer.write(&self.tuples[i]);
            } else {
                writer.write_bytes(&vec![0; self.schema.get_size()]);
            }
        }
        writer.to_padded_bytes(BufferPool::get_page_size())
    }

    pub fn empty_slots_count(&self) -> usize {
        let mut count = 0;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                count += 1;
            }
        }
        count
    }

    /// Returns the number of tuples currently stored on this page
    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Adds the tuple to the first empty slot and returns the slot index.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<usize, DbError> {
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                self.tuples[i] = tuple.clone();
                self.mark_slot_status(i, true);
                return Ok(i);
            }
        }

        Err(DbError::database(&format!(
            "no empty slot on page {}",
            self.pid
        )))
    }

    pub fn delete_tuple(&mut self, slot_index: usize) -> DbResult {
        if slot_index >= self.slot_count || !self.is_slot_used(slot_index) {
            return Err(DbError::no_such_element(&format!(
                "slot {} is empty on page {}",
                slot_index, self.pid
            )));
        }

        self.mark_slot_status(slot_index, false);
        Ok(())
    }

    pub fn get_tuple(&self, slot_index: usize) -> Option<WrappedTuple> {
        if self.is_slot_used(slot_index) {
            return Some(WrappedTuple::new(
                self.tuples[slot_index].clone(),
                RecordId::new(self.pid, slot_index),
            ));
        }
        None
    }

    /// Returns true if associated slot on this page is filled.
    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    pub fn mark_dirty(&mut self, dirtier: Option<&Transaction>) {
        self.dirtier = dirtier.map(|tx| tx.get_id());
    }

    pub fn is_dirty(&self) -> Option<TransactionID> {
        self.dirtier
    }

    pub fn iterator(&self) -> HeapPageIterator {
        HeapPageIterator {
            page: self,
            cursor: 0,
        }
    }
}

/// Iterates the occupied slots of a page, yielding tuples tagged with their
/// record id.
pub struct HeapPageIterator<'a> {
    page: &'a HeapPage,
    cursor: usize,
}

impl<'a> Iterator for HeapPageIterator<'a> {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.page.slot_count {
            let i = self.cursor;
            self.cursor += 1;
            if self.page.is_slot_used(i) {
                return self.page.get_tuple(i);
            }
        }
        None
    }
}
