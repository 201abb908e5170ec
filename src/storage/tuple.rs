use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    io::{read_exact, Decodeable, Encodeable},
    storage::{
        heap::page_id::HeapPageID,
        schema::{Schema, Type, STRING_CAPACITY},
    },
};

/// A single column value. Aggregators and predicates pattern-match on the
/// variant instead of casting, so a type mismatch is a recoverable error
/// rather than a crash.
#[derive(Debug, Clone)]
pub enum Cell {
    Int64(i64),
    String(String),
}

impl Cell {
    pub fn read_from<R: std::io::Read>(reader: &mut R, t: &Type) -> Cell {
        match t {
            Type::Int64 => Cell::Int64(i64::decode_from(reader)),
            Type::String => {
                let len = (u8::decode_from(reader) as usize).min(STRING_CAPACITY);
                let payload = read_exact(reader, STRING_CAPACITY);
                Cell::String(String::from_utf8_lossy(&payload[..len]).to_string())
            }
        }
    }

    pub fn get_int64(&self) -> Option<i64> {
        match self {
            Cell::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self) -> Option<&str> {
        match self {
            Cell::String(v) => Some(v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Int64(_) => 0,
            Cell::String(_) => 1,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Int64(a), Cell::Int64(b)) => a == b,
            (Cell::String(a), Cell::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Cell::Int64(a), Cell::Int64(b)) => a.cmp(b),
            (Cell::String(a), Cell::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Cell::Int64(v) => v.hash(state),
            Cell::String(v) => v.hash(state),
        }
    }
}

impl Encodeable for Cell {
    fn encode(&self) -> Vec<u8> {
        match self {
            Cell::Int64(v) => v.to_le_bytes().to_vec(),
            Cell::String(v) => {
                // strings beyond the field capacity are truncated
                let payload = v.as_bytes();
                let len = payload.len().min(STRING_CAPACITY);
                let mut buf = Vec::with_capacity(1 + STRING_CAPACITY);
                buf.push(len as u8);
                buf.extend_from_slice(&payload[..len]);
                buf.resize(1 + STRING_CAPACITY, 0);
                buf
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    pub fn new_from_cells(cells: &[Cell]) -> Self {
        Self {
            cells: cells.to_vec(),
        }
    }

    pub fn read_from<R: std::io::Read>(reader: &mut R, schema: &Schema) -> Self {
        let mut cells: Vec<Cell> = Vec::new();
        for field in &schema.fields {
            cells.push(Cell::read_from(reader, &field.field_type));
        }
        Tuple { cells }
    }

    pub fn new_int_tuple(value: i64, width: usize) -> Self {
        let mut cells: Vec<Cell> = Vec::new();
        for _ in 0..width {
            cells.push(Cell::Int64(value));
        }

        Tuple { cells }
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    pub fn get_cells(&self) -> Vec<Cell> {
        self.cells.clone()
    }
}

impl Encodeable for Tuple {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for cell in &self.cells {
            bytes.append(&mut cell.encode());
        }
        bytes
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = self
            .cells
            .iter()
            .map(|cell| format!("{:?}", cell))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{}}}", content)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Physical address of a tuple: the page that stores it and the slot it
/// occupies there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub pid: HeapPageID,
    pub slot_index: usize,
}

impl RecordId {
    pub fn new(pid: HeapPageID, slot_index: usize) -> Self {
        Self { pid, slot_index }
    }
}

/// A tuple together with its on-disk address. Page and table iterators yield
/// wrapped tuples, so anything read from storage can be deleted without a
/// separate lookup.
#[derive(Clone, PartialEq)]
pub struct WrappedTuple {
    internal: Tuple,
    rid: RecordId,
}

impl std::ops::Deref for WrappedTuple {
    type Target = Tuple;
    fn deref(&self) -> &Self::Target {
        &self.internal
    }
}

impl std::ops::DerefMut for WrappedTuple {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.internal
    }
}

impl WrappedTuple {
    pub fn new(internal: Tuple, rid: RecordId) -> WrappedTuple {
        WrappedTuple { internal, rid }
    }

    pub fn get_record_id(&self) -> RecordId {
        self.rid
    }

    pub fn get_slot_index(&self) -> usize {
        self.rid.slot_index
    }

    pub fn get_pid(&self) -> HeapPageID {
        self.rid.pid
    }
}

impl Eq for WrappedTuple {}

impl fmt::Display for WrappedTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{:?}", self.internal, self.rid)
    }
}

impl fmt::Debug for WrappedTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        storage::schema::{FieldItem, Type},
        utils::init_log,
    };

    #[test]
    fn test_string_cell_wire_format() {
        init_log();

        let schema = Schema::new(vec![
            FieldItem {
                field_name: "name".to_string(),
                field_type: Type::String,
            },
            FieldItem {
                field_name: "age".to_string(),
                field_type: Type::Int64,
            },
        ]);

        let tuple = Tuple::new_from_cells(&[
            Cell::String("ada".to_string()),
            Cell::Int64(36),
        ]);

        let bytes = tuple.encode();
        assert_eq!(bytes.len(), schema.get_size());

        let decoded = Tuple::read_from(&mut Cursor::new(&bytes), &schema);
        assert_eq!(decoded.get_cell(0).get_string(), Some("ada"));
        assert_eq!(decoded.get_cell(1).get_int64(), Some(36));
    }

    #[test]
    fn test_string_cell_truncates_at_capacity() {
        init_log();

        let long = "x".repeat(STRING_CAPACITY + 10);
        let cell = Cell::String(long);

        let bytes = cell.encode();
        assert_eq!(bytes.len(), Type::String.get_size());

        let decoded = Cell::read_from(&mut Cursor::new(&bytes), &Type::String);
        assert_eq!(
            decoded.get_string().map(|s| s.len()),
            Some(STRING_CAPACITY)
        );
    }
}
