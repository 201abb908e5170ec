use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    error::DbError,
    storage::tuple::{Cell, Tuple},
    types::DbResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Computes COUNT / SUM / AVG / MIN / MAX over an integer column, grouped by
/// another column when `group_by` is set. Tuples are folded in one at a time
/// with `merge`; `iterator` emits one output tuple per group.
pub struct IntegerAggregator {
    group_by: Option<usize>,
    agg_field: usize,
    op: AggregateOp,

    // the key is the group-by cell, or None when no grouping is configured
    groups: HashMap<Option<Cell>, Vec<i64>>,
}

impl IntegerAggregator {
    pub fn new(group_by: Option<usize>, agg_field: usize, op: AggregateOp) -> Self {
        Self {
            group_by,
            agg_field,
            op,
            groups: HashMap::new(),
        }
    }

    pub fn merge(&mut self, tuple: &Tuple) -> DbResult {
        let value = match tuple.get_cell(self.agg_field) {
            Cell::Int64(v) => v,
            other => {
                return Err(DbError::invalid_argument(&format!(
                    "integer aggregation over a non-integer cell: {:?}",
                    other
                )))
            }
        };
        let key = group_key(self.group_by, tuple);

        self.groups.entry(key).or_insert_with(Vec::new).push(value);
        Ok(())
    }

    /// One tuple per group: `(group key, value)` when grouping, `(value)`
    /// otherwise. Groups come out in key order, so two iterations over the
    /// same aggregator state yield identical sequences.
    pub fn iterator(&self) -> AggregateIter {
        let results = self
            .groups
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(key, values)| {
                let value = match self.op {
                    AggregateOp::Count => values.len() as i64,
                    AggregateOp::Sum => sum(values),
                    // integer average, truncating toward zero
                    AggregateOp::Avg => sum(values) / values.len() as i64,
                    // a group exists iff a tuple was merged into it, so the
                    // extremum is always defined
                    AggregateOp::Min => *values.iter().min().unwrap(),
                    AggregateOp::Max => *values.iter().max().unwrap(),
                };
                group_tuple(key, value)
            })
            .collect();

        AggregateIter::new(results)
    }
}

// callers are expected to keep sums within i64 range; overflow wraps rather
// than panicking
fn sum(values: &[i64]) -> i64 {
    values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
}

fn group_key(group_by: Option<usize>, tuple: &Tuple) -> Option<Cell> {
    group_by.map(|i| tuple.get_cell(i))
}

fn group_tuple(key: &Option<Cell>, value: i64) -> Tuple {
    match key {
        Some(cell) => Tuple::new_from_cells(&[cell.clone(), Cell::Int64(value)]),
        None => Tuple::new_from_cells(&[Cell::Int64(value)]),
    }
}

/// Counts string cells per group. COUNT is the only operator strings
/// support; asking for anything else is refused at construction time.
#[derive(Debug)]
pub struct StringAggregator {
    group_by: Option<usize>,
    agg_field: usize,

    groups: HashMap<Option<Cell>, usize>,
}

impl StringAggregator {
    pub fn new(
        group_by: Option<usize>,
        agg_field: usize,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        if op != AggregateOp::Count {
            return Err(DbError::invalid_argument(&format!(
                "string aggregation only supports COUNT, got {:?}",
                op
            )));
        }

        Ok(Self {
            group_by,
            agg_field,
            groups: HashMap::new(),
        })
    }

    pub fn merge(&mut self, tuple: &Tuple) -> DbResult {
        match tuple.get_cell(self.agg_field) {
            Cell::String(_) => {}
            other => {
                return Err(DbError::invalid_argument(&format!(
                    "string aggregation over a non-string cell: {:?}",
                    other
                )))
            }
        }
        let key = group_key(self.group_by, tuple);

        *self.groups.entry(key).or_insert(0) += 1;
        Ok(())
    }

    pub fn iterator(&self) -> AggregateIter {
        let results = self
            .groups
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(key, count)| group_tuple(key, *count as i64))
            .collect();

        AggregateIter::new(results)
    }
}

/// Iterator over an aggregator's output tuples. The snapshot is taken when
/// the iterator is built; `rewind` replays it from the start.
pub struct AggregateIter {
    results: Vec<Tuple>,
    cursor: usize,
}

impl AggregateIter {
    fn new(results: Vec<Tuple>) -> Self {
        Self { results, cursor: 0 }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for AggregateIter {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor < self.results.len() {
            let tuple = self.results[self.cursor].clone();
            self.cursor += 1;
            return Some(tuple);
        }
        None
    }
}
