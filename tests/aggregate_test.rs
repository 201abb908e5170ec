mod test_utils;

use heap_db::{
    execution::aggregate::{AggregateOp, IntegerAggregator},
    storage::tuple::{Cell, Tuple},
    transaction::Transaction,
    utils::HandyRwLock,
};

use crate::test_utils::{new_random_heap_table, setup, table_path};

fn row(group: i64, value: i64) -> Tuple {
    Tuple::new_from_cells(&[Cell::Int64(group), Cell::Int64(value)])
}

fn feed(op: AggregateOp, group_by: Option<usize>) -> IntegerAggregator {
    let mut agg = IntegerAggregator::new(group_by, 1, op);
    agg.merge(&row(1, 2)).unwrap();
    agg.merge(&row(1, 4)).unwrap();
    agg.merge(&row(2, 6)).unwrap();
    agg
}

fn collect_pairs(agg: &IntegerAggregator) -> Vec<(i64, i64)> {
    agg.iterator()
        .map(|t| {
            (
                t.get_cell(0).get_int64().unwrap(),
                t.get_cell(1).get_int64().unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_avg_grouped() {
    let _guard = setup();

    let agg = feed(AggregateOp::Avg, Some(0));
    assert_eq!(collect_pairs(&agg), vec![(1, 3), (2, 6)]);
}

#[test]
fn test_sum_without_grouping() {
    let _guard = setup();

    let agg = feed(AggregateOp::Sum, None);
    let out: Vec<Tuple> = agg.iterator().collect();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get_cell(0).get_int64(), Some(12));
}

#[test]
fn test_count_without_grouping() {
    let _guard = setup();

    let agg = feed(AggregateOp::Count, None);
    let out: Vec<Tuple> = agg.iterator().collect();
    assert_eq!(out[0].get_cell(0).get_int64(), Some(3));
}

#[test]
fn test_min_max_grouped() {
    let _guard = setup();

    let agg = feed(AggregateOp::Min, Some(0));
    assert_eq!(collect_pairs(&agg), vec![(1, 2), (2, 6)]);

    let agg = feed(AggregateOp::Max, Some(0));
    assert_eq!(collect_pairs(&agg), vec![(1, 4), (2, 6)]);
}

#[test]
// The aggregator sits on top of the storage iterator contract: fold a whole
// table scan into it and check the numbers against the generated rows.
fn test_aggregate_over_table_scan() {
    let _guard = setup();

    let path = table_path("aggregate_scan");
    let mut int_tuples: Vec<Vec<i64>> = Vec::new();
    let table_rc = new_random_heap_table(&path, 1, 600, Some(&mut int_tuples));

    let expected_sum: i64 = int_tuples.iter().map(|r| r[0]).sum();

    let mut sum_agg = IntegerAggregator::new(None, 0, AggregateOp::Sum);
    let mut count_agg = IntegerAggregator::new(None, 0, AggregateOp::Count);

    let tx = Transaction::new();
    for tuple in table_rc.rl().iterator(&tx) {
        sum_agg.merge(&tuple).unwrap();
        count_agg.merge(&tuple).unwrap();
    }
    tx.commit().unwrap();

    let sums: Vec<Tuple> = sum_agg.iterator().collect();
    assert_eq!(sums[0].get_cell(0).get_int64(), Some(expected_sum));

    let counts: Vec<Tuple> = count_agg.iterator().collect();
    assert_eq!(counts[0].get_cell(0).get_int64(), Some(600));
}
