pub mod aggregate;

pub use aggregate::{AggregateIter, AggregateOp, IntegerAggregator, StringAggregator};
