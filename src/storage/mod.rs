pub mod buffer_pool;
pub mod heap;
pub mod schema;
pub mod tuple;
