pub mod concurrent_status;
pub mod tx;

pub use concurrent_status::{ConcurrentStatus, Lock, Permission};
pub use tx::{Transaction, TransactionID};
