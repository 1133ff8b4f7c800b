pub mod key;
#[allow(clippy::module_inception)]
pub mod mvcc;
pub mod transaction;

pub use mvcc::MVCC;
pub use transaction::{Transaction, TransactionState};

/// An MVCC version represents a logical timestamp. The latest version is incremented
/// when beginning each read-write transaction.
pub type Version = u64;
