pub mod concurrency;

// Public exports
pub use concurrency::lock_manager::{LockManager, LockMode};
pub use concurrency::transaction::{PageLatch, Transaction, TransactionState};
pub use concurrency::transaction_manager::TransactionManager;
