use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{Transaction, TransactionState};

/// Hands out transaction ids and drives commit/abort: the terminal state is
/// set first so that, under strict 2PL, the lock manager accepts the
/// releases that follow.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            lock_manager,
        }
    }

    pub fn begin(&self) -> Transaction {
        Transaction::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn commit(&self, txn: &mut Transaction) {
        txn.set_state(TransactionState::Committed);
        self.release_all_locks(txn);
    }

    pub fn abort(&self, txn: &mut Transaction) {
        txn.set_state(TransactionState::Aborted);
        self.release_all_locks(txn);
    }

    fn release_all_locks(&self, txn: &mut Transaction) {
        for rid in txn.held_locks() {
            self.lock_manager.unlock(txn, rid);
        }
    }
}
