use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use onyxdb::common::types::Rid;
use onyxdb::transaction::{LockManager, Transaction, TransactionManager, TransactionState};

#[test]
fn test_two_shared_holders() {
    let lock_manager = Arc::new(LockManager::new(false));
    let txn_manager = Arc::new(TransactionManager::new(lock_manager.clone()));
    let rid = Rid::new(0, 0);

    let threads: Vec<_> = (0..2)
        .map(|_| {
            let lock_manager = lock_manager.clone();
            let txn_manager = txn_manager.clone();
            thread::spawn(move || {
                let mut txn = txn_manager.begin();
                assert!(lock_manager.lock_shared(&mut txn, rid));
                assert_eq!(txn.state(), TransactionState::Growing);
                txn_manager.commit(&mut txn);
                assert_eq!(txn.state(), TransactionState::Committed);
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }
}

#[test]
fn test_shared_and_exclusive_transfer() {
    // Two accounts, one transferring writer and one summing reader; the sum
    // must never observe the transfer half-done.
    let lock_manager = Arc::new(LockManager::new(false));
    let rid_a = Rid::new(0, 0);
    let rid_b = Rid::new(0, 1);
    let accounts = Arc::new((Mutex2::new(100i64), Mutex2::new(200i64)));

    struct Mutex2<T>(std::sync::Mutex<T>);
    impl<T: Copy> Mutex2<T> {
        fn new(v: T) -> Self {
            Self(std::sync::Mutex::new(v))
        }
        fn get(&self) -> T {
            *self.0.lock().unwrap()
        }
        fn set(&self, v: T) {
            *self.0.lock().unwrap() = v;
        }
    }

    let writer = {
        let lock_manager = lock_manager.clone();
        let accounts = accounts.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(0);
            assert!(lock_manager.lock_exclusive(&mut txn, rid_a));
            accounts.0.set(accounts.0.get() + 50);
            assert!(lock_manager.lock_exclusive(&mut txn, rid_b));
            accounts.1.set(accounts.1.get() - 50);
            assert!(lock_manager.unlock(&mut txn, rid_a));
            assert_eq!(txn.state(), TransactionState::Shrinking);
            assert!(lock_manager.unlock(&mut txn, rid_b));
        })
    };
    let reader = {
        let lock_manager = lock_manager.clone();
        let accounts = accounts.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(1);
            assert!(lock_manager.lock_shared(&mut txn, rid_a));
            let a = accounts.0.get();
            assert!(lock_manager.lock_shared(&mut txn, rid_b));
            let b = accounts.1.get();
            assert_eq!(a + b, 300);
            assert!(lock_manager.unlock(&mut txn, rid_a));
            assert_eq!(txn.state(), TransactionState::Shrinking);
            assert!(lock_manager.unlock(&mut txn, rid_b));
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_shared_blocks_behind_exclusive() {
    let lock_manager = Arc::new(LockManager::new(false));
    let rid = Rid::new(0, 0);
    let barrier = Arc::new(Barrier::new(2));
    let released = Arc::new(AtomicBool::new(false));

    let holder = {
        let lock_manager = lock_manager.clone();
        let barrier = barrier.clone();
        let released = released.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(0);
            assert!(lock_manager.lock_exclusive(&mut txn, rid));
            barrier.wait();
            thread::sleep(Duration::from_millis(100));
            released.store(true, Ordering::SeqCst);
            assert!(lock_manager.unlock(&mut txn, rid));
        })
    };
    let waiter = {
        let lock_manager = lock_manager.clone();
        let barrier = barrier.clone();
        let released = released.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(1);
            barrier.wait();
            // Blocks until the exclusive holder lets go.
            assert!(lock_manager.lock_shared(&mut txn, rid));
            assert!(released.load(Ordering::SeqCst));
            assert!(lock_manager.unlock(&mut txn, rid));
        })
    };

    holder.join().unwrap();
    waiter.join().unwrap();
}

#[test]
fn test_exclusive_queue_is_fifo() {
    let lock_manager = Arc::new(LockManager::new(false));
    let rid = Rid::new(0, 0);
    let barrier = Arc::new(Barrier::new(2));
    let released = Arc::new(AtomicBool::new(false));

    let first = {
        let lock_manager = lock_manager.clone();
        let barrier = barrier.clone();
        let released = released.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(0);
            assert!(lock_manager.lock_exclusive(&mut txn, rid));
            barrier.wait();
            thread::sleep(Duration::from_millis(100));
            released.store(true, Ordering::SeqCst);
            assert!(lock_manager.unlock(&mut txn, rid));
        })
    };
    let second = {
        let lock_manager = lock_manager.clone();
        let barrier = barrier.clone();
        let released = released.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(1);
            barrier.wait();
            assert!(lock_manager.lock_exclusive(&mut txn, rid));
            assert!(released.load(Ordering::SeqCst));
            assert!(lock_manager.unlock(&mut txn, rid));
        })
    };

    first.join().unwrap();
    second.join().unwrap();
}

#[test]
fn test_upgrade_waits_for_other_readers() {
    let lock_manager = Arc::new(LockManager::new(false));
    let rid = Rid::new(0, 0);
    let barrier = Arc::new(Barrier::new(2));
    let reader_done = Arc::new(AtomicBool::new(false));

    let upgrader = {
        let lock_manager = lock_manager.clone();
        let barrier = barrier.clone();
        let reader_done = reader_done.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(0);
            assert!(lock_manager.lock_shared(&mut txn, rid));
            barrier.wait();
            // Blocks until the other shared holder releases.
            assert!(lock_manager.lock_upgrade(&mut txn, rid));
            assert!(reader_done.load(Ordering::SeqCst));
            assert!(txn.holds_exclusive(rid));
            assert!(!txn.holds_shared(rid));
            assert!(lock_manager.unlock(&mut txn, rid));
        })
    };
    let reader = {
        let lock_manager = lock_manager.clone();
        let barrier = barrier.clone();
        let reader_done = reader_done.clone();
        thread::spawn(move || {
            let mut txn = Transaction::new(1);
            // Both shared locks are held before the upgrade is attempted.
            assert!(lock_manager.lock_shared(&mut txn, rid));
            barrier.wait();
            thread::sleep(Duration::from_millis(100));
            reader_done.store(true, Ordering::SeqCst);
            assert!(lock_manager.unlock(&mut txn, rid));
        })
    };

    upgrader.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_strict_2pl_early_unlock_aborts() {
    let lock_manager = LockManager::new(true);
    let rid = Rid::new(0, 0);
    let mut txn = Transaction::new(0);

    assert!(lock_manager.lock_shared(&mut txn, rid));
    assert_eq!(txn.state(), TransactionState::Growing);

    // Unlocking before commit/abort is a protocol violation.
    assert!(!lock_manager.unlock(&mut txn, rid));
    assert_eq!(txn.state(), TransactionState::Aborted);

    // An aborted transaction gets nothing further.
    assert!(!lock_manager.lock_shared(&mut txn, Rid::new(0, 1)));
    assert!(!lock_manager.lock_exclusive(&mut txn, Rid::new(0, 2)));
}

#[test]
fn test_strict_2pl_unlock_after_commit() {
    let lock_manager = Arc::new(LockManager::new(true));
    let txn_manager = TransactionManager::new(lock_manager.clone());
    let rid = Rid::new(0, 0);

    let mut txn = txn_manager.begin();
    assert!(lock_manager.lock_exclusive(&mut txn, rid));
    txn_manager.commit(&mut txn);
    assert_eq!(txn.state(), TransactionState::Committed);
    assert!(txn.held_locks().is_empty());

    // The lock is available again.
    let mut other = txn_manager.begin();
    assert!(lock_manager.lock_shared(&mut other, rid));
    txn_manager.commit(&mut other);
}

#[test]
fn test_unlock_not_held_returns_false() {
    let lock_manager = LockManager::new(false);
    let rid = Rid::new(0, 0);
    let mut txn = Transaction::new(0);

    assert!(!lock_manager.unlock(&mut txn, rid));

    assert!(lock_manager.lock_shared(&mut txn, rid));
    assert!(lock_manager.unlock(&mut txn, rid));
    // The second release of the same RID is refused.
    assert!(!lock_manager.unlock(&mut txn, rid));
}
