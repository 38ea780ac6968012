use std::collections::HashMap;

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{Transaction, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One queued or granted lock request.
#[derive(Debug)]
struct Request {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

/// Held and waiting requests for one RID, in arrival order.
#[derive(Debug, Default)]
struct WaitList {
    list: Vec<Request>,
}

/// Tuple-granularity shared/exclusive lock manager backing two-phase
/// locking. Requests queue FIFO per RID, with one relaxation: a contiguous
/// granted prefix of shared requests may hold the lock together.
///
/// No deadlock detection is performed; a cycle of waiting transactions will
/// wait forever and is the caller's problem. Trying to lock a RID the same
/// transaction already has locked is undefined.
pub struct LockManager {
    strict_2pl: bool,
    lock_table: Mutex<HashMap<Rid, WaitList>>,
    cv: Condvar,
}

impl LockManager {
    pub fn new(strict_2pl: bool) -> Self {
        Self {
            strict_2pl,
            lock_table: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
        }
    }

    /// Acquire a shared lock, blocking until every request queued ahead is
    /// a granted shared request. Returns `false` if the transaction is
    /// already aborted.
    pub fn lock_shared(&self, txn: &mut Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() == TransactionState::Aborted {
            return false;
        }
        debug_assert_eq!(txn.state(), TransactionState::Growing);
        debug_assert!(!txn.holds_shared(rid));

        table.entry(rid).or_default().list.push(Request {
            txn_id: txn.id(),
            mode: LockMode::Shared,
            granted: false,
        });

        loop {
            let grantable = table
                .get(&rid)
                .map(|wait_list| shared_grantable(&wait_list.list, txn.id()))
                .unwrap_or(false);
            if grantable {
                break;
            }
            self.cv.wait(&mut table);
        }

        mark_granted(table.get_mut(&rid), txn.id());
        txn.insert_shared(rid);
        trace!("txn {} granted S on {:?}", txn.id(), rid);

        // A newly granted shared lock may unblock shared requests queued
        // right behind it.
        self.cv.notify_all();
        true
    }

    /// Acquire an exclusive lock, blocking until no request queued ahead is
    /// granted. Returns `false` if the transaction is already aborted.
    pub fn lock_exclusive(&self, txn: &mut Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() == TransactionState::Aborted {
            return false;
        }
        debug_assert_eq!(txn.state(), TransactionState::Growing);
        debug_assert!(!txn.holds_exclusive(rid));

        table.entry(rid).or_default().list.push(Request {
            txn_id: txn.id(),
            mode: LockMode::Exclusive,
            granted: false,
        });

        loop {
            let grantable = table
                .get(&rid)
                .map(|wait_list| exclusive_grantable(&wait_list.list, txn.id()))
                .unwrap_or(false);
            if grantable {
                break;
            }
            self.cv.wait(&mut table);
        }

        mark_granted(table.get_mut(&rid), txn.id());
        txn.insert_exclusive(rid);
        trace!("txn {} granted X on {:?}", txn.id(), rid);

        // Nothing behind an exclusive holder can make progress, so there is
        // no one to notify.
        true
    }

    /// Upgrade a held shared lock to exclusive, blocking until this
    /// transaction's request is at the head of the queue and no other
    /// request is granted. Only one upgrade may be pending per RID: two
    /// concurrent upgraders deadlock against each other.
    pub fn lock_upgrade(&self, txn: &mut Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() == TransactionState::Aborted {
            return false;
        }
        debug_assert_eq!(txn.state(), TransactionState::Growing);
        debug_assert!(txn.holds_shared(rid));

        loop {
            let grantable = table
                .get(&rid)
                .map(|wait_list| upgrade_grantable(&wait_list.list, txn.id()))
                .unwrap_or(false);
            if grantable {
                break;
            }
            self.cv.wait(&mut table);
        }

        if let Some(wait_list) = table.get_mut(&rid) {
            if let Some(head) = wait_list.list.first_mut() {
                head.mode = LockMode::Exclusive;
            }
        }
        txn.remove_shared(rid);
        txn.insert_exclusive(rid);
        trace!("txn {} upgraded to X on {:?}", txn.id(), rid);
        true
    }

    /// Release one lock. Under strict 2PL a transaction may only unlock
    /// once committed or aborted; an early unlock aborts it and returns
    /// `false`. Under non-strict 2PL the first unlock moves the transaction
    /// from its growing to its shrinking phase. Unlocking a RID that is not
    /// held returns `false`.
    pub fn unlock(&self, txn: &mut Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();

        let held_shared = txn.holds_shared(rid);
        if !held_shared && !txn.holds_exclusive(rid) {
            return false;
        }

        if self.strict_2pl {
            if !matches!(
                txn.state(),
                TransactionState::Committed | TransactionState::Aborted
            ) {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
        } else if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        if let Some(wait_list) = table.get_mut(&rid) {
            if let Some(pos) = wait_list.list.iter().position(|r| r.txn_id == txn.id()) {
                wait_list.list.remove(pos);
            }
            if wait_list.list.is_empty() {
                table.remove(&rid);
            }
        }

        if held_shared {
            txn.remove_shared(rid);
        } else {
            txn.remove_exclusive(rid);
        }
        trace!("txn {} released {:?}", txn.id(), rid);

        self.cv.notify_all();
        true
    }
}

/// A shared request is grantable when everything queued ahead of it is a
/// granted shared request.
fn shared_grantable(list: &[Request], txn_id: TxnId) -> bool {
    for request in list {
        if request.txn_id == txn_id {
            return true;
        }
        if request.mode != LockMode::Shared || !request.granted {
            return false;
        }
    }
    false
}

/// An exclusive request is grantable when nothing queued ahead of it has
/// been granted.
fn exclusive_grantable(list: &[Request], txn_id: TxnId) -> bool {
    for request in list {
        if request.txn_id == txn_id {
            return true;
        }
        if request.granted {
            return false;
        }
    }
    false
}

/// An upgrade is grantable when the upgrading transaction's request heads
/// the queue and nothing else is granted.
fn upgrade_grantable(list: &[Request], txn_id: TxnId) -> bool {
    match list.first() {
        Some(head) if head.txn_id == txn_id => {}
        _ => return false,
    }
    list.iter().skip(1).all(|request| !request.granted)
}

fn mark_granted(wait_list: Option<&mut WaitList>, txn_id: TxnId) {
    if let Some(wait_list) = wait_list {
        if let Some(request) = wait_list.list.iter_mut().find(|r| r.txn_id == txn_id) {
            request.granted = true;
        }
    }
}
