// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The per-transaction read/write set, lifecycle state machine, and the
//! hooks into the manager on every load/store. Grounded on
//! `transaction.{h,cpp}` in the original simulator; the state constants
//! and transition table are carried verbatim (spec §3, §4.2).

use crate::{error::TxError, manager::TransactionManager, version::VersionManager};
use log::{debug, trace, warn};
use std::{
    collections::HashSet,
    hash::{Hash, Hasher},
    mem,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Condvar, Mutex,
    },
};

/// Addresses are kept as the identity of a caller-owned location, not a
/// typed pointer: the core never dereferences this value except through
/// the `store`/`load` call sites that also hold the typed pointer.
pub(crate) type Address = usize;

pub(crate) const RUNNING: u8 = 0;
pub(crate) const COMMITTING: u8 = 1;
pub(crate) const ABORTED: u8 = 2;
pub(crate) const STALLED: u8 = 3;

/// A single atomic, isolated unit of work against shared memory.
///
/// Transactions are always handed out wrapped in an `Arc` by
/// [`TransactionManager::begin`](crate::TransactionManager::begin):
/// the conflict detector keeps shared references to live transactions
/// in its global reader/writer maps, and peers abort or stall each
/// other through those references.
pub struct Transaction {
    id: u64,
    state: AtomicU8,
    read_set: Mutex<HashSet<Address>>,
    write_set: Mutex<HashSet<Address>>,
    version_manager: Mutex<Box<dyn VersionManager>>,
    /// Notified whenever a peer preempts this transaction while it is
    /// `STALLED`. See the design notes in `DESIGN.md` on why, under the
    /// `Mutex`+`Condvar` construction the conflict detector uses for
    /// `read_stall_cv`, nothing needs to additionally park on this one
    /// to get the ordering the original C++ "wait for the killer's lock
    /// to be released" step provides.
    abort_cv: Condvar,
    manager: TransactionManager,
}

impl Transaction {
    pub(crate) fn new(id: u64, manager: TransactionManager, version_manager: Box<dyn VersionManager>) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: AtomicU8::new(RUNNING),
            read_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(HashSet::new()),
            version_manager: Mutex::new(version_manager),
            abort_cv: Condvar::new(),
            manager,
        })
    }

    /// Monotonically increasing id, unique within the process. Defines
    /// priority (lower id = older = higher priority) -- though per spec
    /// §4.4 the greedy arbiter deliberately does *not* use priority to
    /// decide aborts, only stalled/running status.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ABORTED
    }

    pub(crate) fn is_stalled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STALLED
    }

    pub(crate) fn write_set_snapshot(&self) -> HashSet<Address> {
        self.write_set.lock().unwrap().clone()
    }

    pub(crate) fn read_set_snapshot(&self) -> HashSet<Address> {
        self.read_set.lock().unwrap().clone()
    }

    pub(crate) fn version_manager(&self) -> &Mutex<Box<dyn VersionManager>> {
        &self.version_manager
    }

    /// Reverse every speculative write this transaction has made, via
    /// its versioning engine's `abort()` -- restoring memory in place
    /// for eager versioning, discarding the write buffer for lazy.
    ///
    /// This only touches version-manager state, not the detector's
    /// address-set membership; callers that decide a transaction must
    /// abort (the detector's conflict checks, the manager's
    /// `force_abort`) call this alongside their own cleanup of those
    /// sets. Safe to call more than once: both versioning engines drain
    /// their buffers, so a second call is a no-op.
    pub(crate) fn rollback_version_manager(&self) {
        self.version_manager.lock().unwrap().abort();
    }

    /// CAS `RUNNING -> ABORTED`. Returns `true` if the CAS succeeded or
    /// the transaction was already `ABORTED` -- used by peers to kill
    /// this transaction remotely (spec §4.2).
    pub(crate) fn mark_aborted(&self) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, ABORTED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(ABORTED) => true,
            Err(_) => false,
        }
    }

    pub(crate) fn mark_stalled(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, STALLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_unstalled(&self) -> bool {
        self.state
            .compare_exchange(STALLED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// CAS `STALLED -> ABORTED` only. Used by the greedy arbiter to
    /// preempt a stalled writer that is blocking a reader (spec §4.4).
    pub(crate) fn mark_stalled_transaction_aborted(&self) -> bool {
        let killed = self
            .state
            .compare_exchange(STALLED, ABORTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if killed {
            trace!("transaction {} preempted while stalled", self.id);
            self.abort_cv.notify_all();
        }
        killed
    }

    /// Store `value` at `address`.
    ///
    /// # Safety
    /// `address` must be valid for reads and writes of `T` for as long
    /// as any transaction touching it may still be retried -- the same
    /// contract the caller already upholds for any shared mutable
    /// location used with this library.
    pub fn store<T: Copy>(self: &Arc<Self>, address: *mut T, value: T) -> Result<(), TxError> {
        if self.is_aborted() {
            return Err(self.manager.force_abort(self));
        }

        self.manager.notify_store(self, address as Address)?;
        self.write_set.lock().unwrap().insert(address as Address);

        let bytes = unsafe { std::slice::from_raw_parts(&value as *const T as *const u8, mem::size_of::<T>()) };
        self.version_manager.lock().unwrap().store(address as Address, bytes);

        Ok(())
    }

    /// Load the value at `address`: the transaction's own buffered
    /// write if one exists, otherwise the current memory contents.
    pub fn load<T: Copy>(self: &Arc<Self>, address: *const T) -> Result<T, TxError> {
        if self.is_aborted() {
            return Err(self.manager.force_abort(self));
        }

        self.manager.notify_load(self, address as Address)?;
        self.read_set.lock().unwrap().insert(address as Address);

        let mut buf = vec![0u8; mem::size_of::<T>()];
        let buffered = self
            .version_manager
            .lock()
            .unwrap()
            .get_value(address as Address, &mut buf);

        if buffered {
            // `buf` is a `Vec<u8>`, alignment 1; `T` may require a
            // stricter alignment, so a plain `ptr::read` would be UB.
            Ok(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) })
        } else {
            Ok(unsafe { std::ptr::read(address) })
        }
    }

    /// Commit the transaction. Implements the exact state transition
    /// table from spec §4.2.
    pub fn end(self: &Arc<Self>) -> Result<(), TxError> {
        match self
            .state
            .compare_exchange(RUNNING, COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                debug!("transaction {} committing", self.id);
                self.manager.resolve_conflicts_at_commit(self)?;
                self.version_manager.lock().unwrap().end();
                self.manager.cleanup_and_notify(self);
                Ok(())
            }
            Err(ABORTED) => Err(self.manager.force_abort(self)),
            Err(COMMITTING) => {
                warn!("transaction {} end() called while already committing", self.id);
                Err(TxError::AlreadyCommitting)
            }
            Err(_) => unreachable!("end() observed an unexpected transaction state"),
        }
    }

    /// Abort the transaction: discard speculative state and notify any
    /// peers waiting on its address sets.
    pub fn abort(self: &Arc<Self>) {
        let _ = self.manager.force_abort(self);
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state.load(Ordering::SeqCst))
            .finish()
    }
}
