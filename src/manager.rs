// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The entry point: configures a pairing of versioning engine and
//! conflict detector, mints transactions, and routes every load/store/
//! commit/abort through to the right detector. Grounded on
//! `TransactionManager` in the original simulator.

use crate::{
    detector::{ConflictDetector, OptimisticDetector, PessimisticDetector},
    error::TxError,
    transaction::{Address, Transaction},
    version::{EagerVersionManager, LazyVersionManager, VersionManager},
};
use log::info;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

enum Detector {
    Pessimistic(PessimisticDetector),
    Optimistic(OptimisticDetector),
}

impl Detector {
    fn as_trait(&self) -> &dyn ConflictDetector {
        match self {
            Detector::Pessimistic(d) => d,
            Detector::Optimistic(d) => d,
        }
    }
}

struct ManagerInner {
    next_id: AtomicU64,
    use_lazy_versioning: bool,
    detector: Detector,
}

/// Configures and mints transactions for one consistent pairing of
/// versioning engine and conflict detection strategy.
///
/// Three of the four combinations are legal (spec §2): eager+pessimistic,
/// lazy+pessimistic, lazy+optimistic. Eager+optimistic is rejected by
/// [`TransactionManager::new`] because write-through with no validation
/// at commit can expose other transactions to not-yet-committed values
/// with no way to roll them back.
///
/// Cheap to clone: internally reference-counted, so every
/// [`Transaction`] can hold its own handle back to the manager that
/// created it.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    /// Construct a manager for a given configuration.
    ///
    /// # Errors
    /// Returns [`TxError::InvalidConfiguration`] if `use_lazy_versioning`
    /// is `false` (eager) and `use_pessimistic_conflict_detection` is
    /// `false` (optimistic): that combination is disallowed (spec §2).
    pub fn new(use_lazy_versioning: bool, use_pessimistic_conflict_detection: bool) -> Result<Self, TxError> {
        if !use_lazy_versioning && !use_pessimistic_conflict_detection {
            return Err(TxError::InvalidConfiguration(
                "eager versioning cannot be paired with optimistic conflict detection",
            ));
        }

        let detector = if use_pessimistic_conflict_detection {
            Detector::Pessimistic(PessimisticDetector::default())
        } else {
            Detector::Optimistic(OptimisticDetector::default())
        };

        info!(
            "transaction manager configured: versioning={}, detection={}",
            if use_lazy_versioning { "lazy" } else { "eager" },
            if use_pessimistic_conflict_detection {
                "pessimistic"
            } else {
                "optimistic"
            }
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                next_id: AtomicU64::new(0),
                use_lazy_versioning,
                detector,
            }),
        })
    }

    /// Begin a new transaction with a fresh, unique id.
    pub fn begin(&self) -> Arc<Transaction> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let version_manager: Box<dyn VersionManager> = if self.inner.use_lazy_versioning {
            Box::new(LazyVersionManager::default())
        } else {
            Box::new(EagerVersionManager::default())
        };
        Transaction::new(id, self.clone(), version_manager)
    }

    pub(crate) fn notify_store(&self, txn: &Arc<Transaction>, address: Address) -> Result<(), TxError> {
        self.inner.detector.as_trait().store(txn, address)
    }

    pub(crate) fn notify_load(&self, txn: &Arc<Transaction>, address: Address) -> Result<(), TxError> {
        self.inner.detector.as_trait().load(txn, address)
    }

    pub(crate) fn resolve_conflicts_at_commit(&self, txn: &Arc<Transaction>) -> Result<(), TxError> {
        self.inner.detector.as_trait().resolve_conflicts_at_commit(txn)
    }

    pub(crate) fn cleanup_and_notify(&self, txn: &Arc<Transaction>) {
        self.inner.detector.as_trait().cleanup(txn);
    }

    /// Force a transaction into the terminal `ABORTED` state: release
    /// its speculative version-manager state, drop it from the
    /// conflict detector's address sets, and return [`TxError::Abort`].
    ///
    /// Safe to call on a transaction that is already `ABORTED`; unlike
    /// the C++ original this never double-frees, since the version
    /// manager's buffers are plain `Vec<u8>`s that are simply emptied.
    pub(crate) fn force_abort(&self, txn: &Arc<Transaction>) -> TxError {
        txn.mark_aborted();
        txn.rollback_version_manager();
        self.inner.detector.as_trait().cleanup(txn);
        TxError::Abort
    }

    /// Abort a transaction from outside its own execution thread, e.g.
    /// in response to an external timeout or cancellation policy. Mirrors
    /// `TransactionManager::AbortTransaction` in the original simulator,
    /// which exists as a public entry point distinct from a transaction
    /// aborting itself mid-operation.
    pub fn abort_transaction(&self, txn: &Arc<Transaction>) {
        let _ = self.force_abort(txn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_eager_optimistic_combination() {
        assert_eq!(
            TransactionManager::new(false, false).unwrap_err(),
            TxError::InvalidConfiguration("eager versioning cannot be paired with optimistic conflict detection")
        );
    }

    #[test]
    fn accepts_the_three_legal_combinations() {
        assert!(TransactionManager::new(false, true).is_ok());
        assert!(TransactionManager::new(true, true).is_ok());
        assert!(TransactionManager::new(true, false).is_ok());
    }

    #[test]
    fn begin_mints_unique_ids() {
        let manager = TransactionManager::new(true, true).unwrap();
        let a = manager.begin();
        let b = manager.begin();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn pessimistic_store_then_store_aborts_the_second_writer() {
        let manager = TransactionManager::new(false, true).unwrap();
        let mut cell: u64 = 0;
        let address = &mut cell as *mut u64;

        let t1 = manager.begin();
        let t2 = manager.begin();

        assert!(t1.store(address, 1).is_ok());
        assert_eq!(t2.store(address, 2).unwrap_err(), TxError::Abort);

        assert!(t1.end().is_ok());
    }

    #[test]
    fn optimistic_resolves_write_write_conflict_at_commit() {
        let manager = TransactionManager::new(true, false).unwrap();
        let mut cell: u64 = 0;
        let address = &mut cell as *mut u64;

        let t1 = manager.begin();
        let t2 = manager.begin();

        t1.store(address, 1).unwrap();
        t2.store(address, 2).unwrap();

        assert!(t1.end().is_ok());
        assert_eq!(t2.end().unwrap_err(), TxError::Abort);
        assert_eq!(cell, 1);
    }
}
