// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Conflict detection: deciding, on every load/store and at commit time,
//! whether a transaction must stall or abort. Grounded on
//! `transaction_manager.{h,cpp}` in the original simulator.
//!
//! Two strategies are provided -- [`pessimistic::PessimisticDetector`]
//! (writer loses, reader stalls behind a greedy arbiter) and
//! [`optimistic::OptimisticDetector`] (insert-only during execution,
//! validate and kill at commit). Both share the same address-keyed
//! reader/writer bookkeeping, factored out into [`AddressSets`].

pub(crate) mod optimistic;
pub(crate) mod pessimistic;

pub(crate) use optimistic::OptimisticDetector;
pub(crate) use pessimistic::PessimisticDetector;

use crate::{error::TxError, transaction::Address, transaction::Transaction};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Condvar, Mutex, RwLock},
};

/// Behaviour that differs between the pessimistic and optimistic
/// strategies, invoked by the manager on every operation.
pub(crate) trait ConflictDetector: Send + Sync {
    fn store(&self, txn: &Arc<Transaction>, address: Address) -> Result<(), TxError>;
    fn load(&self, txn: &Arc<Transaction>, address: Address) -> Result<(), TxError>;

    /// Called once, at commit time, while the transaction is already
    /// `COMMITTING`. A no-op for the pessimistic strategy, which has
    /// already resolved every conflict eagerly.
    fn resolve_conflicts_at_commit(&self, txn: &Arc<Transaction>) -> Result<(), TxError>;

    fn cleanup(&self, txn: &Arc<Transaction>);
}

/// The address-keyed reader/writer maps shared by both detectors.
///
/// Lock order is always `writers` before `readers`, matching the
/// original's `writers_lock_` / `readers_lock_` acquisition order --
/// violating it would deadlock against a concurrent `load`.
#[derive(Default)]
pub(crate) struct AddressSets {
    writers: Mutex<HashMap<Address, HashSet<Arc<Transaction>>>>,
    readers: RwLock<HashMap<Address, HashSet<Arc<Transaction>>>>,
    /// Parked on by readers stalled behind a writer; notified whenever
    /// a writer's entry at any address is removed.
    read_stall_cv: Condvar,
}

impl AddressSets {
    pub(crate) fn add_writer(&self, address: Address, txn: &Arc<Transaction>) {
        let writers = self.writers.lock().unwrap();
        self.add_writer_locked(writers, address, txn);
    }

    /// Same as [`Self::add_writer`] but takes an already-held guard, so
    /// a caller that just inspected the map under the same lock (e.g.
    /// the pessimistic writer-loses check) never has to drop and
    /// reacquire it to register itself.
    pub(crate) fn add_writer_locked(
        &self,
        mut writers: std::sync::MutexGuard<'_, HashMap<Address, HashSet<Arc<Transaction>>>>,
        address: Address,
        txn: &Arc<Transaction>,
    ) {
        writers.entry(address).or_default().insert(Arc::clone(txn));
    }

    pub(crate) fn add_reader(&self, address: Address, txn: &Arc<Transaction>) {
        self.readers
            .write()
            .unwrap()
            .entry(address)
            .or_default()
            .insert(Arc::clone(txn));
    }

    /// Remove `txn` from every address entry in both maps, erasing
    /// entries that become empty, then wake anyone stalled waiting for
    /// a writer to vacate.
    pub(crate) fn cleanup(&self, txn: &Arc<Transaction>) {
        {
            let mut writers = self.writers.lock().unwrap();
            for address in txn.write_set_snapshot() {
                if let Some(set) = writers.get_mut(&address) {
                    set.remove(txn);
                    if set.is_empty() {
                        writers.remove(&address);
                    }
                }
            }
        }
        {
            let mut readers = self.readers.write().unwrap();
            for address in txn.read_set_snapshot() {
                if let Some(set) = readers.get_mut(&address) {
                    set.remove(txn);
                    if set.is_empty() {
                        readers.remove(&address);
                    }
                }
            }
        }
        self.read_stall_cv.notify_all();
    }
}
