// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Optimistic conflict detection: addresses are recorded without any
//! checking during execution; all conflicts are found and resolved
//! ("committer wins") at commit time. Grounded on
//! `TransactionManager::ResolveConflictsAtCommit` /
//! `AbortTransactionsWithConflictsWithoutLocking` in the original
//! simulator (spec §4.3.2).

use super::{AddressSets, ConflictDetector};
use crate::{error::TxError, transaction::Address, transaction::Transaction};
use log::trace;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct OptimisticDetector {
    sets: AddressSets,
}

impl ConflictDetector for OptimisticDetector {
    fn store(&self, txn: &Arc<Transaction>, address: Address) -> Result<(), TxError> {
        self.sets.add_writer(address, txn);
        Ok(())
    }

    fn load(&self, txn: &Arc<Transaction>, address: Address) -> Result<(), TxError> {
        self.sets.add_reader(address, txn);
        Ok(())
    }

    /// Committer wins: every other transaction found holding any
    /// address this transaction wrote to -- as either a reader or a
    /// writer -- is killed. If any of them has already moved past
    /// `RUNNING` (i.e. it is itself committing), this transaction backs
    /// off and aborts instead.
    fn resolve_conflicts_at_commit(&self, txn: &Arc<Transaction>) -> Result<(), TxError> {
        let addresses = txn.write_set_snapshot();

        let writers = self.sets.writers.lock().unwrap();
        let readers = self.sets.readers.read().unwrap();

        let mut victims = Vec::new();
        for address in &addresses {
            if let Some(set) = writers.get(address) {
                victims.extend(set.iter().filter(|other| !Arc::ptr_eq(other, txn)).cloned());
            }
            if let Some(set) = readers.get(address) {
                victims.extend(set.iter().filter(|other| !Arc::ptr_eq(other, txn)).cloned());
            }
        }
        drop(readers);
        drop(writers);

        for victim in victims {
            if !victim.mark_aborted() {
                trace!(
                    "transaction {} could not preempt {} at commit, backing off",
                    txn.id(),
                    victim.id()
                );
                txn.mark_aborted();
                txn.rollback_version_manager();
                self.sets.cleanup(txn);
                return Err(TxError::Abort);
            }
            self.sets.cleanup(&victim);
        }

        Ok(())
    }

    fn cleanup(&self, txn: &Arc<Transaction>) {
        self.sets.cleanup(txn);
    }
}
