// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Versioning engines: per-transaction speculative state and the
//! commit/abort semantics applied to the actual memory locations.
//!
//! Two variants are provided: [`eager::EagerVersionManager`] writes
//! through to memory immediately and keeps an undo log, while
//! [`lazy::LazyVersionManager`] buffers writes and only applies them at
//! commit. See spec §4.1.

pub(crate) mod eager;
pub(crate) mod lazy;

pub(crate) use eager::EagerVersionManager;
pub(crate) use lazy::LazyVersionManager;

use crate::transaction::Address;

/// Capability shared by both versioning variants. Neither buffer nor
/// undo-log bytes are generic over a value type here -- the versioning
/// engine only ever deals in raw byte copies, exactly as spec §3
/// describes ("the core treats the underlying memory as opaque bytes").
/// Type safety is enforced one layer up, in [`crate::transaction::Transaction::store`]
/// and [`crate::transaction::Transaction::load`].
pub(crate) trait VersionManager: Send {
    /// Record a speculative write of `bytes` at `address`.
    fn store(&mut self, address: Address, bytes: &[u8]);

    /// If this transaction has a buffered value for `address`, copy it
    /// into `dest` and return `true`. Otherwise return `false` and leave
    /// `dest` untouched.
    fn get_value(&self, address: Address, dest: &mut [u8]) -> bool;

    /// Reverse every speculative write this transaction made, restoring
    /// memory to its pre-transaction state where applicable.
    fn abort(&mut self);

    /// Commit: apply buffered writes (lazy) or retire the undo log
    /// (eager, a no-op on memory since it was already mutated in place).
    fn end(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_of(x: &mut u64) -> Address {
        x as *mut u64 as Address
    }

    #[test]
    fn eager_store_mutates_in_place_and_abort_restores() {
        let mut cell: u64 = 42;
        let address = addr_of(&mut cell);
        let mut engine = EagerVersionManager::default();

        engine.store(address, &100u64.to_ne_bytes());
        assert_eq!(cell, 100, "eager store must mutate memory immediately");

        engine.abort();
        assert_eq!(cell, 42, "abort must restore the pre-transaction bytes");
    }

    #[test]
    fn eager_keeps_only_the_earliest_undo_entry() {
        let mut cell: u64 = 1;
        let address = addr_of(&mut cell);
        let mut engine = EagerVersionManager::default();

        engine.store(address, &2u64.to_ne_bytes());
        engine.store(address, &3u64.to_ne_bytes());
        assert_eq!(cell, 3);

        engine.abort();
        assert_eq!(cell, 1, "only the first pre-image should ever be restored");
    }

    #[test]
    fn eager_get_value_never_buffers_reads() {
        let mut cell: u64 = 7;
        let address = addr_of(&mut cell);
        let mut engine = EagerVersionManager::default();
        engine.store(address, &9u64.to_ne_bytes());

        let mut dest = [0u8; 8];
        assert!(!engine.get_value(address, &mut dest));
    }

    #[test]
    fn lazy_store_does_not_touch_memory_until_end() {
        let mut cell: u64 = 42;
        let address = addr_of(&mut cell);
        let mut engine = LazyVersionManager::default();

        engine.store(address, &100u64.to_ne_bytes());
        assert_eq!(cell, 42, "lazy store must not mutate memory before commit");

        engine.end();
        assert_eq!(cell, 100);
    }

    #[test]
    fn lazy_get_value_returns_latest_buffered_write() {
        let mut cell: u64 = 0;
        let address = addr_of(&mut cell);
        let mut engine = LazyVersionManager::default();

        engine.store(address, &1u64.to_ne_bytes());
        engine.store(address, &2u64.to_ne_bytes());

        let mut dest = [0u8; 8];
        assert!(engine.get_value(address, &mut dest));
        assert_eq!(u64::from_ne_bytes(dest), 2, "later stores replace earlier buffered bytes");
    }

    #[test]
    fn lazy_abort_never_touches_memory() {
        let mut cell: u64 = 42;
        let address = addr_of(&mut cell);
        let mut engine = LazyVersionManager::default();

        engine.store(address, &100u64.to_ne_bytes());
        engine.abort();
        assert_eq!(cell, 42);
    }
}
