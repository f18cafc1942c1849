// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # stm-core
//!
//! Software transactional memory over arbitrary `Copy` values in
//! shared memory. A [`TransactionManager`] is configured once with a
//! versioning strategy (eager write-through+undo, or lazy write-buffer)
//! and a conflict detection strategy (pessimistic writer-loses/
//! reader-stalls, or optimistic committer-wins), then mints
//! [`Transaction`]s that `store`/`load` through it and finally `end` to
//! commit or `abort` to roll back.
//!
//! ```no_run
//! use stm_core::TransactionManager;
//!
//! let manager = TransactionManager::new(/* lazy */ true, /* pessimistic */ true)?;
//! let mut balance: i64 = 100;
//!
//! let txn = manager.begin();
//! let current = txn.load(&balance as *const i64)?;
//! txn.store(&mut balance as *mut i64, current - 10)?;
//! txn.end()?;
//! # Ok::<(), stm_core::TxError>(())
//! ```

mod detector;
mod error;
mod manager;
mod transaction;
mod version;

pub use error::TxError;
pub use manager::TransactionManager;
pub use transaction::Transaction;
