// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error as DeriveError;

/// Errors raised by the transactional memory core.
///
/// [`TxError::Abort`] is the cooperative "abort signal" described in the
/// design notes: it tells the caller that a transaction did not commit
/// and that its resources have already been released. Every other
/// variant is either a one-time configuration error or a usage error.
#[derive(Debug, DeriveError, PartialEq, Eq, Clone)]
pub enum TxError {
    /// The transaction did not commit. Its state is terminal (`ABORTED`)
    /// and all of its buffers/undo logs have been released. The caller
    /// is expected to discard the transaction and retry with a new one.
    #[error("transaction aborted")]
    Abort,

    /// Raised from [`crate::TransactionManager::new`] when the
    /// requested combination of versioning and conflict detection is
    /// inconsistent (eager versioning with optimistic detection).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// `end()` was called on a transaction that was already in the
    /// `COMMITTING` state. This is a caller bug, not a conflict; it is
    /// logged and returned rather than panicking.
    #[error("transaction is already committing")]
    AlreadyCommitting,
}
