//! Transaction lifecycle: begin, commit, abort.
//!
//! Commit and abort are thin wrappers over the buffer pool's
//! `transaction_complete`, which flushes or rolls back the transaction's
//! dirty pages and releases its locks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::DbResult;
use crate::storage::buffer::BufferPool;
use crate::transaction::id::{TransactionId, TransactionIdGenerator};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "active"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Allocates transaction ids and tracks lifecycle states.
pub struct TransactionManager {
    id_generator: TransactionIdGenerator,
    states: RwLock<HashMap<TransactionId, TransactionState>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            id_generator: TransactionIdGenerator::new(),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a fresh transaction id. No lock or cache state exists
    /// until the transaction touches its first page.
    pub fn begin(&self) -> TransactionId {
        let tid = self.id_generator.next();
        self.states.write().insert(tid, TransactionState::Active);
        debug!("{} began", tid);
        tid
    }

    pub fn state(&self, tid: TransactionId) -> Option<TransactionState> {
        self.states.read().get(&tid).copied()
    }

    pub fn is_active(&self, tid: TransactionId) -> bool {
        self.state(tid) == Some(TransactionState::Active)
    }

    pub fn active_count(&self) -> usize {
        self.states
            .read()
            .values()
            .filter(|s| **s == TransactionState::Active)
            .count()
    }

    /// Commits or aborts `tid` against the given buffer pool.
    pub fn complete(&self, pool: &BufferPool, tid: TransactionId, commit: bool) -> DbResult<()> {
        let result = pool.transaction_complete(tid, commit);
        let state = if commit && result.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        self.states.write().insert(tid, state);
        debug!("{} {}", tid, state);
        result
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A running transaction. Aborts on drop unless committed or aborted
/// explicitly, so partial writes never outlive the handle.
pub struct Transaction {
    id: TransactionId,
    pool: Arc<BufferPool>,
    manager: Arc<TransactionManager>,
    finished: bool,
}

impl Transaction {
    pub fn new(pool: Arc<BufferPool>, manager: Arc<TransactionManager>) -> Self {
        let id = manager.begin();
        Self {
            id,
            pool,
            manager,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flushes this transaction's dirty pages and releases its locks.
    pub fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        self.manager.complete(&self.pool, self.id, true)
    }

    /// Rolls back this transaction's page mutations and releases its locks.
    pub fn abort(mut self) -> DbResult<()> {
        self.finished = true;
        self.manager.complete(&self.pool, self.id, false)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.manager.complete(&self.pool, self.id, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn test_pool() -> Arc<BufferPool> {
        Arc::new(BufferPool::new(4, Arc::new(Catalog::new())))
    }

    #[test]
    fn test_begin_is_unique_and_active() {
        let manager = TransactionManager::new();
        let a = manager.begin();
        let b = manager.begin();
        assert_ne!(a, b);
        assert!(manager.is_active(a));
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_commit_and_abort_states() {
        let pool = test_pool();
        let manager = TransactionManager::new();

        let a = manager.begin();
        manager.complete(&pool, a, true).unwrap();
        assert_eq!(manager.state(a), Some(TransactionState::Committed));

        let b = manager.begin();
        manager.complete(&pool, b, false).unwrap();
        assert_eq!(manager.state(b), Some(TransactionState::Aborted));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_handle_commit() {
        let pool = test_pool();
        let manager = Arc::new(TransactionManager::new());
        let txn = Transaction::new(pool, Arc::clone(&manager));
        let id = txn.id();
        txn.commit().unwrap();
        assert_eq!(manager.state(id), Some(TransactionState::Committed));
    }

    #[test]
    fn test_handle_aborts_on_drop() {
        let pool = test_pool();
        let manager = Arc::new(TransactionManager::new());
        let id = {
            let txn = Transaction::new(pool, Arc::clone(&manager));
            txn.id()
        };
        assert_eq!(manager.state(id), Some(TransactionState::Aborted));
    }
}
