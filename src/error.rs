//! Crate-wide error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::TableId;
use crate::storage::page::{PageId, RecordId};
use crate::transaction::id::TransactionId;

/// Errors that can occur in the storage core.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {pid} is out of range ({pages} pages on disk)")]
    InvalidPage { pid: PageId, pages: u32 },

    #[error("tuple does not match the table schema")]
    SchemaMismatch,

    #[error("no empty slot on page {pid}")]
    PageFull { pid: PageId },

    #[error("no tuple at {rid}")]
    TupleNotFound { rid: RecordId },

    #[error("tuple has no record id")]
    MissingRecordId,

    #[error("buffer pool contains only dirty pages; nothing can be evicted")]
    NoCleanPage,

    #[error("transaction {tid} aborted by deadlock detection")]
    Deadlock { tid: TransactionId },

    #[error("unknown table {table}")]
    TableNotFound { table: TableId },

    #[error("heap files {first:?} and {second:?} hash to the same table id")]
    TableIdCollision { first: PathBuf, second: PathBuf },

    #[error("heap file {path:?} length is not a multiple of the page size")]
    CorruptHeapFile { path: PathBuf },
}

impl DbError {
    /// True when the error means the transaction has been aborted and the
    /// caller must run rollback (`transaction_complete(tid, false)`) before
    /// doing anything else with it.
    pub fn aborts_transaction(&self) -> bool {
        matches!(self, DbError::Deadlock { .. })
    }
}

/// Result type for storage-core operations.
pub type DbResult<T> = Result<T, DbError>;
