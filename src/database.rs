//! Database context wiring the layers together.
//!
//! One `Database` value owns the configuration, catalog, buffer pool, and
//! transaction manager of an instance. It is passed (or cloned via its
//! inner `Arc`s) to whoever needs it; there are no process-wide globals.

use std::path::Path;
use std::sync::Arc;

use crate::access::tuple::TupleDesc;
use crate::catalog::{Catalog, TableId};
use crate::config::DbConfig;
use crate::error::DbResult;
use crate::storage::buffer::BufferPool;
use crate::storage::heap_file::HeapFile;
use crate::transaction::manager::{Transaction, TransactionManager};

pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
    tx_manager: Arc<TransactionManager>,
}

impl Database {
    /// Builds a database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DbConfig::default())
    }

    /// Builds a database with the given configuration. The page size is
    /// fixed for the lifetime of the instance.
    pub fn with_config(config: DbConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            Arc::clone(&catalog),
        ));
        Self {
            config,
            catalog,
            buffer_pool,
            tx_manager: Arc::new(TransactionManager::new()),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn tx_manager(&self) -> &Arc<TransactionManager> {
        &self.tx_manager
    }

    /// Opens (creating if absent) a heap file at `path` and registers it
    /// under `name`.
    pub fn create_table(
        &self,
        name: &str,
        path: &Path,
        desc: Arc<TupleDesc>,
    ) -> DbResult<TableId> {
        let file = HeapFile::open(path, desc, self.config.page_size)?;
        self.catalog.register(name, file)
    }

    /// Starts a transaction. The returned handle aborts on drop unless
    /// committed or aborted explicitly.
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.buffer_pool), Arc::clone(&self.tx_manager))
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
