//! Table catalog.
//!
//! In-memory registry mapping table ids to heap files and schemas. A
//! table's id is a stable hash of its backing file's canonical path, so
//! the catalog must refuse to register two distinct paths that collide.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::access::tuple::TupleDesc;
use crate::error::{DbError, DbResult};
use crate::storage::heap_file::HeapFile;

/// Identifies a table. Derived from the heap file's canonical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct TableInfo {
    name: String,
    file: Arc<HeapFile>,
}

/// Registry of all tables known to a database instance.
pub struct Catalog {
    tables: DashMap<TableId, TableInfo>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Registers a table. A table re-registered under the same path or the
    /// same name replaces the previous entry; two distinct paths hashing to
    /// the same id are rejected.
    pub fn register(&self, name: &str, file: Arc<HeapFile>) -> DbResult<TableId> {
        let id = file.table_id();
        if let Some(existing) = self.tables.get(&id) {
            if existing.file.path() != file.path() {
                return Err(DbError::TableIdCollision {
                    first: existing.file.path().to_path_buf(),
                    second: file.path().to_path_buf(),
                });
            }
        }
        self.tables
            .retain(|_, info| info.name != name || info.file.path() == file.path());
        self.tables.insert(
            id,
            TableInfo {
                name: name.to_string(),
                file,
            },
        );
        Ok(id)
    }

    /// Resolves a table id to its heap file.
    pub fn file(&self, table: TableId) -> DbResult<Arc<HeapFile>> {
        self.tables
            .get(&table)
            .map(|info| info.file.clone())
            .ok_or(DbError::TableNotFound { table })
    }

    /// Resolves a table id to its tuple descriptor.
    pub fn tuple_desc(&self, table: TableId) -> DbResult<Arc<TupleDesc>> {
        Ok(self.file(table)?.desc().clone())
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|entry| entry.value().name == name)
            .map(|entry| *entry.key())
    }

    pub fn table_name(&self, table: TableId) -> Option<String> {
        self.tables.get(&table).map(|info| info.name.clone())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|entry| entry.value().name.clone())
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
