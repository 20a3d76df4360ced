//! Sequential scan over a heap file.

use std::sync::Arc;

use crate::access::tuple::{Tuple, TupleDesc};
use crate::catalog::{Catalog, TableId};
use crate::error::DbResult;
use crate::executor::Executor;
use crate::storage::buffer::BufferPool;
use crate::storage::heap_file::{HeapFile, HeapScan};
use crate::transaction::id::TransactionId;

/// Reads every tuple of a table in page-then-slot order, taking SHARED
/// page locks as it goes.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    file: Arc<HeapFile>,
    tid: TransactionId,
    scan: Option<HeapScan>,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        catalog: &Catalog,
        tid: TransactionId,
        table: TableId,
    ) -> DbResult<Self> {
        let file = catalog.file(table)?;
        Ok(Self {
            pool,
            file,
            tid,
            scan: None,
        })
    }
}

impl Executor for SeqScan {
    fn open(&mut self) -> DbResult<()> {
        self.scan = Some(Arc::clone(&self.file).scan(Arc::clone(&self.pool), self.tid));
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        let scan = self
            .scan
            .as_mut()
            .expect("open() must be called before next()");
        scan.next()
    }

    fn rewind(&mut self) -> DbResult<()> {
        if let Some(scan) = self.scan.as_mut() {
            scan.rewind();
        }
        Ok(())
    }

    fn output_desc(&self) -> Arc<TupleDesc> {
        self.file.desc().clone()
    }
}
