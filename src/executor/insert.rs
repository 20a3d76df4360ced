//! Insert operator.

use std::sync::Arc;

use crate::access::tuple::{Tuple, TupleDesc};
use crate::access::value::{DataType, Value};
use crate::catalog::TableId;
use crate::error::DbResult;
use crate::executor::Executor;
use crate::storage::buffer::BufferPool;
use crate::transaction::id::TransactionId;

/// Inserts every tuple produced by its child into a table, then yields a
/// single one-field tuple holding the number of inserted rows.
pub struct Insert {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table: TableId,
    child: Box<dyn Executor>,
    desc: Arc<TupleDesc>,
    done: bool,
}

impl Insert {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table: TableId,
        child: Box<dyn Executor>,
    ) -> Self {
        Self {
            pool,
            tid,
            table,
            child,
            desc: Arc::new(TupleDesc::new(vec![(DataType::Int, "count".into())])),
            done: false,
        }
    }
}

impl Executor for Insert {
    fn open(&mut self) -> DbResult<()> {
        self.done = false;
        self.child.open()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            let mut fresh = tuple;
            fresh.set_record_id(None);
            self.pool.insert_tuple(self.tid, self.table, &mut fresh)?;
            count += 1;
        }
        self.done = true;
        Ok(Some(Tuple::new(self.desc.clone(), vec![Value::Int(count)])?))
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.done = false;
        self.child.rewind()
    }

    fn output_desc(&self) -> Arc<TupleDesc> {
        self.desc.clone()
    }
}
