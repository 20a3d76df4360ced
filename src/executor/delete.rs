//! Delete operator.

use std::sync::Arc;

use crate::access::tuple::{Tuple, TupleDesc};
use crate::access::value::{DataType, Value};
use crate::error::DbResult;
use crate::executor::Executor;
use crate::storage::buffer::BufferPool;
use crate::transaction::id::TransactionId;

/// Deletes every tuple produced by its child (which must yield tuples
/// stamped with record ids, e.g. from a scan), then yields a single
/// one-field tuple holding the number of deleted rows.
pub struct Delete {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<dyn Executor>,
    desc: Arc<TupleDesc>,
    done: bool,
}

impl Delete {
    pub fn new(pool: Arc<BufferPool>, tid: TransactionId, child: Box<dyn Executor>) -> Self {
        Self {
            pool,
            tid,
            child,
            desc: Arc::new(TupleDesc::new(vec![(DataType::Int, "count".into())])),
            done: false,
        }
    }
}

impl Executor for Delete {
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
            self.pool.delete_tuple(self.tid, &tuple)?;
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
