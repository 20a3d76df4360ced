//! Query operators.
//!
//! Volcano-style iterators over the buffer pool: each operator yields
//! tuples one at a time through `next()`. Operators are consumers of the
//! storage core; all page access, locking, and transactional bookkeeping
//! happens behind [`BufferPool`](crate::storage::buffer::BufferPool).

pub mod aggregate;
pub mod delete;
pub mod filter;
pub mod insert;
pub mod seq_scan;

pub use aggregate::{Aggregate, AggregateOp};
pub use delete::Delete;
pub use filter::{CmpOp, Filter, Predicate};
pub use insert::Insert;
pub use seq_scan::SeqScan;

use std::sync::Arc;

use crate::access::tuple::{Tuple, TupleDesc};
use crate::error::DbResult;

/// Iterator interface shared by all query operators.
pub trait Executor {
    /// Prepares the operator. Must be called before `next()`.
    fn open(&mut self) -> DbResult<()>;

    /// Produces the next tuple, or `None` when exhausted.
    fn next(&mut self) -> DbResult<Option<Tuple>>;

    /// Restarts the operator from the beginning.
    fn rewind(&mut self) -> DbResult<()>;

    /// Shape of the tuples this operator produces.
    fn output_desc(&self) -> Arc<TupleDesc>;
}
