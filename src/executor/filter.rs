//! Predicate filter operator.

use std::sync::Arc;

use crate::access::tuple::{Tuple, TupleDesc};
use crate::access::value::Value;
use crate::error::DbResult;
use crate::executor::Executor;

/// Comparison operators for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Compares one field of a tuple against a constant.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: CmpOp,
    operand: Value,
}

impl Predicate {
    pub fn new(field: usize, op: CmpOp, operand: Value) -> Self {
        Self { field, op, operand }
    }

    /// Evaluates the predicate. Values of different types never compare
    /// equal (and order between them is undefined, so every comparison is
    /// false).
    pub fn eval(&self, tuple: &Tuple) -> bool {
        let lhs = tuple.value(self.field);
        match (lhs, &self.operand) {
            (Value::Int(_), Value::Int(_)) | (Value::Str(_), Value::Str(_)) => {}
            _ => return false,
        }
        match self.op {
            CmpOp::Eq => lhs == &self.operand,
            CmpOp::Ne => lhs != &self.operand,
            CmpOp::Lt => lhs < &self.operand,
            CmpOp::Le => lhs <= &self.operand,
            CmpOp::Gt => lhs > &self.operand,
            CmpOp::Ge => lhs >= &self.operand,
        }
    }
}

/// Passes through the child's tuples that satisfy the predicate.
pub struct Filter {
    child: Box<dyn Executor>,
    predicate: Predicate,
}

impl Filter {
    pub fn new(child: Box<dyn Executor>, predicate: Predicate) -> Self {
        Self { child, predicate }
    }
}

impl Executor for Filter {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            if self.predicate.eval(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.child.rewind()
    }

    fn output_desc(&self) -> Arc<TupleDesc> {
        self.child.output_desc()
    }
}
