//! Aggregation operator.
//!
//! Supports COUNT, SUM, AVG, MIN, and MAX over one field, with an
//! optional single grouping field. Integer fields support every function;
//! string fields support COUNT only.

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::tuple::{Tuple, TupleDesc};
use crate::access::value::{DataType, Value};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        }
    }
}

/// Running state for one group.
#[derive(Debug, Default, Clone)]
struct GroupState {
    count: i32,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl GroupState {
    fn update(&mut self, value: &Value) {
        self.count += 1;
        if let Value::Int(i) = value {
            self.sum += *i as i64;
            self.min = Some(self.min.map_or(*i, |m| m.min(*i)));
            self.max = Some(self.max.map_or(*i, |m| m.max(*i)));
        }
    }

    fn result(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Count => self.count,
            AggregateOp::Sum => self.sum as i32,
            AggregateOp::Avg => (self.sum / self.count.max(1) as i64) as i32,
            AggregateOp::Min => self.min.unwrap_or(0),
            AggregateOp::Max => self.max.unwrap_or(0),
        }
    }
}

/// Consumes its child on `open()` and yields one tuple per group: the
/// group value followed by the aggregate, or just the aggregate when no
/// grouping field is given.
pub struct Aggregate {
    child: Box<dyn Executor>,
    op: AggregateOp,
    agg_field: usize,
    group_field: Option<usize>,
    desc: Arc<TupleDesc>,
    results: std::vec::IntoIter<Tuple>,
    opened: bool,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn Executor>,
        op: AggregateOp,
        agg_field: usize,
        group_field: Option<usize>,
    ) -> DbResult<Self> {
        let input = child.output_desc();
        if matches!(input.field_type(agg_field), DataType::Str(_)) && op != AggregateOp::Count {
            return Err(DbError::SchemaMismatch);
        }
        let agg_name = format!("{}({})", op.name(), input.field_name(agg_field));
        let desc = match group_field {
            Some(g) => Arc::new(TupleDesc::new(vec![
                (input.field_type(g), input.field_name(g).to_string()),
                (DataType::Int, agg_name),
            ])),
            None => Arc::new(TupleDesc::new(vec![(DataType::Int, agg_name)])),
        };
        Ok(Self {
            child,
            op,
            agg_field,
            group_field,
            desc,
            results: Vec::new().into_iter(),
            opened: false,
        })
    }

    fn compute(&mut self) -> DbResult<Vec<Tuple>> {
        let mut groups: HashMap<Option<Value>, GroupState> = HashMap::new();
        let mut group_order: Vec<Option<Value>> = Vec::new();
        while let Some(tuple) = self.child.next()? {
            let key = self.group_field.map(|g| tuple.value(g).clone());
            if !groups.contains_key(&key) {
                group_order.push(key.clone());
            }
            groups
                .entry(key)
                .or_default()
                .update(tuple.value(self.agg_field));
        }

        // A grand aggregate over zero rows still produces one row.
        if self.group_field.is_none() && group_order.is_empty() {
            group_order.push(None);
            groups.insert(None, GroupState::default());
        }

        let mut out = Vec::with_capacity(group_order.len());
        for key in group_order {
            let state = &groups[&key];
            let agg = Value::Int(state.result(self.op));
            let values = match key {
                Some(group) => vec![group, agg],
                None => vec![agg],
            };
            out.push(Tuple::new(self.desc.clone(), values)?);
        }
        Ok(out)
    }
}

impl Executor for Aggregate {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()?;
        let results = self.compute()?;
        self.results = results.into_iter();
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        debug_assert!(self.opened, "open() must be called before next()");
        Ok(self.results.next())
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.child.rewind()?;
        let results = self.compute()?;
        self.results = results.into_iter();
        Ok(())
    }

    fn output_desc(&self) -> Arc<TupleDesc> {
        self.desc.clone()
    }
}
