//! Tuple descriptors and tuples.

use std::fmt;
use std::sync::Arc;

use crate::access::value::{DataType, Value};
use crate::error::{DbError, DbResult};
use crate::storage::page::RecordId;

/// An ordered sequence of named, typed fields describing a row shape.
///
/// Field names are carried for operator output labeling; schema equality
/// is decided by field types alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDesc {
    fields: Vec<(DataType, String)>,
}

impl TupleDesc {
    pub fn new(fields: Vec<(DataType, String)>) -> Self {
        Self { fields }
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type(&self, i: usize) -> DataType {
        self.fields[i].0
    }

    pub fn field_name(&self, i: usize) -> &str {
        &self.fields[i].1
    }

    /// Index of the field with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(_, n)| n == name)
    }

    /// Byte offset of field `i` within an encoded tuple.
    pub fn field_offset(&self, i: usize) -> usize {
        self.fields[..i].iter().map(|(t, _)| t.byte_len()).sum()
    }

    /// Encoded byte size of one tuple of this shape.
    pub fn tuple_size(&self) -> usize {
        self.fields.iter().map(|(t, _)| t.byte_len()).sum()
    }

    /// True when both descriptors have the same field types, in order.
    /// Names are ignored.
    pub fn same_types(&self, other: &TupleDesc) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|((a, _), (b, _))| a == b)
    }

    /// Concatenates two descriptors, `self` first.
    pub fn combine(&self, other: &TupleDesc) -> TupleDesc {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        TupleDesc::new(fields)
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (t, n)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", n, t)?;
        }
        write!(f, ")")
    }
}

/// A row of values matching a [`TupleDesc`], stamped with the record id of
/// the slot it occupies once it has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Builds a tuple, validating arity and per-field compatibility.
    pub fn new(desc: Arc<TupleDesc>, values: Vec<Value>) -> DbResult<Self> {
        if values.len() != desc.num_fields() {
            return Err(DbError::SchemaMismatch);
        }
        for (i, value) in values.iter().enumerate() {
            if !value.is_compatible_with(desc.field_type(i)) {
                return Err(DbError::SchemaMismatch);
            }
        }
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn value(&self, i: usize) -> &Value {
        &self.values[i]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Encodes the tuple field by field in declared order. Always produces
    /// exactly `desc.tuple_size()` bytes; compatibility was checked at
    /// construction.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.desc.tuple_size()];
        for (i, value) in self.values.iter().enumerate() {
            let offset = self.desc.field_offset(i);
            let width = self.desc.field_type(i).byte_len();
            value
                .encode_into(self.desc.field_type(i), &mut buf[offset..offset + width])
                .expect("tuple values validated at construction");
        }
        buf
    }

    /// Decodes one tuple from `buf`, which must be exactly
    /// `desc.tuple_size()` bytes.
    pub fn decode(desc: Arc<TupleDesc>, buf: &[u8]) -> DbResult<Tuple> {
        if buf.len() != desc.tuple_size() {
            return Err(DbError::SchemaMismatch);
        }
        let mut values = Vec::with_capacity(desc.num_fields());
        for i in 0..desc.num_fields() {
            let offset = desc.field_offset(i);
            let width = desc.field_type(i).byte_len();
            values.push(Value::decode(
                desc.field_type(i),
                &buf[offset..offset + width],
            )?);
        }
        Ok(Tuple {
            desc,
            values,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_str_desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(vec![
            (DataType::Int, "id".into()),
            (DataType::Str(8), "name".into()),
        ]))
    }

    #[test]
    fn test_desc_layout() {
        let desc = int_str_desc();
        assert_eq!(desc.num_fields(), 2);
        assert_eq!(desc.tuple_size(), 4 + 12);
        assert_eq!(desc.field_offset(0), 0);
        assert_eq!(desc.field_offset(1), 4);
        assert_eq!(desc.index_of("name"), Some(1));
        assert_eq!(desc.index_of("missing"), None);
    }

    #[test]
    fn test_same_types_ignores_names() {
        let a = TupleDesc::new(vec![(DataType::Int, "a".into())]);
        let b = TupleDesc::new(vec![(DataType::Int, "b".into())]);
        let c = TupleDesc::new(vec![(DataType::Str(4), "a".into())]);
        assert!(a.same_types(&b));
        assert!(!a.same_types(&c));
    }

    #[test]
    fn test_combine() {
        let a = TupleDesc::new(vec![(DataType::Int, "a".into())]);
        let b = TupleDesc::new(vec![(DataType::Str(4), "b".into())]);
        let both = a.combine(&b);
        assert_eq!(both.num_fields(), 2);
        assert_eq!(both.field_name(0), "a");
        assert_eq!(both.field_name(1), "b");
    }

    #[test]
    fn test_tuple_round_trip() {
        let desc = int_str_desc();
        let tuple = Tuple::new(
            desc.clone(),
            vec![Value::Int(42), Value::Str("hello".into())],
        )
        .unwrap();
        let bytes = tuple.encode();
        assert_eq!(bytes.len(), desc.tuple_size());
        let decoded = Tuple::decode(desc, &bytes).unwrap();
        assert_eq!(decoded.value(0), &Value::Int(42));
        assert_eq!(decoded.value(1), &Value::Str("hello".into()));
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let desc = int_str_desc();
        let result = Tuple::new(desc, vec![Value::Int(1)]);
        assert!(matches!(result, Err(DbError::SchemaMismatch)));
    }

    #[test]
    fn test_tuple_type_mismatch() {
        let desc = int_str_desc();
        let result = Tuple::new(desc, vec![Value::Str("x".into()), Value::Str("y".into())]);
        assert!(matches!(result, Err(DbError::SchemaMismatch)));
    }
}
