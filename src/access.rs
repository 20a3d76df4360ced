//! Access layer: tuple shapes and values.
//!
//! - **TupleDesc**: ordered, named, fixed-width field layout
//! - **Tuple**: one row of values, stamped with a record id once stored
//! - **Value** / **DataType**: field values and their on-disk encoding
//!
//! Pages size their slots from `TupleDesc::tuple_size()`; everything else
//! in the storage core treats tuple contents as opaque.

pub mod tuple;
pub mod value;

pub use tuple::{Tuple, TupleDesc};
pub use value::{DataType, Value};
