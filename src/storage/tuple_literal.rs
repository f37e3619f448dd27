//! An in-memory tuple of literal values, used for intermediate query results.

use std::fmt;

use crate::expressions::Literal;
use crate::relations::{ColumnInfo, Schema};
use crate::storage::{Tuple, TupleError};

/// A simple implementation of the [`Tuple`] interface for storing literal values in memory.
///
/// Joins, sorts and projections produce tuple-literals, since they must outlive the buffer
/// pages their inputs came from. Each value optionally carries the column metadata it was
/// copied with, so downstream operators can recover column names without consulting a schema.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TupleLiteral {
    values: Vec<Literal>,
    infos: Vec<Option<ColumnInfo>>,
}

impl TupleLiteral {
    /// Construct a new tuple-literal that initially has zero columns. Values are added with
    /// [`add_value`](Self::add_value), or entire tuples appended with
    /// [`append_tuple`](Self::append_tuple).
    pub fn new() -> TupleLiteral {
        TupleLiteral::default()
    }

    /// Constructs a tuple-literal holding `count` NULL values.
    pub fn null(count: usize) -> TupleLiteral {
        TupleLiteral {
            values: vec![Literal::Null; count],
            infos: vec![None; count],
        }
    }

    /// Constructs a tuple-literal from a list of values, with no column metadata.
    pub fn from_values<I: IntoIterator<Item = Literal>>(values: I) -> TupleLiteral {
        let values: Vec<Literal> = values.into_iter().collect();
        let infos = vec![None; values.len()];
        TupleLiteral { values, infos }
    }

    /// Constructs a new tuple-literal that is a copy of the specified tuple.
    pub fn from_tuple<T: Tuple + ?Sized>(tuple: &T) -> Result<TupleLiteral, TupleError> {
        let mut result = TupleLiteral::new();
        result.append_tuple(tuple)?;
        Ok(result)
    }

    /// Appends the specified value to the end of the tuple-literal.
    pub fn add_value(&mut self, value: Literal) {
        self.values.push(value);
        self.infos.push(None);
    }

    /// Appends a value along with its column metadata.
    pub fn add_value_with_info(&mut self, value: Literal, info: ColumnInfo) {
        self.values.push(value);
        self.infos.push(Some(info));
    }

    /// Appends the specified tuple's values to this tuple-literal.
    pub fn append_tuple<T: Tuple + ?Sized>(&mut self, tuple: &T) -> Result<(), TupleError> {
        for i in 0..tuple.get_column_count() {
            self.values.push(tuple.get_column_value(i)?);
            self.infos.push(None);
        }
        Ok(())
    }

    /// Appends the specified tuple's values, copying the column metadata from the given schema
    /// as well. The schema must have the same arity as the tuple.
    pub fn append_tuple_with_schema<T: Tuple + ?Sized>(
        &mut self,
        tuple: &T,
        schema: &Schema,
    ) -> Result<(), TupleError> {
        debug_assert_eq!(schema.num_columns(), tuple.get_column_count());
        for i in 0..tuple.get_column_count() {
            self.values.push(tuple.get_column_value(i)?);
            self.infos.push(Some(schema[i].clone()));
        }
        Ok(())
    }

    /// Returns the column metadata captured for the given column, if any.
    pub fn get_column_info(&self, col_index: usize) -> Option<&ColumnInfo> {
        self.infos.get(col_index).and_then(|info| info.as_ref())
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Literal] {
        &self.values
    }
}

impl Tuple for TupleLiteral {
    fn is_disk_backed(&self) -> bool {
        false
    }

    fn get_column_count(&self) -> usize {
        self.values.len()
    }

    fn is_null_value(&self, col_index: usize) -> Result<bool, TupleError> {
        match self.values.get(col_index) {
            Some(value) => Ok(*value == Literal::Null),
            None => Err(TupleError::InvalidColumnIndex(col_index, self.values.len())),
        }
    }

    fn get_column_value(&self, col_index: usize) -> Result<Literal, TupleError> {
        match self.values.get(col_index) {
            Some(value) => Ok(value.clone()),
            None => Err(TupleError::InvalidColumnIndex(col_index, self.values.len())),
        }
    }

    fn set_column_value(&mut self, col_index: usize, value: Literal) -> Result<(), TupleError> {
        let len = self.values.len();
        match self.values.get_mut(col_index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(TupleError::InvalidColumnIndex(col_index, len)),
        }
    }
}

impl fmt::Display for TupleLiteral {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| format!("{}", v)).collect();
        write!(f, "TL[{}]", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::ColumnType;

    #[test]
    fn test_basic_accessors() {
        let mut tuple = TupleLiteral::new();
        tuple.add_value(Literal::Int(1));
        tuple.add_value(Literal::Null);
        tuple.add_value(Literal::from("x"));

        assert_eq!(tuple.get_column_count(), 3);
        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(1)));
        assert_eq!(tuple.is_null_value(0), Ok(false));
        assert_eq!(tuple.is_null_value(1), Ok(true));
        assert!(!tuple.is_disk_backed());

        assert_eq!(
            tuple.get_column_value(3),
            Err(TupleError::InvalidColumnIndex(3, 3))
        );
    }

    #[test]
    fn test_values_and_null_flags_agree() {
        let mut tuple = TupleLiteral::new();
        tuple.add_value(Literal::Int(5));
        tuple.add_value(Literal::Null);

        for i in 0..tuple.get_column_count() {
            let is_null = tuple.is_null_value(i).unwrap();
            let value = tuple.get_column_value(i).unwrap();
            assert_eq!(is_null, value == Literal::Null);
        }
    }

    #[test]
    fn test_append_copies_values_and_metadata() {
        let schema = Schema::with_columns(vec![
            ColumnInfo::with_table_name(ColumnType::Integer, "a", "t"),
            ColumnInfo::with_table_name(ColumnType::Integer, "b", "t"),
        ])
        .unwrap();

        let source = TupleLiteral::from_values(vec![Literal::Int(1), Literal::Int(2)]);

        let mut joined = TupleLiteral::new();
        joined.append_tuple_with_schema(&source, &schema).unwrap();
        joined.add_value(Literal::Int(3));

        assert_eq!(joined.get_column_count(), 3);
        assert_eq!(joined.get_column_info(0), Some(&schema[0]));
        assert_eq!(joined.get_column_info(1), Some(&schema[1]));
        assert_eq!(joined.get_column_info(2), None);
    }

    #[test]
    fn test_from_tuple_copies() {
        let source = TupleLiteral::from_values(vec![Literal::Int(9), Literal::from("z")]);
        let copy = TupleLiteral::from_tuple(&source).unwrap();
        assert_eq!(copy.values(), source.values());
    }

    #[test]
    fn test_set_column_value() {
        let mut tuple = TupleLiteral::from_values(vec![Literal::Int(1)]);
        tuple.set_column_value(0, Literal::Int(7)).unwrap();
        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(7)));
        assert!(tuple.set_column_value(5, Literal::Null).is_err());
    }

    #[test]
    fn test_display() {
        let tuple = TupleLiteral::from_values(vec![
            Literal::Int(1),
            Literal::from("x"),
            Literal::Null,
        ]);
        assert_eq!(format!("{}", tuple), "TL[1,'x',NULL]");
    }
}
