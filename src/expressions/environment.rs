//! This module contains the `Environment` type, which supplies tuple bindings to expression
//! evaluation.

use crate::expressions::{ExpressionError, Literal};
use crate::relations::{ColumnName, Schema};
use crate::storage::tuple_literal::TupleLiteral;
use crate::storage::Tuple;

/// A stack of (schema, tuple) bindings used to resolve column references during expression
/// evaluation.
///
/// Plan nodes push the tuples currently flowing through them before evaluating predicates or
/// projections; nested scopes (e.g. a join's two inputs, added left then right) are resolved
/// innermost-first, so the most recently added binding shadows outer ones when both contain a
/// column of the same name.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Vec<(Schema, TupleLiteral)>,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Environment {
        Environment { bindings: vec![] }
    }

    /// Pushes a (schema, tuple) binding onto the environment.
    pub fn add_tuple(&mut self, schema: Schema, tuple: TupleLiteral) {
        self.bindings.push((schema, tuple));
    }

    /// Removes all bindings, allowing the environment to be reused for the next row.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Returns the concatenation of all bound schemas, outermost first. Used to compute the
    /// schema an expression will see at evaluation time.
    pub fn get_common_schema(&self) -> Schema {
        let mut result = Schema::new();
        for (schema, _) in &self.bindings {
            // Duplicate names across scopes are tolerated here; resolution handles ambiguity.
            for info in schema.iter() {
                let _ = result.add_column(info.clone());
            }
        }
        result
    }

    /// Resolves a column reference against the bindings, innermost binding first.
    ///
    /// # Errors
    /// `AmbiguousColumn` if an unqualified name matches several columns within the same binding;
    /// `CouldNotResolve` if no binding contains the column.
    pub fn get_column_value(&self, name: &ColumnName) -> Result<Literal, ExpressionError> {
        for (schema, tuple) in self.bindings.iter().rev() {
            let found = schema.find_columns(name);
            match found.len() {
                0 => continue,
                1 => {
                    return tuple
                        .get_column_value(found[0].0)
                        .map_err(|_| ExpressionError::CouldNotResolve(name.clone()));
                }
                _ => {
                    return Err(ExpressionError::AmbiguousColumn(
                        crate::relations::column_name_to_string(name),
                    ));
                }
            }
        }
        Err(ExpressionError::CouldNotResolve(name.clone()))
    }
}
