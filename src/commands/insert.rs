//! `INSERT`.

use crate::commands::{run_in_transaction, ExecutionError};
use crate::database::Database;
use crate::expressions::{Expression, Literal};
use crate::storage::table_manager::get_table_file_name;
use crate::storage::TupleLiteral;

/// The `INSERT INTO ... VALUES ...` command.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    /// The target table.
    pub table_name: String,
    /// The target columns, when the statement lists them; `None` means all columns in schema
    /// order.
    pub column_names: Option<Vec<String>>,
    /// One expression list per row to insert.
    pub rows: Vec<Vec<Expression>>,
}

impl InsertCommand {
    /// An insert of full rows, in schema column order.
    pub fn new(table_name: &str, rows: Vec<Vec<Expression>>) -> InsertCommand {
        InsertCommand {
            table_name: table_name.to_string(),
            column_names: None,
            rows,
        }
    }

    /// Executes the command: each row's expressions are evaluated, checked against the column
    /// types, stored, and logged.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        db.storage.open_table(&self.table_name)?;
        let schema = db.storage.table_schema(&self.table_name)?.schema.clone();

        // Map each target column position to its schema index.
        let target_indexes: Vec<usize> = match self.column_names {
            Some(ref names) => {
                let mut indexes = Vec::with_capacity(names.len());
                for name in names {
                    let (idx, _) = schema.find_column(&(None, Some(name.clone())))?;
                    indexes.push(idx);
                }
                indexes
            }
            None => (0..schema.num_columns()).collect(),
        };

        let table_name = self.table_name.clone();
        let rows = self.rows.clone();
        run_in_transaction(db, move |db| {
            let mut inserted = 0usize;
            for row in &rows {
                if row.len() != target_indexes.len() {
                    return Err(ExecutionError::ColumnCountMismatch(
                        target_indexes.len(),
                        row.len(),
                    ));
                }

                // Unmentioned columns are filled with NULL.
                let mut values = vec![Literal::Null; schema.num_columns()];
                for (expr, &idx) in row.iter().zip(target_indexes.iter()) {
                    values[idx] = expr.evaluate(None)?;
                }

                for (idx, value) in values.iter().enumerate() {
                    let col_type = schema[idx].column_type;
                    if !col_type.can_store_literal(value) {
                        return Err(ExecutionError::CannotStoreValue(
                            schema[idx].name.clone().unwrap_or_default(),
                            format!("{}", value),
                        ));
                    }
                }

                let tuple = TupleLiteral::from_values(values);
                let stored = db.storage.add_tuple(&table_name, &tuple)?;
                let handle = stored.page_handle();
                drop(stored);
                db.record_page_update(&get_table_file_name(&table_name), &handle)?;
                inserted += 1;
            }
            Ok(format!("Inserted {} row(s) into {}.", inserted, table_name))
        })
    }
}
