//! `UPDATE`.

use crate::commands::{run_in_transaction, ExecutionError};
use crate::database::Database;
use crate::expressions::{Environment, Expression, Literal};
use crate::queries::FileScanNode;
use crate::storage::table_manager::get_table_file_name;
use crate::storage::FilePointer;

/// The `UPDATE ... SET ... [WHERE ...]` command.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    /// The target table.
    pub table_name: String,
    /// Column-name → new-value assignments. Value expressions may reference the row being
    /// updated, as in `SET a = a + 1`.
    pub changes: Vec<(String, Expression)>,
    /// The rows to update; `None` updates every row.
    pub where_expr: Option<Expression>,
}

impl UpdateCommand {
    /// Executes the command. The matching rows and their new values are determined in a first
    /// pass, and the in-place updates are applied in a second, so updates cannot affect the
    /// scan that finds them.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        db.storage.open_table(&self.table_name)?;
        let schema = db.storage.table_schema(&self.table_name)?.schema.clone();

        // Surface unknown column names before any row is touched.
        for (name, _) in &self.changes {
            schema.find_column(&(None, Some(name.clone())))?;
        }

        let table_name = self.table_name.clone();
        let changes = self.changes.clone();
        let where_expr = self.where_expr.clone();
        run_in_transaction(db, move |db| {
            let mut scan = FileScanNode::new(&table_name, where_expr);
            scan.prepare(&mut db.storage)?;
            scan.initialize(&mut db.storage)?;

            let mut pending: Vec<(FilePointer, Vec<(String, Literal)>)> = Vec::new();
            while let Some(tuple) = scan.get_next_tuple(&mut db.storage)? {
                let mut env = Environment::new();
                env.add_tuple(schema.clone(), tuple);

                let mut evaluated = Vec::with_capacity(changes.len());
                for (column, expr) in &changes {
                    evaluated.push((column.clone(), expr.evaluate(Some(&env))?));
                }
                match scan.current_file_pointer() {
                    Some(fp) => pending.push((fp, evaluated)),
                    None => break,
                }
            }

            let count = pending.len();
            for (fp, row_changes) in pending {
                db.storage.update_tuple(&table_name, fp, &row_changes)?;
                let handle = db.storage.get_tuple(&table_name, fp)?.page_handle();
                db.record_page_update(&get_table_file_name(&table_name), &handle)?;
            }
            Ok(format!("Updated {} row(s) in {}.", count, table_name))
        })
    }
}
