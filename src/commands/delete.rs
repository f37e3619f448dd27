//! `DELETE`.

use crate::commands::{run_in_transaction, ExecutionError};
use crate::database::Database;
use crate::expressions::Expression;
use crate::queries::FileScanNode;
use crate::storage::table_manager::get_table_file_name;
use crate::storage::FilePointer;

/// The `DELETE FROM ... [WHERE ...]` command.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    /// The target table.
    pub table_name: String,
    /// The rows to delete; `None` deletes every row.
    pub where_expr: Option<Expression>,
}

impl DeleteCommand {
    /// Creates a delete command.
    pub fn new(table_name: &str, where_expr: Option<Expression>) -> DeleteCommand {
        DeleteCommand {
            table_name: table_name.to_string(),
            where_expr,
        }
    }

    /// Executes the command: matching rows are located first, then their slots are emptied.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        db.storage.open_table(&self.table_name)?;

        let table_name = self.table_name.clone();
        let where_expr = self.where_expr.clone();
        run_in_transaction(db, move |db| {
            let mut scan = FileScanNode::new(&table_name, where_expr);
            scan.prepare(&mut db.storage)?;
            scan.initialize(&mut db.storage)?;

            let mut victims: Vec<FilePointer> = Vec::new();
            while scan.get_next_tuple(&mut db.storage)?.is_some() {
                match scan.current_file_pointer() {
                    Some(fp) => victims.push(fp),
                    None => break,
                }
            }

            let count = victims.len();
            for fp in victims {
                let handle = db.storage.get_tuple(&table_name, fp)?.page_handle();
                db.storage.delete_tuple(&table_name, fp)?;
                db.record_page_update(&get_table_file_name(&table_name), &handle)?;
            }
            Ok(format!("Deleted {} row(s) from {}.", count, table_name))
        })
    }
}
