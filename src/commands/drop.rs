//! `DROP TABLE`.

use crate::commands::ExecutionError;
use crate::database::Database;

/// The `DROP TABLE` command.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableCommand {
    /// The table to drop.
    pub table_name: String,
}

impl DropTableCommand {
    /// Creates a drop-table command.
    pub fn new(table_name: &str) -> DropTableCommand {
        DropTableCommand {
            table_name: table_name.to_string(),
        }
    }

    /// Executes the command. Dropping a table is not transactional: its file is removed
    /// immediately and any cached pages are discarded.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        db.storage.drop_table(&self.table_name)?;
        Ok(format!("Dropped table {}.", self.table_name))
    }
}
