//! `ANALYZE`.

use crate::commands::{run_in_transaction, ExecutionError};
use crate::database::Database;
use crate::storage::table_manager::get_table_file_name;

/// The `ANALYZE` command: recomputes and persists statistics for one or more tables.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeCommand {
    /// The tables to analyze.
    pub table_names: Vec<String>,
}

impl AnalyzeCommand {
    /// Creates an analyze command over the given tables.
    pub fn new<S: Into<String>>(table_names: Vec<S>) -> AnalyzeCommand {
        AnalyzeCommand {
            table_names: table_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Executes the command.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        let table_names = self.table_names.clone();
        run_in_transaction(db, move |db| {
            for name in &table_names {
                db.storage.open_table(name)?;
                let stats = db.storage.analyze_table(name)?;

                // The stats rewrite dirties the header page; log it like any other update.
                let header = db.storage.load_table_page(name, 0, false)?;
                db.record_page_update(&get_table_file_name(name), &header)?;

                log::info!(
                    "Analyzed {}: {} tuples in {} pages.",
                    name,
                    stats.num_tuples,
                    stats.num_data_pages
                );
            }
            Ok(format!("Analyzed {} table(s).", table_names.len()))
        })
    }
}
