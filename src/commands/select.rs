//! `SELECT`.

use crate::commands::{run_in_transaction, ExecutionError, TupleProcessor};
use crate::database::Database;
use crate::expressions::SelectClause;
use crate::queries::Planner;

/// The `SELECT` command: plans the clause, pulls every result tuple, and feeds them to a
/// [`TupleProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectCommand {
    /// The parsed select clause.
    pub select: SelectClause,
}

impl SelectCommand {
    /// Creates a select command.
    pub fn new(select: SelectClause) -> SelectCommand {
        SelectCommand { select }
    }

    /// Executes the query, streaming rows into the processor, and returns a row-count report.
    pub fn execute(
        &self,
        db: &mut Database,
        processor: &mut dyn TupleProcessor,
    ) -> Result<String, ExecutionError> {
        let select = self.select.clone();
        run_in_transaction(db, move |db| {
            let mut plan = Planner::new().make_plan(&mut db.storage, select)?;

            processor.process_schema(plan.get_schema())?;

            plan.initialize(&mut db.storage)?;
            let mut count = 0usize;
            while let Some(tuple) = plan.get_next_tuple(&mut db.storage)? {
                processor.process_tuple(&tuple)?;
                count += 1;
            }
            plan.clean_up(&mut db.storage)?;

            Ok(format!("Selected {} row(s).", count))
        })
    }
}
