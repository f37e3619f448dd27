//! The file-scan plan node: a left-to-right walk over a heap table, with an optional
//! pushed-down predicate.

use crate::expressions::Expression;
use crate::queries::plan_nodes::tuple_env;
use crate::queries::selectivity::estimate_selectivity;
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::Schema;
use crate::storage::table_manager::{ColumnStats, TableStats};
use crate::storage::{FilePointer, StorageManager, TupleLiteral};

/// Scans a heap table tuple by tuple. Supports marking by remembering the current file
/// pointer.
#[derive(Clone)]
pub struct FileScanNode {
    table_name: String,
    predicate: Option<Expression>,
    schema: Schema,
    stats: Vec<ColumnStats>,
    table_stats: TableStats,
    cost: Option<PlanCost>,
    /// The file pointer of the last tuple returned; `None` before the first.
    cur_fp: Option<FilePointer>,
    done: bool,
    mark: Option<(Option<FilePointer>, bool)>,
}

impl FileScanNode {
    /// Creates a scan over the named table, with an optional predicate applied to each tuple.
    pub fn new(table_name: &str, predicate: Option<Expression>) -> FileScanNode {
        FileScanNode {
            table_name: table_name.to_string(),
            predicate,
            schema: Schema::new(),
            stats: vec![],
            table_stats: TableStats::default(),
            cost: None,
            cur_fp: None,
            done: false,
            mark: None,
        }
    }

    /// The table this node scans.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The predicate applied by this scan, if any.
    pub fn predicate(&self) -> Option<&Expression> {
        self.predicate.as_ref()
    }

    /// ANDs another conjunct into the scan's predicate. Used by predicate push-down.
    pub fn and_predicate(&mut self, conjunct: Expression) {
        match self.predicate.take() {
            Some(mut existing) => {
                existing.add_term(conjunct);
                self.predicate = Some(existing);
            }
            None => self.predicate = Some(conjunct),
        }
        // A changed predicate invalidates any previously computed cost.
        self.cost = None;
    }

    /// The file pointer of the most recently returned tuple. Update and delete commands use
    /// this to address the tuple they are positioned on.
    pub fn current_file_pointer(&self) -> Option<FilePointer> {
        self.cur_fp
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }

        storage.open_table(&self.table_name)?;
        self.schema = storage.table_schema(&self.table_name)?.schema.clone();
        self.table_stats = *storage.table_stats(&self.table_name)?;

        let column_stats = storage.table_column_stats(&self.table_name)?;
        self.stats = if column_stats.len() == self.schema.num_columns() {
            column_stats.to_vec()
        } else {
            vec![ColumnStats::default(); self.schema.num_columns()]
        };

        let base_tuples = self.table_stats.num_tuples as f32;
        let selectivity = match self.predicate {
            Some(ref predicate) => estimate_selectivity(predicate, &self.schema, &self.stats),
            None => 1.0,
        };
        self.cost = Some(PlanCost {
            num_tuples: base_tuples * selectivity,
            tuple_size: self.table_stats.avg_tuple_size,
            cpu_cost: base_tuples,
            num_block_ios: self.table_stats.num_data_pages as u64,
        });
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize). Rewinds to the start of the
    /// table.
    pub fn initialize(&mut self, _storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        self.cur_fp = None;
        self.done = false;
        self.mark = None;
        Ok(())
    }

    /// See [`PlanNode::get_next_tuple`](super::PlanNode::get_next_tuple).
    pub fn get_next_tuple(
        &mut self,
        storage: &mut StorageManager,
    ) -> PlanResult<Option<TupleLiteral>> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        if self.done {
            return Ok(None);
        }

        loop {
            let next = match self.cur_fp {
                None => storage.get_first_tuple(&self.table_name)?,
                Some(fp) => storage.get_next_tuple(&self.table_name, fp)?,
            };

            let page_tuple = match next {
                Some(t) => t,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            };

            self.cur_fp = Some(page_tuple.file_pointer());

            let mut tuple = TupleLiteral::new();
            tuple.append_tuple_with_schema(&page_tuple, &self.schema)?;
            drop(page_tuple);

            let passes = match self.predicate {
                Some(ref predicate) => {
                    let env = tuple_env(&self.schema, &tuple);
                    predicate.evaluate_predicate(Some(&env))?
                }
                None => true,
            };
            if passes {
                return Ok(Some(tuple));
            }
        }
    }

    /// Returns the node's schema.
    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the node's cost, once prepared.
    pub fn get_cost(&self) -> Option<PlanCost> {
        self.cost
    }

    /// Returns the node's output column statistics.
    pub fn get_stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    /// Remembers the current scan position.
    pub fn mark_current_position(&mut self) -> PlanResult<()> {
        self.mark = Some((self.cur_fp, self.done));
        Ok(())
    }

    /// Rewinds the scan to the last mark.
    pub fn reset_to_last_mark(&mut self) -> PlanResult<()> {
        match self.mark {
            Some((fp, done)) => {
                self.cur_fp = fp;
                self.done = done;
                Ok(())
            }
            None => Err(PlanError::NoMarkSet),
        }
    }

    /// See [`PlanNode::clean_up`](super::PlanNode::clean_up).
    pub fn clean_up(&mut self, _storage: &mut StorageManager) -> PlanResult<()> {
        self.cur_fp = None;
        self.done = false;
        self.mark = None;
        Ok(())
    }
}
