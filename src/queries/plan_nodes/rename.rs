//! The rename node: gives the child's schema a new table name, as for `FROM t AS x`.

use crate::queries::plan_nodes::PlanNode;
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::Schema;
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, TupleLiteral};

/// Copies the child's schema but overrides every column's table name; tuples pass through
/// untouched.
#[derive(Clone)]
pub struct RenameNode {
    child: Box<PlanNode>,
    new_name: String,
    schema: Schema,
    cost: Option<PlanCost>,
}

impl RenameNode {
    /// Creates a rename of the child's result to the given table name.
    pub fn new(child: PlanNode, new_name: &str) -> RenameNode {
        RenameNode {
            child: Box::new(child),
            new_name: new_name.to_string(),
            schema: Schema::new(),
            cost: None,
        }
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }
        self.child.prepare(storage)?;

        let mut schema = self.child.get_schema().clone();
        schema.set_table_name(&self.new_name)?;
        self.schema = schema;

        self.cost = self.child.get_cost();
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize).
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        self.child.initialize(storage)
    }

    /// See [`PlanNode::get_next_tuple`](super::PlanNode::get_next_tuple).
    pub fn get_next_tuple(
        &mut self,
        storage: &mut StorageManager,
    ) -> PlanResult<Option<TupleLiteral>> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        self.child.get_next_tuple(storage)
    }

    /// Returns the renamed schema.
    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the node's cost (the child's).
    pub fn get_cost(&self) -> Option<PlanCost> {
        self.cost
    }

    /// Returns the node's output column statistics (the child's).
    pub fn get_stats(&self) -> &[ColumnStats] {
        self.child.get_stats()
    }

    /// See [`PlanNode::clean_up`](super::PlanNode::clean_up).
    pub fn clean_up(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        self.child.clean_up(storage)
    }
}
