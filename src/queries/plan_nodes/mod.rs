//! The pull-based executor tree.
//!
//! Plan nodes form a tagged sum type behind a small uniform surface: `prepare` computes
//! schemas, statistics and costs once; `initialize` resets iteration; `get_next_tuple` pulls
//! the next row or reports exhaustion. Context (the storage manager) is passed down through
//! the calls rather than stored in the nodes, and join children are always given in output
//! order.
//!
//! Nodes move through the states *fresh → prepared → initialized → iterating → exhausted*;
//! `get_next_tuple` keeps returning `None` once exhausted, until the node is re-initialized.

mod file_scan;
mod filter;
mod group_aggregate;
mod nested_loop_join;
mod project;
mod rename;
mod sort;

pub use self::file_scan::FileScanNode;
pub use self::filter::FilterNode;
pub use self::group_aggregate::{
    extract_aggregates, AggregateCall, GroupAggregateNode,
};
pub use self::nested_loop_join::NestedLoopJoinNode;
pub use self::project::ProjectNode;
pub use self::rename::RenameNode;
pub use self::sort::SortNode;

use crate::expressions::{Environment, OrderByExpression};
use crate::queries::{PlanCost, PlanResult};
use crate::relations::Schema;
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, TupleLiteral};

/// Builds the evaluation environment for one tuple flowing through a node.
pub(crate) fn tuple_env(schema: &Schema, tuple: &TupleLiteral) -> Environment {
    let mut env = Environment::new();
    env.add_tuple(schema.clone(), tuple.clone());
    env
}

/// One executor in the plan tree. See the module docs for the common contract.
#[derive(Clone)]
pub enum PlanNode {
    /// A heap-file scan with an optional pushed-down predicate.
    FileScan(FileScanNode),
    /// A predicate applied over any child.
    Filter(FilterNode),
    /// Projection onto a list of select values.
    Project(ProjectNode),
    /// Renames the table part of every column in the child's schema.
    Rename(RenameNode),
    /// An in-memory sort.
    Sort(SortNode),
    /// A nested-loops theta join.
    NestedLoopJoin(NestedLoopJoinNode),
    /// Hash-based grouping and aggregation.
    GroupAggregate(GroupAggregateNode),
}

impl PlanNode {
    /// Prepares the node and its children: computes schemas, statistics and costs. Idempotent.
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        match *self {
            PlanNode::FileScan(ref mut n) => n.prepare(storage),
            PlanNode::Filter(ref mut n) => n.prepare(storage),
            PlanNode::Project(ref mut n) => n.prepare(storage),
            PlanNode::Rename(ref mut n) => n.prepare(storage),
            PlanNode::Sort(ref mut n) => n.prepare(storage),
            PlanNode::NestedLoopJoin(ref mut n) => n.prepare(storage),
            PlanNode::GroupAggregate(ref mut n) => n.prepare(storage),
        }
    }

    /// Resets iteration so the next [`get_next_tuple`](Self::get_next_tuple) starts over.
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        match *self {
            PlanNode::FileScan(ref mut n) => n.initialize(storage),
            PlanNode::Filter(ref mut n) => n.initialize(storage),
            PlanNode::Project(ref mut n) => n.initialize(storage),
            PlanNode::Rename(ref mut n) => n.initialize(storage),
            PlanNode::Sort(ref mut n) => n.initialize(storage),
            PlanNode::NestedLoopJoin(ref mut n) => n.initialize(storage),
            PlanNode::GroupAggregate(ref mut n) => n.initialize(storage),
        }
    }

    /// Produces the next tuple, or `None` when the node is exhausted.
    pub fn get_next_tuple(
        &mut self,
        storage: &mut StorageManager,
    ) -> PlanResult<Option<TupleLiteral>> {
        match *self {
            PlanNode::FileScan(ref mut n) => n.get_next_tuple(storage),
            PlanNode::Filter(ref mut n) => n.get_next_tuple(storage),
            PlanNode::Project(ref mut n) => n.get_next_tuple(storage),
            PlanNode::Rename(ref mut n) => n.get_next_tuple(storage),
            PlanNode::Sort(ref mut n) => n.get_next_tuple(storage),
            PlanNode::NestedLoopJoin(ref mut n) => n.get_next_tuple(storage),
            PlanNode::GroupAggregate(ref mut n) => n.get_next_tuple(storage),
        }
    }

    /// The node's output schema. Empty until prepared.
    pub fn get_schema(&self) -> &Schema {
        match *self {
            PlanNode::FileScan(ref n) => n.get_schema(),
            PlanNode::Filter(ref n) => n.get_schema(),
            PlanNode::Project(ref n) => n.get_schema(),
            PlanNode::Rename(ref n) => n.get_schema(),
            PlanNode::Sort(ref n) => n.get_schema(),
            PlanNode::NestedLoopJoin(ref n) => n.get_schema(),
            PlanNode::GroupAggregate(ref n) => n.get_schema(),
        }
    }

    /// The node's cost estimate, once prepared.
    pub fn get_cost(&self) -> Option<PlanCost> {
        match *self {
            PlanNode::FileScan(ref n) => n.get_cost(),
            PlanNode::Filter(ref n) => n.get_cost(),
            PlanNode::Project(ref n) => n.get_cost(),
            PlanNode::Rename(ref n) => n.get_cost(),
            PlanNode::Sort(ref n) => n.get_cost(),
            PlanNode::NestedLoopJoin(ref n) => n.get_cost(),
            PlanNode::GroupAggregate(ref n) => n.get_cost(),
        }
    }

    /// Per-column statistics for the node's output, aligned with its schema.
    pub fn get_stats(&self) -> &[ColumnStats] {
        match *self {
            PlanNode::FileScan(ref n) => n.get_stats(),
            PlanNode::Filter(ref n) => n.get_stats(),
            PlanNode::Project(ref n) => n.get_stats(),
            PlanNode::Rename(ref n) => n.get_stats(),
            PlanNode::Sort(ref n) => n.get_stats(),
            PlanNode::NestedLoopJoin(ref n) => n.get_stats(),
            PlanNode::GroupAggregate(ref n) => n.get_stats(),
        }
    }

    /// The ordering the node's results are known to satisfy; empty when unordered.
    pub fn results_ordered_by(&self) -> &[OrderByExpression] {
        match *self {
            PlanNode::Sort(ref n) => n.order_by(),
            _ => &[],
        }
    }

    /// Whether the node supports marking.
    pub fn supports_marking(&self) -> bool {
        matches!(*self, PlanNode::FileScan(_) | PlanNode::Sort(_))
    }

    /// Whether this node requires its left child to support marking. Always false for the
    /// node types in this tree.
    pub fn requires_left_marking(&self) -> bool {
        false
    }

    /// Whether this node requires its right child to support marking. Always false for the
    /// node types in this tree.
    pub fn requires_right_marking(&self) -> bool {
        false
    }

    /// Remembers the current position. At most one mark is active at a time.
    pub fn mark_current_position(&mut self) -> PlanResult<()> {
        match *self {
            PlanNode::FileScan(ref mut n) => n.mark_current_position(),
            PlanNode::Sort(ref mut n) => n.mark_current_position(),
            _ => Err(crate::queries::PlanError::MarkingNotSupported),
        }
    }

    /// Rewinds to the last mark; the next tuple returned is the one after the marked tuple.
    pub fn reset_to_last_mark(&mut self) -> PlanResult<()> {
        match *self {
            PlanNode::FileScan(ref mut n) => n.reset_to_last_mark(),
            PlanNode::Sort(ref mut n) => n.reset_to_last_mark(),
            _ => Err(crate::queries::PlanError::MarkingNotSupported),
        }
    }

    /// Releases resources held for iteration (buffered tuples, scan positions).
    pub fn clean_up(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        match *self {
            PlanNode::FileScan(ref mut n) => n.clean_up(storage),
            PlanNode::Filter(ref mut n) => n.clean_up(storage),
            PlanNode::Project(ref mut n) => n.clean_up(storage),
            PlanNode::Rename(ref mut n) => n.clean_up(storage),
            PlanNode::Sort(ref mut n) => n.clean_up(storage),
            PlanNode::NestedLoopJoin(ref mut n) => n.clean_up(storage),
            PlanNode::GroupAggregate(ref mut n) => n.clean_up(storage),
        }
    }
}
