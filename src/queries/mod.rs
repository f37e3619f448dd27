//! The query engine: the pull-based plan-node tree, the planner, and cost and selectivity
//! estimation.

pub mod cost;
pub mod plan_nodes;
pub mod planner;
pub mod selectivity;

pub use self::cost::PlanCost;
pub use self::plan_nodes::{
    FileScanNode, FilterNode, GroupAggregateNode, NestedLoopJoinNode, PlanNode, ProjectNode,
    RenameNode, SortNode,
};
pub use self::planner::Planner;
pub use self::selectivity::{estimate_selectivity, DEFAULT_SELECTIVITY};

use std::fmt;

use crate::expressions::{ExpressionError, FromClauseError};
use crate::relations::SchemaError;
use crate::storage::table_manager;

/// A result type for planning and plan execution.
pub type PlanResult<T> = Result<T, PlanError>;

/// An error produced while planning or executing a query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A node was used before `prepare` was called on it.
    NodeNotPrepared,
    /// A node that does not support marking was asked to mark or reset.
    MarkingNotSupported,
    /// `reset_to_last_mark` was called with no mark active.
    NoMarkSet,
    /// The feature is recognized but deliberately unsupported by the execution engine.
    Unsupported(String),
    /// A schema could not be constructed or resolved.
    SchemaError(SchemaError),
    /// A storage-layer failure.
    StorageError(table_manager::Error),
    /// An expression failed to evaluate or type-check.
    ExpressionError(ExpressionError),
    /// A join condition could not be prepared.
    FromClauseError(FromClauseError),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PlanError::NodeNotPrepared => write!(f, "plan node has not been prepared"),
            PlanError::MarkingNotSupported => {
                write!(f, "plan node does not support marking")
            }
            PlanError::NoMarkSet => write!(f, "no mark is currently set"),
            PlanError::Unsupported(ref what) => write!(f, "unsupported: {}", what),
            PlanError::SchemaError(ref e) => write!(f, "{}", e),
            PlanError::StorageError(ref e) => write!(f, "{}", e),
            PlanError::ExpressionError(ref e) => write!(f, "{}", e),
            PlanError::FromClauseError(ref e) => write!(f, "{}", e),
        }
    }
}

impl From<SchemaError> for PlanError {
    fn from(e: SchemaError) -> PlanError {
        PlanError::SchemaError(e)
    }
}

impl From<table_manager::Error> for PlanError {
    fn from(e: table_manager::Error) -> PlanError {
        PlanError::StorageError(e)
    }
}

impl From<crate::storage::TupleError> for PlanError {
    fn from(e: crate::storage::TupleError) -> PlanError {
        PlanError::StorageError(table_manager::Error::TupleError(e))
    }
}

impl From<ExpressionError> for PlanError {
    fn from(e: ExpressionError) -> PlanError {
        PlanError::ExpressionError(e)
    }
}

impl From<FromClauseError> for PlanError {
    fn from(e: FromClauseError) -> PlanError {
        PlanError::FromClauseError(e)
    }
}
