//! The projection node: evaluates a list of select values over each input tuple.

use crate::expressions::{Expression, SelectValue};
use crate::queries::plan_nodes::{tuple_env, PlanNode};
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::{ColumnInfo, Schema};
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, Tuple, TupleLiteral};

/// How one output column is produced.
#[derive(Clone)]
enum OutputColumn {
    /// Copy the child column at this index through unchanged.
    Passthrough(usize),
    /// Evaluate this expression against the input tuple.
    Computed(Expression),
}

/// Projects each input tuple onto the select values. Wildcards expand the child schema (`t.*`
/// expands only columns tagged with table `t`); expressions are evaluated per tuple; scalar
/// subqueries are unsupported and fail at prepare time.
///
/// A project node may also be "scalar", with no child at all, for queries like
/// `SELECT 2 + 3`, in which case it produces exactly one tuple.
#[derive(Clone)]
pub struct ProjectNode {
    child: Option<Box<PlanNode>>,
    values: Vec<SelectValue>,
    outputs: Vec<OutputColumn>,
    schema: Schema,
    stats: Vec<ColumnStats>,
    cost: Option<PlanCost>,
    done: bool,
}

impl ProjectNode {
    /// Creates a projection over the child.
    pub fn new(child: PlanNode, values: Vec<SelectValue>) -> ProjectNode {
        ProjectNode {
            child: Some(Box::new(child)),
            values,
            outputs: vec![],
            schema: Schema::new(),
            stats: vec![],
            cost: None,
            done: false,
        }
    }

    /// Creates a scalar projection with no child; it emits a single tuple.
    pub fn scalar(values: Vec<SelectValue>) -> ProjectNode {
        ProjectNode {
            child: None,
            values,
            outputs: vec![],
            schema: Schema::new(),
            stats: vec![],
            cost: None,
            done: false,
        }
    }

    fn derive_column_info(
        expression: &Expression,
        alias: &Option<String>,
        child_schema: &Schema,
    ) -> PlanResult<ColumnInfo> {
        let column_type = expression.get_column_type(child_schema)?;

        if let Some(ref alias) = *alias {
            // An alias overrides the column name and clears the table name.
            return Ok(ColumnInfo::with_name(column_type, alias.clone()));
        }

        if let Expression::ColumnValue(ref name) = *expression {
            let (_, info) = child_schema.find_column(name)?;
            return Ok(info.clone());
        }

        Ok(ColumnInfo::with_name(column_type, format!("{}", expression)))
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }

        let (child_schema, child_stats): (Schema, Vec<ColumnStats>) = match self.child {
            Some(ref mut child) => {
                child.prepare(storage)?;
                (child.get_schema().clone(), child.get_stats().to_vec())
            }
            None => (Schema::new(), vec![]),
        };

        let mut outputs = Vec::new();
        let mut schema = Schema::new();
        let mut stats = Vec::new();

        for value in &self.values {
            match *value {
                SelectValue::WildcardColumn { ref table } => {
                    let name = (table.clone(), None);
                    let found = child_schema.find_columns(&name);
                    if found.is_empty() && table.is_some() {
                        return Err(PlanError::Unsupported(format!(
                            "wildcard {}.* matches no columns",
                            table.as_ref().unwrap()
                        )));
                    }
                    for (idx, info) in found {
                        outputs.push(OutputColumn::Passthrough(idx));
                        stats.push(
                            child_stats.get(idx).cloned().unwrap_or_default(),
                        );
                        schema.add_column(info)?;
                    }
                }
                SelectValue::Expression {
                    ref expression,
                    ref alias,
                } => {
                    let info = Self::derive_column_info(expression, alias, &child_schema)?;
                    // A bare column reference keeps its statistics; computed values lose them.
                    let col_stats = match *expression {
                        Expression::ColumnValue(ref name) => child_schema
                            .find_column(name)
                            .ok()
                            .and_then(|(idx, _)| child_stats.get(idx).cloned())
                            .unwrap_or_default(),
                        _ => ColumnStats::default(),
                    };
                    outputs.push(OutputColumn::Computed(expression.clone()));
                    stats.push(col_stats);
                    schema.add_column(info)?;
                }
                SelectValue::ScalarSubquery(_) => {
                    return Err(PlanError::Unsupported(
                        "scalar subqueries in the SELECT list".to_string(),
                    ));
                }
            }
        }

        let child_cost = match self.child {
            Some(ref child) => child.get_cost().ok_or(PlanError::NodeNotPrepared)?,
            None => PlanCost {
                num_tuples: 1.0,
                tuple_size: 0.0,
                cpu_cost: 0.0,
                num_block_ios: 0,
            },
        };

        // Pass-through with the tuple size rescaled to the projected width.
        let in_cols = child_schema.num_columns().max(1) as f32;
        let out_cols = schema.num_columns() as f32;
        self.outputs = outputs;
        self.schema = schema;
        self.stats = stats;
        self.cost = Some(PlanCost {
            num_tuples: child_cost.num_tuples,
            tuple_size: child_cost.tuple_size * (out_cols / in_cols),
            cpu_cost: child_cost.cpu_cost + child_cost.num_tuples,
            num_block_ios: child_cost.num_block_ios,
        });
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize).
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        self.done = false;
        match self.child {
            Some(ref mut child) => child.initialize(storage),
            None => Ok(()),
        }
    }

    fn project_tuple(&self, input: Option<&TupleLiteral>) -> PlanResult<TupleLiteral> {
        let mut result = TupleLiteral::new();
        let env = match (input, &self.child) {
            (Some(tuple), &Some(ref child)) => Some(tuple_env(child.get_schema(), tuple)),
            _ => None,
        };

        for (output, info) in self.outputs.iter().zip(self.schema.iter()) {
            match *output {
                OutputColumn::Passthrough(idx) => {
                    let value = match input {
                        Some(tuple) => tuple.get_column_value(idx)?,
                        None => return Err(PlanError::NodeNotPrepared),
                    };
                    result.add_value_with_info(value, info.clone());
                }
                OutputColumn::Computed(ref expression) => {
                    let value = expression.evaluate(env.as_ref())?;
                    result.add_value_with_info(value, info.clone());
                }
            }
        }
        Ok(result)
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

        match self.child {
            Some(ref mut child) => match child.get_next_tuple(storage)? {
                Some(tuple) => {
                    let projected = self.project_tuple(Some(&tuple))?;
                    Ok(Some(projected))
                }
                None => {
                    self.done = true;
                    Ok(None)
                }
            },
            None => {
                // Scalar projection: exactly one output tuple.
                self.done = true;
                let projected = self.project_tuple(None)?;
                Ok(Some(projected))
            }
        }
    }

    /// Returns the projected schema.
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

    /// See [`PlanNode::clean_up`](super::PlanNode::clean_up).
    pub fn clean_up(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        self.done = false;
        match self.child {
            Some(ref mut child) => child.clean_up(storage),
            None => Ok(()),
        }
    }
}
