//! Hash-based grouping and aggregation.
//!
//! The planner extracts aggregate calls out of the `SELECT` list and `HAVING` clause,
//! replacing each with a reference to a generated column (`#agg0`, `#agg1`, ...). This node
//! then produces one tuple per group, holding the evaluated `GROUP BY` expressions followed by
//! the generated aggregate columns; the projection above it evaluates the rewritten select
//! expressions against that tuple.

use std::collections::{HashMap, HashSet};

use crate::expressions::{
    AggregateFunction, Expression, Literal, LiteralKey,
};
use crate::queries::plan_nodes::{tuple_env, PlanNode};
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::{ColumnInfo, Schema};
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, TupleLiteral};

/// One extracted aggregate call.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    /// The aggregate function.
    pub function: AggregateFunction,
    /// The argument expression; `None` for `COUNT(*)`.
    pub argument: Option<Expression>,
    /// Whether `DISTINCT` was specified.
    pub distinct: bool,
}

/// The generated column name for the i-th extracted aggregate.
pub fn aggregate_column_name(index: usize) -> String {
    format!("#agg{}", index)
}

/// Walks an expression, moving every aggregate call out into `calls` and replacing it with a
/// reference to its generated column. Identical calls share one generated column.
///
/// # Errors
/// Fails if an aggregate call is nested inside another aggregate's argument.
pub fn extract_aggregates(
    expr: &mut Expression,
    calls: &mut Vec<AggregateCall>,
) -> PlanResult<()> {
    match *expr {
        Expression::AggregateCall {
            function,
            ref argument,
            distinct,
        } => {
            if let Some(ref arg) = *argument {
                if arg.contains_aggregate() {
                    return Err(PlanError::Unsupported(
                        "aggregate calls nested inside aggregate arguments".to_string(),
                    ));
                }
            }
            let call = AggregateCall {
                function,
                argument: argument.as_deref().cloned(),
                distinct,
            };
            let index = match calls.iter().position(|c| *c == call) {
                Some(index) => index,
                None => {
                    calls.push(call);
                    calls.len() - 1
                }
            };
            *expr = Expression::ColumnValue((None, Some(aggregate_column_name(index))));
        }
        Expression::Literal(_) | Expression::ColumnValue(_) => {}
        Expression::Arithmetic(ref mut l, _, ref mut r)
        | Expression::Compare(ref mut l, _, ref mut r) => {
            extract_aggregates(l, calls)?;
            extract_aggregates(r, calls)?;
        }
        Expression::And(ref mut terms) | Expression::Or(ref mut terms) => {
            for term in terms {
                extract_aggregates(term, calls)?;
            }
        }
        Expression::Not(ref mut inner) | Expression::IsNull(ref mut inner) => {
            extract_aggregates(inner, calls)?;
        }
    }
    Ok(())
}

/// The running state of one aggregate within one group.
#[derive(Clone)]
struct AggregateState {
    count: u64,
    sum_long: i64,
    sum_double: f64,
    saw_float: bool,
    min: Option<Literal>,
    max: Option<Literal>,
    seen: HashSet<LiteralKey>,
}

impl AggregateState {
    fn new() -> AggregateState {
        AggregateState {
            count: 0,
            sum_long: 0,
            sum_double: 0.0,
            saw_float: false,
            min: None,
            max: None,
            seen: HashSet::new(),
        }
    }

    /// Feeds one input value; `None` for `COUNT(*)`, which counts rows unconditionally.
    fn update(&mut self, call: &AggregateCall, value: Option<Literal>) -> PlanResult<()> {
        let value = match value {
            None => {
                self.count += 1;
                return Ok(());
            }
            // NULL inputs do not contribute to any aggregate.
            Some(Literal::Null) => return Ok(()),
            Some(v) => v,
        };

        if call.distinct && !self.seen.insert(value.hash_key()) {
            return Ok(());
        }

        self.count += 1;

        match call.function {
            AggregateFunction::Count => {}
            AggregateFunction::Sum | AggregateFunction::Avg => match value {
                Literal::Int(i) => self.sum_long += i as i64,
                Literal::Long(l) => self.sum_long += l,
                Literal::Float(v) => {
                    self.saw_float = true;
                    self.sum_double += v as f64;
                }
                Literal::Double(v) => {
                    self.saw_float = true;
                    self.sum_double += v;
                }
                other => {
                    return Err(PlanError::ExpressionError(
                        crate::expressions::ExpressionError::NotNumeric(other),
                    ));
                }
            },
            AggregateFunction::Min => {
                let lower = match self.min {
                    Some(ref cur) => value.compare(cur) == Some(std::cmp::Ordering::Less),
                    None => true,
                };
                if lower {
                    self.min = Some(value);
                }
            }
            AggregateFunction::Max => {
                let higher = match self.max {
                    Some(ref cur) => value.compare(cur) == Some(std::cmp::Ordering::Greater),
                    None => true,
                };
                if higher {
                    self.max = Some(value);
                }
            }
        }
        Ok(())
    }

    fn result(&self, call: &AggregateCall) -> Literal {
        match call.function {
            AggregateFunction::Count => Literal::Int(self.count as i32),
            AggregateFunction::Sum => {
                if self.count == 0 {
                    Literal::Null
                } else if self.saw_float {
                    Literal::Double(self.sum_double + self.sum_long as f64)
                } else {
                    Literal::Long(self.sum_long)
                }
            }
            AggregateFunction::Avg => {
                if self.count == 0 {
                    Literal::Null
                } else {
                    let total = self.sum_double + self.sum_long as f64;
                    Literal::Double(total / self.count as f64)
                }
            }
            AggregateFunction::Min => self.min.clone().unwrap_or(Literal::Null),
            AggregateFunction::Max => self.max.clone().unwrap_or(Literal::Null),
        }
    }
}

/// Groups the child's rows by the values of the `GROUP BY` expressions (NULLs form their own
/// group) and computes the extracted aggregates per group. With no grouping expressions, the
/// whole input forms a single group.
#[derive(Clone)]
pub struct GroupAggregateNode {
    child: Box<PlanNode>,
    group_exprs: Vec<Expression>,
    aggregates: Vec<AggregateCall>,
    schema: Schema,
    stats: Vec<ColumnStats>,
    cost: Option<PlanCost>,
    buffer: Vec<TupleLiteral>,
    position: usize,
    loaded: bool,
}

impl GroupAggregateNode {
    /// Creates a group/aggregate node over the child.
    pub fn new(
        child: PlanNode,
        group_exprs: Vec<Expression>,
        aggregates: Vec<AggregateCall>,
    ) -> GroupAggregateNode {
        GroupAggregateNode {
            child: Box::new(child),
            group_exprs,
            aggregates,
            schema: Schema::new(),
            stats: vec![],
            cost: None,
            buffer: vec![],
            position: 0,
            loaded: false,
        }
    }

    fn aggregate_column_type(
        call: &AggregateCall,
        child_schema: &Schema,
    ) -> PlanResult<crate::relations::ColumnType> {
        use crate::relations::ColumnType;
        Ok(match call.function {
            AggregateFunction::Count => ColumnType::Integer,
            AggregateFunction::Avg => ColumnType::Double,
            AggregateFunction::Sum => match call.argument {
                Some(ref arg) => match arg.get_column_type(child_schema)? {
                    ColumnType::Float | ColumnType::Double | ColumnType::Numeric { .. } => {
                        ColumnType::Double
                    }
                    _ => ColumnType::BigInt,
                },
                None => ColumnType::BigInt,
            },
            AggregateFunction::Min | AggregateFunction::Max => match call.argument {
                Some(ref arg) => arg.get_column_type(child_schema)?,
                None => ColumnType::Integer,
            },
        })
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }
        self.child.prepare(storage)?;
        let child_schema = self.child.get_schema().clone();

        let mut schema = Schema::new();

        for expr in &self.group_exprs {
            let info = match *expr {
                Expression::ColumnValue(ref name) => {
                    let (_, info) = child_schema.find_column(name)?;
                    info.clone()
                }
                _ => ColumnInfo::with_name(
                    expr.get_column_type(&child_schema)?,
                    format!("{}", expr),
                ),
            };
            schema.add_column(info)?;
        }

        for (index, call) in self.aggregates.iter().enumerate() {
            let column_type = Self::aggregate_column_type(call, &child_schema)?;
            schema.add_column(ColumnInfo::with_name(
                column_type,
                aggregate_column_name(index),
            ))?;
        }

        let child_cost = self.child.get_cost().ok_or(PlanError::NodeNotPrepared)?;
        let num_groups = if self.group_exprs.is_empty() {
            1.0
        } else {
            (child_cost.num_tuples / 10.0).max(1.0)
        };

        self.stats = vec![ColumnStats::default(); schema.num_columns()];
        self.schema = schema;
        self.cost = Some(PlanCost {
            num_tuples: num_groups,
            tuple_size: child_cost.tuple_size,
            cpu_cost: child_cost.cpu_cost + child_cost.num_tuples,
            num_block_ios: child_cost.num_block_ios,
        });
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize). Consumes the whole child
    /// stream, building the per-group states.
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }

        self.child.initialize(storage)?;
        let child_schema = self.child.get_schema().clone();

        // Group states in first-seen order, so results are deterministic.
        let mut group_index: HashMap<Vec<LiteralKey>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Literal>, Vec<AggregateState>)> = Vec::new();

        while let Some(tuple) = self.child.get_next_tuple(storage)? {
            let env = tuple_env(&child_schema, &tuple);

            let mut group_values = Vec::with_capacity(self.group_exprs.len());
            for expr in &self.group_exprs {
                group_values.push(expr.evaluate(Some(&env))?);
            }
            let key: Vec<LiteralKey> = group_values.iter().map(Literal::hash_key).collect();

            let index = match group_index.get(&key) {
                Some(&index) => index,
                None => {
                    groups.push((
                        group_values.clone(),
                        vec![AggregateState::new(); self.aggregates.len()],
                    ));
                    group_index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };

            for (call, state) in self.aggregates.iter().zip(groups[index].1.iter_mut()) {
                let value = match call.argument {
                    Some(ref arg) => Some(arg.evaluate(Some(&env))?),
                    None => None,
                };
                state.update(call, value)?;
            }
        }

        // An ungrouped aggregate query produces exactly one row, even over empty input.
        if groups.is_empty() && self.group_exprs.is_empty() && !self.aggregates.is_empty() {
            groups.push((vec![], vec![AggregateState::new(); self.aggregates.len()]));
        }

        self.buffer = groups
            .into_iter()
            .map(|(group_values, states)| {
                let mut tuple = TupleLiteral::new();
                for (value, info) in group_values.into_iter().zip(self.schema.iter()) {
                    tuple.add_value_with_info(value, info.clone());
                }
                for (call, state) in self.aggregates.iter().zip(states.iter()) {
                    tuple.add_value(state.result(call));
                }
                tuple
            })
            .collect();
        self.position = 0;
        self.loaded = true;
        Ok(())
    }

    /// See [`PlanNode::get_next_tuple`](super::PlanNode::get_next_tuple).
    pub fn get_next_tuple(
        &mut self,
        _storage: &mut StorageManager,
    ) -> PlanResult<Option<TupleLiteral>> {
        if self.cost.is_none() || !self.loaded {
            return Err(PlanError::NodeNotPrepared);
        }
        match self.buffer.get(self.position) {
            Some(tuple) => {
                self.position += 1;
                Ok(Some(tuple.clone()))
            }
            None => Ok(None),
        }
    }

    /// Returns the node's schema: group columns, then generated aggregate columns.
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
        self.buffer = vec![];
        self.position = 0;
        self.loaded = false;
        self.child.clean_up(storage)
    }
}
