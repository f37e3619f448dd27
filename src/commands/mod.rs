//! The command objects the driver executes against a [`Database`]: DDL, DML, queries, and
//! transaction demarcation.
//!
//! Every command implements `execute`, returning a one-line textual report and (for queries)
//! writing result rows to the session's output stream. All errors surface to the driver,
//! which reports them and continues with the next command.

mod analyze;
mod create;
mod delete;
mod drop;
mod insert;
mod select;
mod update;

pub use self::analyze::AnalyzeCommand;
pub use self::create::{ColumnDecl, CreateIndexCommand, CreateTableCommand, ForeignKeyDecl};
pub use self::delete::DeleteCommand;
pub use self::drop::DropTableCommand;
pub use self::insert::InsertCommand;
pub use self::select::SelectCommand;
pub use self::update::UpdateCommand;

use std::fmt;
use std::io::Write;

use crate::database::{self, Database};
use crate::expressions::ExpressionError;
use crate::queries::PlanError;
use crate::relations::{Schema, SchemaError};
use crate::storage::{table_manager, TupleLiteral};
use crate::transactions;

/// An error that occurred while executing a command.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// An error from the storage layer.
    Storage(table_manager::Error),
    /// An error from planning or plan execution.
    Plan(PlanError),
    /// An expression failed to evaluate.
    Expression(ExpressionError),
    /// A schema error (unknown/duplicate/ambiguous columns).
    Schema(SchemaError),
    /// A transaction error.
    Transaction(transactions::Error),
    /// An `INSERT` row had the wrong number of values, as (expected, got).
    ColumnCountMismatch(usize, usize),
    /// A value cannot be stored in its target column.
    CannotStoreValue(String, String),
    /// A column declaration was invalid.
    InvalidColumnDecl(String),
    /// A key declaration referenced an unknown column.
    UnknownKeyColumn(String),
    /// Writing to the output stream failed.
    IOError(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ExecutionError::Storage(ref e) => write!(f, "{}", e),
            ExecutionError::Plan(ref e) => write!(f, "{}", e),
            ExecutionError::Expression(ref e) => write!(f, "{}", e),
            ExecutionError::Schema(ref e) => write!(f, "{}", e),
            ExecutionError::Transaction(ref e) => write!(f, "{}", e),
            ExecutionError::ColumnCountMismatch(expected, got) => write!(
                f,
                "row has {} values but the target has {} columns",
                got, expected
            ),
            ExecutionError::CannotStoreValue(ref col, ref val) => {
                write!(f, "cannot store {} in column {}", val, col)
            }
            ExecutionError::InvalidColumnDecl(ref why) => {
                write!(f, "invalid column declaration: {}", why)
            }
            ExecutionError::UnknownKeyColumn(ref name) => {
                write!(f, "key references unknown column {}", name)
            }
            ExecutionError::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
        }
    }
}

impl From<table_manager::Error> for ExecutionError {
    fn from(e: table_manager::Error) -> ExecutionError {
        ExecutionError::Storage(e)
    }
}

impl From<PlanError> for ExecutionError {
    fn from(e: PlanError) -> ExecutionError {
        ExecutionError::Plan(e)
    }
}

impl From<ExpressionError> for ExecutionError {
    fn from(e: ExpressionError) -> ExecutionError {
        ExecutionError::Expression(e)
    }
}

impl From<SchemaError> for ExecutionError {
    fn from(e: SchemaError) -> ExecutionError {
        ExecutionError::Schema(e)
    }
}

impl From<transactions::Error> for ExecutionError {
    fn from(e: transactions::Error) -> ExecutionError {
        ExecutionError::Transaction(e)
    }
}

impl From<database::Error> for ExecutionError {
    fn from(e: database::Error) -> ExecutionError {
        match e {
            database::Error::Storage(e) => ExecutionError::Storage(e),
            database::Error::Transaction(e) => ExecutionError::Transaction(e),
            database::Error::BadDataDirectory(why) => {
                ExecutionError::IOError(why)
            }
        }
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(e: std::io::Error) -> ExecutionError {
        ExecutionError::IOError(e.to_string())
    }
}

/// Consumes the tuples a `SELECT` produces: first the result schema, then each row.
pub trait TupleProcessor {
    /// Called once with the result schema, before any rows.
    fn process_schema(&mut self, schema: &Schema) -> Result<(), ExecutionError>;

    /// Called once per result row.
    fn process_tuple(&mut self, tuple: &TupleLiteral) -> Result<(), ExecutionError>;
}

/// Formats result rows onto an output stream, pipe-separated with a header line.
pub struct PrintingProcessor<'a> {
    out: &'a mut dyn Write,
}

impl<'a> PrintingProcessor<'a> {
    /// Creates a printing processor over the output stream.
    pub fn new(out: &'a mut dyn Write) -> PrintingProcessor<'a> {
        PrintingProcessor { out }
    }
}

impl<'a> TupleProcessor for PrintingProcessor<'a> {
    fn process_schema(&mut self, schema: &Schema) -> Result<(), ExecutionError> {
        let names: Vec<String> = schema
            .iter()
            .map(|info| {
                info.name
                    .clone()
                    .unwrap_or_else(|| "?".to_string())
            })
            .collect();
        writeln!(self.out, "{}", names.join(" | "))?;
        Ok(())
    }

    fn process_tuple(&mut self, tuple: &TupleLiteral) -> Result<(), ExecutionError> {
        let cells: Vec<String> = tuple.values().iter().map(|v| format!("{}", v)).collect();
        writeln!(self.out, "{}", cells.join(" | "))?;
        Ok(())
    }
}

/// Collects result rows in memory. Used by tests and by callers that post-process results.
#[derive(Default)]
pub struct CollectingProcessor {
    /// The result schema, set when processing starts.
    pub schema: Option<Schema>,
    /// The collected rows.
    pub tuples: Vec<TupleLiteral>,
}

impl CollectingProcessor {
    /// Creates an empty collector.
    pub fn new() -> CollectingProcessor {
        CollectingProcessor::default()
    }
}

impl TupleProcessor for CollectingProcessor {
    fn process_schema(&mut self, schema: &Schema) -> Result<(), ExecutionError> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn process_tuple(&mut self, tuple: &TupleLiteral) -> Result<(), ExecutionError> {
        self.tuples.push(tuple.clone());
        Ok(())
    }
}

/// Runs a command body inside the session's transaction. If no transaction is active, an
/// implicit one is started and committed when the body succeeds; a failing body rolls the
/// implicit transaction back so the statement leaves no partial effects.
pub(crate) fn run_in_transaction<F>(db: &mut Database, body: F) -> Result<String, ExecutionError>
where
    F: FnOnce(&mut Database) -> Result<String, ExecutionError>,
{
    let implicit = db.ensure_transaction()?;
    match body(db) {
        Ok(report) => {
            if implicit {
                db.commit_transaction()?;
            }
            Ok(report)
        }
        Err(e) => {
            if implicit {
                // Best effort; the original error is the one worth reporting.
                let _ = db.rollback_transaction();
            }
            Err(e)
        }
    }
}

/// A command the driver can execute. Parsed SQL statements map one-to-one onto these.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `CREATE TABLE`
    CreateTable(CreateTableCommand),
    /// `DROP TABLE`
    DropTable(DropTableCommand),
    /// `CREATE INDEX`
    CreateIndex(CreateIndexCommand),
    /// `ANALYZE`
    Analyze(AnalyzeCommand),
    /// `INSERT`
    Insert(InsertCommand),
    /// `UPDATE`
    Update(UpdateCommand),
    /// `DELETE`
    Delete(DeleteCommand),
    /// `SELECT`
    Select(SelectCommand),
    /// `BEGIN` / `START TRANSACTION`
    BeginTransaction,
    /// `COMMIT`
    CommitTransaction,
    /// `ROLLBACK`
    RollbackTransaction,
    /// `EXIT` / `QUIT`
    Exit,
}

impl Command {
    /// Executes the command against the database, writing any query output to `out` and
    /// returning a one-line report.
    pub fn execute(
        &self,
        db: &mut Database,
        out: &mut dyn Write,
    ) -> Result<String, ExecutionError> {
        match *self {
            Command::CreateTable(ref cmd) => cmd.execute(db),
            Command::DropTable(ref cmd) => cmd.execute(db),
            Command::CreateIndex(ref cmd) => cmd.execute(db),
            Command::Analyze(ref cmd) => cmd.execute(db),
            Command::Insert(ref cmd) => cmd.execute(db),
            Command::Update(ref cmd) => cmd.execute(db),
            Command::Delete(ref cmd) => cmd.execute(db),
            Command::Select(ref cmd) => {
                let mut processor = PrintingProcessor::new(out);
                cmd.execute(db, &mut processor)
            }
            Command::BeginTransaction => {
                db.begin_transaction()?;
                Ok("Transaction started.".to_string())
            }
            Command::CommitTransaction => {
                db.commit_transaction()?;
                Ok("Transaction committed.".to_string())
            }
            Command::RollbackTransaction => {
                db.rollback_transaction()?;
                Ok("Transaction rolled back.".to_string())
            }
            Command::Exit => Ok("Exiting.".to_string()),
        }
    }

    /// Whether this command ends the session.
    pub fn is_exit(&self) -> bool {
        matches!(*self, Command::Exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    use crate::database::DatabaseConfig;
    use crate::expressions::{
        AggregateFunction, CompareType, Expression, FromClause, JoinConditionType, JoinType,
        Literal, OrderByExpression, SelectClause, SelectValue,
    };
    use crate::relations::ColumnType;

    fn open_db(dir: &TempDir) -> Database {
        Database::open(DatabaseConfig::new(dir.path()).with_page_size(512)).unwrap()
    }

    fn exec(db: &mut Database, command: Command) -> Result<String, ExecutionError> {
        let mut out = Vec::new();
        command.execute(db, &mut out)
    }

    fn col(name: &str) -> Expression {
        Expression::ColumnValue((None, Some(name.into())))
    }

    fn qcol(table: &str, name: &str) -> Expression {
        Expression::ColumnValue((Some(table.into()), Some(name.into())))
    }

    fn int(i: i32) -> Expression {
        Expression::Literal(Literal::Int(i))
    }

    fn str_lit(s: &str) -> Expression {
        Expression::Literal(Literal::from(s))
    }

    fn select_rows(db: &mut Database, clause: SelectClause) -> Vec<Vec<Literal>> {
        let mut collector = CollectingProcessor::new();
        SelectCommand::new(clause)
            .execute(db, &mut collector)
            .unwrap();
        collector
            .tuples
            .iter()
            .map(|t| t.values().to_vec())
            .collect()
    }

    /// Creates `t(a INTEGER, b VARCHAR(10))` and inserts (1,'x'), (2,'y'), (3,'z').
    fn setup_t(db: &mut Database) {
        exec(
            db,
            Command::CreateTable(CreateTableCommand::new(
                "t",
                vec![
                    ColumnDecl {
                        name: "a".into(),
                        column_type: ColumnType::Integer,
                    },
                    ColumnDecl {
                        name: "b".into(),
                        column_type: ColumnType::VarChar { length: 10 },
                    },
                ],
            )),
        )
        .unwrap();

        exec(
            db,
            Command::Insert(InsertCommand::new(
                "t",
                vec![
                    vec![int(1), str_lit("x")],
                    vec![int(2), str_lit("y")],
                    vec![int(3), str_lit("z")],
                ],
            )),
        )
        .unwrap();
    }

    #[test]
    fn test_schema_insert_scan() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        let rows = select_rows(&mut db, SelectClause::select_all(FromClause::base_table("t")));
        assert_eq!(
            rows,
            vec![
                vec![Literal::Int(1), Literal::from("x")],
                vec![Literal::Int(2), Literal::from("y")],
                vec![Literal::Int(3), Literal::from("z")],
            ]
        );
    }

    #[test]
    fn test_predicate_and_projection() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        // SELECT b FROM t WHERE a > 1
        let mut clause = SelectClause::new(
            FromClause::base_table("t"),
            vec![SelectValue::Expression {
                expression: col("b"),
                alias: None,
            }],
        );
        clause.where_expr = Some(Expression::compare(col("a"), CompareType::GreaterThan, int(1)));

        let rows = select_rows(&mut db, clause);
        assert_eq!(
            rows,
            vec![vec![Literal::from("y")], vec![Literal::from("z")]]
        );
    }

    #[test]
    fn test_join_with_predicate() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);

        for (table, column, values) in
            [("r", "x", vec![1, 2, 3]), ("s", "y", vec![2, 3, 4])]
        {
            exec(
                &mut db,
                Command::CreateTable(CreateTableCommand::new(
                    table,
                    vec![ColumnDecl {
                        name: column.into(),
                        column_type: ColumnType::Integer,
                    }],
                )),
            )
            .unwrap();
            exec(
                &mut db,
                Command::Insert(InsertCommand::new(
                    table,
                    values.into_iter().map(|v| vec![int(v)]).collect(),
                )),
            )
            .unwrap();
        }

        // SELECT r.x, s.y FROM r, s WHERE r.x = s.y
        let from = FromClause::join(
            FromClause::base_table("r"),
            FromClause::base_table("s"),
            JoinType::Cross,
            JoinConditionType::None,
        );
        let mut clause = SelectClause::new(
            from,
            vec![
                SelectValue::Expression {
                    expression: qcol("r", "x"),
                    alias: None,
                },
                SelectValue::Expression {
                    expression: qcol("s", "y"),
                    alias: None,
                },
            ],
        );
        clause.where_expr = Some(Expression::compare(
            qcol("r", "x"),
            CompareType::Equals,
            qcol("s", "y"),
        ));

        let mut rows = select_rows(&mut db, clause);
        rows.sort_by_key(|row| row[0].to_long().unwrap_or(0));
        assert_eq!(
            rows,
            vec![
                vec![Literal::Int(2), Literal::Int(2)],
                vec![Literal::Int(3), Literal::Int(3)],
            ]
        );
    }

    #[test]
    fn test_order_by() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        let mut clause = SelectClause::select_all(FromClause::base_table("t"));
        clause.order_by_exprs = vec![OrderByExpression::descending(col("a"))];

        let rows = select_rows(&mut db, clause);
        assert_eq!(
            rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>(),
            vec![Literal::Int(3), Literal::Int(2), Literal::Int(1)]
        );
    }

    #[test]
    fn test_group_by_with_aggregates() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);

        exec(
            &mut db,
            Command::CreateTable(CreateTableCommand::new(
                "sales",
                vec![
                    ColumnDecl {
                        name: "dept".into(),
                        column_type: ColumnType::Integer,
                    },
                    ColumnDecl {
                        name: "amount".into(),
                        column_type: ColumnType::Integer,
                    },
                ],
            )),
        )
        .unwrap();
        exec(
            &mut db,
            Command::Insert(InsertCommand::new(
                "sales",
                vec![
                    vec![int(1), int(10)],
                    vec![int(2), int(20)],
                    vec![int(1), int(30)],
                    vec![int(2), int(5)],
                ],
            )),
        )
        .unwrap();

        // SELECT dept, SUM(amount), COUNT(*) FROM sales GROUP BY dept ORDER BY dept
        let mut clause = SelectClause::new(
            FromClause::base_table("sales"),
            vec![
                SelectValue::Expression {
                    expression: col("dept"),
                    alias: None,
                },
                SelectValue::Expression {
                    expression: Expression::AggregateCall {
                        function: AggregateFunction::Sum,
                        argument: Some(Box::new(col("amount"))),
                        distinct: false,
                    },
                    alias: Some("total".into()),
                },
                SelectValue::Expression {
                    expression: Expression::AggregateCall {
                        function: AggregateFunction::Count,
                        argument: None,
                        distinct: false,
                    },
                    alias: Some("n".into()),
                },
            ],
        );
        clause.group_by_exprs = vec![col("dept")];
        clause.order_by_exprs = vec![OrderByExpression::ascending(col("dept"))];

        let rows = select_rows(&mut db, clause);
        assert_eq!(
            rows,
            vec![
                vec![Literal::Int(1), Literal::Long(40), Literal::Int(2)],
                vec![Literal::Int(2), Literal::Long(25), Literal::Int(2)],
            ]
        );
    }

    #[test]
    fn test_update_and_delete() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        // UPDATE t SET a = a + 10 WHERE a >= 2
        let report = exec(
            &mut db,
            Command::Update(UpdateCommand {
                table_name: "t".into(),
                changes: vec![(
                    "a".into(),
                    Expression::Arithmetic(
                        Box::new(col("a")),
                        crate::expressions::ArithmeticType::Plus,
                        Box::new(int(10)),
                    ),
                )],
                where_expr: Some(Expression::compare(
                    col("a"),
                    CompareType::GreaterThanEqual,
                    int(2),
                )),
            }),
        )
        .unwrap();
        assert_eq!(report, "Updated 2 row(s) in t.");

        // DELETE FROM t WHERE a = 12
        let report = exec(
            &mut db,
            Command::Delete(DeleteCommand::new(
                "t",
                Some(Expression::compare(col("a"), CompareType::Equals, int(12))),
            )),
        )
        .unwrap();
        assert_eq!(report, "Deleted 1 row(s) from t.");

        let mut rows =
            select_rows(&mut db, SelectClause::select_all(FromClause::base_table("t")));
        rows.sort_by_key(|row| row[0].to_long().unwrap_or(0));
        assert_eq!(
            rows,
            vec![
                vec![Literal::Int(1), Literal::from("x")],
                vec![Literal::Int(13), Literal::from("z")],
            ]
        );
    }

    #[test]
    fn test_rollback_via_commands() {
        let dir = TempDir::new("test_commands").unwrap();
        {
            let mut db = open_db(&dir);
            setup_t(&mut db);

            exec(&mut db, Command::BeginTransaction).unwrap();
            let rows: Vec<Vec<Expression>> = (10..20).map(|i| vec![int(i), str_lit("r")]).collect();
            exec(&mut db, Command::Insert(InsertCommand::new("t", rows))).unwrap();

            // All thirteen rows are visible inside the transaction.
            let visible =
                select_rows(&mut db, SelectClause::select_all(FromClause::base_table("t")));
            assert_eq!(visible.len(), 13);

            exec(&mut db, Command::RollbackTransaction).unwrap();

            let rows =
                select_rows(&mut db, SelectClause::select_all(FromClause::base_table("t")));
            assert_eq!(rows.len(), 3);
            db.close().unwrap();
        }

        // The rollback also survives a restart.
        let mut db = open_db(&dir);
        let rows = select_rows(&mut db, SelectClause::select_all(FromClause::base_table("t")));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_error_reporting() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        // Unknown table.
        let result = exec(
            &mut db,
            Command::Select(SelectCommand::new(SelectClause::select_all(
                FromClause::base_table("nope"),
            ))),
        );
        assert!(matches!(
            result,
            Err(ExecutionError::Plan(PlanError::StorageError(
                table_manager::Error::TableDoesNotExist(_)
            )))
        ));

        // Type mismatch on insert.
        let result = exec(
            &mut db,
            Command::Insert(InsertCommand::new("t", vec![vec![str_lit("no"), int(1)]])),
        );
        assert!(matches!(result, Err(ExecutionError::CannotStoreValue(..))));

        // Wrong arity on insert.
        let result = exec(
            &mut db,
            Command::Insert(InsertCommand::new("t", vec![vec![int(1)]])),
        );
        assert_eq!(result, Err(ExecutionError::ColumnCountMismatch(2, 1)));

        // A failed statement doesn't poison the session.
        let rows = select_rows(&mut db, SelectClause::select_all(FromClause::base_table("t")));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_create_index_records_key() {
        let dir = TempDir::new("test_commands").unwrap();
        {
            let mut db = open_db(&dir);
            setup_t(&mut db);

            exec(
                &mut db,
                Command::CreateIndex(CreateIndexCommand {
                    index_name: "t_a_idx".into(),
                    table_name: "t".into(),
                    column_names: vec!["a".into()],
                    unique: true,
                }),
            )
            .unwrap();

            let schema = db.storage.table_schema("t").unwrap();
            assert_eq!(schema.candidate_keys.len(), 1);
            assert_eq!(schema.candidate_keys[0].col_indexes, vec![0]);
            assert_eq!(
                schema.candidate_keys[0].index_name.as_deref(),
                Some("t_a_idx")
            );
            db.close().unwrap();
        }

        // The key metadata is persisted in the header page.
        let mut db = open_db(&dir);
        db.storage.open_table("t").unwrap();
        let schema = db.storage.table_schema("t").unwrap();
        assert_eq!(
            schema.candidate_keys[0].index_name.as_deref(),
            Some("t_a_idx")
        );
    }

    #[test]
    fn test_drop_table_command() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        exec(&mut db, Command::DropTable(DropTableCommand::new("t"))).unwrap();
        let result = exec(
            &mut db,
            Command::Select(SelectCommand::new(SelectClause::select_all(
                FromClause::base_table("t"),
            ))),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_analyze_command() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        setup_t(&mut db);

        let report = exec(
            &mut db,
            Command::Analyze(AnalyzeCommand::new(vec!["t"])),
        )
        .unwrap();
        assert_eq!(report, "Analyzed 1 table(s).");
        assert_eq!(db.storage.table_stats("t").unwrap().num_tuples, 3);
    }

    #[test]
    fn test_scalar_select() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);

        let clause = SelectClause {
            from_clause: None,
            where_expr: None,
            values: vec![SelectValue::Expression {
                expression: Expression::Arithmetic(
                    Box::new(int(2)),
                    crate::expressions::ArithmeticType::Plus,
                    Box::new(int(3)),
                ),
                alias: None,
            }],
            group_by_exprs: vec![],
            having: None,
            order_by_exprs: vec![],
        };
        let rows = select_rows(&mut db, clause);
        assert_eq!(rows, vec![vec![Literal::Int(5)]]);
    }

    #[test]
    fn test_exit_command() {
        let dir = TempDir::new("test_commands").unwrap();
        let mut db = open_db(&dir);
        assert!(Command::Exit.is_exit());
        assert_eq!(exec(&mut db, Command::Exit), Ok("Exiting.".to_string()));
    }
}
