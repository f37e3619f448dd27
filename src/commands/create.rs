//! `CREATE TABLE` and `CREATE INDEX`.

use crate::commands::{run_in_transaction, ExecutionError};
use crate::database::Database;
use crate::relations::column::is_valid_column_name;
use crate::relations::{
    ColumnInfo, ColumnType, ForeignKeyColumnRefs, KeyColumnRefs, Schema, TableSchema,
};
use crate::storage::table_manager::get_table_file_name;

/// One column in a `CREATE TABLE` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    /// The column name.
    pub name: String,
    /// The column type.
    pub column_type: ColumnType,
}

/// A foreign-key declaration in a `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDecl {
    /// The referencing columns in the new table.
    pub columns: Vec<String>,
    /// The referenced table.
    pub ref_table: String,
    /// The referenced columns, positionally matched with `columns`.
    pub ref_columns: Vec<String>,
}

/// The `CREATE TABLE` command.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableCommand {
    /// The name of the table to create.
    pub table_name: String,
    /// The column declarations, in order.
    pub columns: Vec<ColumnDecl>,
    /// Column names of the primary key, if one was declared.
    pub primary_key: Option<Vec<String>>,
    /// Column-name lists of `UNIQUE` constraints.
    pub unique_keys: Vec<Vec<String>>,
    /// Foreign-key declarations.
    pub foreign_keys: Vec<ForeignKeyDecl>,
}

impl CreateTableCommand {
    /// A plain `CREATE TABLE` with no constraints.
    pub fn new(table_name: &str, columns: Vec<ColumnDecl>) -> CreateTableCommand {
        CreateTableCommand {
            table_name: table_name.to_string(),
            columns,
            primary_key: None,
            unique_keys: vec![],
            foreign_keys: vec![],
        }
    }

    fn resolve_key_columns(
        schema: &Schema,
        names: &[String],
    ) -> Result<Vec<u8>, ExecutionError> {
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let (idx, _) = schema
                .find_column(&(None, Some(name.clone())))
                .map_err(|_| ExecutionError::UnknownKeyColumn(name.clone()))?;
            indexes.push(idx as u8);
        }
        Ok(indexes)
    }

    /// Executes the command: builds and validates the table schema, then writes the table's
    /// header page.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        let mut schema = Schema::new();
        for decl in &self.columns {
            if !is_valid_column_name(&decl.name) {
                return Err(ExecutionError::InvalidColumnDecl(format!(
                    "bad column name \"{}\"",
                    decl.name
                )));
            }
            if !decl.column_type.has_valid_modifiers() {
                return Err(ExecutionError::InvalidColumnDecl(format!(
                    "bad type modifiers in {}",
                    decl.column_type
                )));
            }
            schema.add_column(ColumnInfo::with_table_name(
                decl.column_type,
                decl.name.clone(),
                self.table_name.clone(),
            ))?;
        }

        let mut table_schema = TableSchema::from_schema(schema);

        if let Some(ref pk_columns) = self.primary_key {
            table_schema.primary_key = Some(KeyColumnRefs {
                col_indexes: Self::resolve_key_columns(&table_schema.schema, pk_columns)?,
                index_name: None,
            });
        }
        for unique in &self.unique_keys {
            let col_indexes = Self::resolve_key_columns(&table_schema.schema, unique)?;
            table_schema.candidate_keys.push(KeyColumnRefs {
                col_indexes,
                index_name: None,
            });
        }
        for fk in &self.foreign_keys {
            if fk.columns.len() != fk.ref_columns.len() {
                return Err(ExecutionError::InvalidColumnDecl(format!(
                    "foreign key on {} columns references {} columns",
                    fk.columns.len(),
                    fk.ref_columns.len()
                )));
            }
            let col_indexes = Self::resolve_key_columns(&table_schema.schema, &fk.columns)?;
            // The referenced table must exist so the referenced columns can be resolved.
            db.storage.open_table(&fk.ref_table)?;
            let ref_schema = db.storage.table_schema(&fk.ref_table)?;
            let ref_col_indexes = Self::resolve_key_columns(&ref_schema.schema, &fk.ref_columns)?;
            table_schema.foreign_keys.push(ForeignKeyColumnRefs {
                col_indexes,
                ref_table: fk.ref_table.clone(),
                ref_col_indexes,
                index_name: None,
            });
        }

        db.storage.create_table(&self.table_name, table_schema)?;
        Ok(format!("Created table {}.", self.table_name))
    }
}

/// The `CREATE INDEX` command. The index body itself is not built; the schema records the
/// key's existence and the enforcing index's name, which is all the planner consults.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexCommand {
    /// The index name.
    pub index_name: String,
    /// The indexed table.
    pub table_name: String,
    /// The indexed columns, in key order.
    pub column_names: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl CreateIndexCommand {
    /// Executes the command: records the key columns and index name in the table's schema and
    /// rewrites the header page.
    pub fn execute(&self, db: &mut Database) -> Result<String, ExecutionError> {
        db.storage.open_table(&self.table_name)?;

        let mut schema = db.storage.table_schema(&self.table_name)?.clone();
        let col_indexes =
            CreateTableCommand::resolve_key_columns(&schema.schema, &self.column_names)?;

        schema.candidate_keys.push(KeyColumnRefs {
            col_indexes,
            index_name: Some(self.index_name.clone()),
        });

        let table_name = self.table_name.clone();
        let index_name = self.index_name.clone();
        run_in_transaction(db, move |db| {
            let handle = db.storage.update_table_schema(&table_name, schema)?;
            db.record_page_update(&get_table_file_name(&table_name), &handle)?;
            Ok(format!(
                "Created index {} on table {}.",
                index_name, table_name
            ))
        })
    }
}
