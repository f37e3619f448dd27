//! This module contains the relational-model types: column types, column metadata, and schemas.

pub mod column;
pub mod schema;

pub use self::column::{column_name_to_string, ColumnInfo, ColumnName, ColumnType};
pub use self::schema::{ForeignKeyColumnRefs, KeyColumnRefs, Schema, TableSchema};

pub use self::schema::Error as SchemaError;
