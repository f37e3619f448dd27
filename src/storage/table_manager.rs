//! Table-level metadata: the open-table registry, table statistics, and the errors produced by
//! heap-table operations.
//!
//! The heap-file algorithms themselves (tuple scans, insertion, update, deletion, analysis)
//! live on the [`StorageManager`](super::StorageManager), which owns the buffer manager the
//! algorithms read pages through.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::expressions::Literal;
use crate::relations::{SchemaError, TableSchema};
use crate::storage::{dbpage, file_manager, DBFile, FilePointer, TupleError};

/// Given the name of a table, returns the name of the file that holds it.
#[inline]
pub fn get_table_file_name(table_name: &str) -> String {
    format!("{}.tbl", table_name)
}

/// An error that can occur while working with tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A table with the given name already exists.
    TableAlreadyExists(String),
    /// No table with the given name exists.
    TableDoesNotExist(String),
    /// A file pointer did not resolve to a live tuple, with a description of what failed.
    InvalidFilePointer(FilePointer, String),
    /// A tuple is too large to fit in any data page, as (tuple size, page size).
    TupleTooBig(u16, u32),
    /// A column named in an update does not exist or is ambiguous.
    SchemaError(SchemaError),
    /// An error from the file layer.
    FileManagerError(file_manager::Error),
    /// An error from the page layer.
    DBPageError(dbpage::Error),
    /// An error while reading or writing tuple values.
    TupleError(TupleError),
    /// The table file's header page is malformed.
    BadHeaderPage(String),
    /// An I/O error occurred.
    IOError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::TableAlreadyExists(ref name) => write!(f, "table {} already exists", name),
            Error::TableDoesNotExist(ref name) => write!(f, "table {} does not exist", name),
            Error::InvalidFilePointer(fp, ref why) => {
                write!(f, "invalid file pointer {}: {}", fp, why)
            }
            Error::TupleTooBig(size, page_size) => write!(
                f,
                "tuple size {} is too large for page size {}",
                size, page_size
            ),
            Error::SchemaError(ref e) => write!(f, "{}", e),
            Error::FileManagerError(ref e) => write!(f, "{}", e),
            Error::DBPageError(ref e) => write!(f, "{}", e),
            Error::TupleError(ref e) => write!(f, "{}", e),
            Error::BadHeaderPage(ref why) => write!(f, "bad header page: {}", why),
            Error::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
        }
    }
}

impl From<file_manager::Error> for Error {
    fn from(e: file_manager::Error) -> Error {
        Error::FileManagerError(e)
    }
}

impl From<dbpage::Error> for Error {
    fn from(e: dbpage::Error) -> Error {
        Error::DBPageError(e)
    }
}

impl From<TupleError> for Error {
    fn from(e: TupleError) -> Error {
        Error::TupleError(e)
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Error {
        Error::SchemaError(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::IOError(e.to_string())
    }
}

/// Table-level statistics, persisted in the table's header page and used by the planner's cost
/// estimates. Refreshed by `ANALYZE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStats {
    /// The number of data pages in the table file (excluding the header page).
    pub num_data_pages: u16,
    /// The number of live tuples in the table.
    pub num_tuples: u32,
    /// The average storage size of a tuple, in bytes.
    pub avg_tuple_size: f32,
}

impl Default for TableStats {
    fn default() -> Self {
        TableStats {
            num_data_pages: 0,
            num_tuples: 0,
            avg_tuple_size: 0.0,
        }
    }
}

impl TableStats {
    /// Encodes the statistics into their stored form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        out.write_u16::<BigEndian>(self.num_data_pages).unwrap();
        out.write_u32::<BigEndian>(self.num_tuples).unwrap();
        out.write_f32::<BigEndian>(self.avg_tuple_size).unwrap();
        out
    }

    /// Reads statistics from their stored form.
    pub fn read<R: Read>(input: &mut R) -> io::Result<TableStats> {
        Ok(TableStats {
            num_data_pages: input.read_u16::<BigEndian>()?,
            num_tuples: input.read_u32::<BigEndian>()?,
            avg_tuple_size: input.read_f32::<BigEndian>()?,
        })
    }
}

/// Per-column statistics computed by `ANALYZE` and held in memory for the selectivity
/// estimator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnStats {
    /// The number of distinct non-NULL values, when known.
    pub num_distinct: Option<u32>,
    /// The number of NULL values.
    pub num_nulls: u32,
    /// The least non-NULL value, for comparable columns.
    pub min_value: Option<Literal>,
    /// The greatest non-NULL value, for comparable columns.
    pub max_value: Option<Literal>,
}

/// A single open table: its name, backing file, schema, and statistics.
pub struct Table {
    /// The table's name.
    pub name: String,
    /// The open backing file.
    pub db_file: DBFile<File>,
    /// The table's schema, parsed from the header page.
    pub schema: TableSchema,
    /// Table-level statistics, as last read from (or written to) the header page.
    pub stats: TableStats,
    /// Per-column statistics; empty until the table is analyzed.
    pub column_stats: Vec<ColumnStats>,
}

impl Table {
    /// The name of the table's backing file.
    pub fn file_name(&self) -> String {
        get_table_file_name(&self.name)
    }
}

/// The registry of currently open tables. Tables are opened lazily on first reference and stay
/// open until dropped or the database shuts down.
#[derive(Default)]
pub struct TableManager {
    open_tables: HashMap<String, Table>,
}

impl TableManager {
    /// Creates an empty registry.
    pub fn new() -> TableManager {
        TableManager::default()
    }

    /// Whether the named table is currently open.
    pub fn is_open(&self, name: &str) -> bool {
        self.open_tables.contains_key(name)
    }

    /// Returns a mutable reference to an open table.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.open_tables.get_mut(name)
    }

    /// Returns a shared reference to an open table.
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.open_tables.get(name)
    }

    /// Records a newly opened table.
    pub fn insert(&mut self, table: Table) {
        self.open_tables.insert(table.name.clone(), table);
    }

    /// Removes a table from the registry, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.open_tables.remove(name)
    }

    /// The names of all open tables.
    pub fn open_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.open_tables.keys().cloned().collect();
        names.sort();
        names
    }
}
