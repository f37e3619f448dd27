//! This module contains utilities and classes for handling table schemas.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::ops::Index;
use std::slice::Iter;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::relations::column::{is_valid_column_name, EMPTY_CHAR, EMPTY_NUMERIC, EMPTY_VARCHAR};
use crate::relations::{ColumnInfo, ColumnName, ColumnType};
use crate::storage::{ReadNanoDBExt, WriteNanoDBExt};

/// An error that can occur while building, reading or writing schemas.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The specified column is a duplicate of an existing one.
    Duplicate(ColumnInfo),
    /// An unqualified column name matched more than one column.
    Ambiguous(String),
    /// No column matched the requested name.
    NoSuchColumn(String),
    /// Schemas must have at least one column.
    NoColumns,
    /// Schemas are limited to 255 columns by the on-disk format.
    TooManyColumns(usize),
    /// A stored column name contained illegal characters.
    InvalidColumnName(String),
    /// A stored SQL type ID did not name a supported type.
    InvalidTypeId(u8),
    /// A stored key referenced a column index outside the schema.
    InvalidKeyColumn(u8),
    /// An error occurred while performing I/O.
    IOError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Duplicate(ref ci) => {
                write!(f, "the column {} is a duplicate of an existing one", ci)
            }
            Error::Ambiguous(ref name) => write!(f, "the column name {} is ambiguous", name),
            Error::NoSuchColumn(ref name) => write!(f, "no column named {} exists", name),
            Error::NoColumns => write!(f, "all schemas must have at least one column"),
            Error::TooManyColumns(n) => {
                write!(f, "schemas may have at most 255 columns; got {}", n)
            }
            Error::InvalidColumnName(ref name) => {
                write!(f, "the stored column name \"{}\" is not valid", name)
            }
            Error::InvalidTypeId(id) => write!(f, "unrecognized SQL type ID {}", id),
            Error::InvalidKeyColumn(idx) => {
                write!(f, "key references nonexistent column index {}", idx)
            }
            Error::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::IOError(e.to_string())
    }
}

/// A schema is an ordered collection of column names and associated types.
///
/// Many different entities in the database code have schemas associated with them. Tables and
/// tuples have schemas, for obvious reasons, and relational-algebra plan nodes also have schemas,
/// which specify the kinds of tuples that they generate.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    column_infos: Vec<ColumnInfo>,
    cols_hashed_by_table: HashMap<Option<String>, HashMap<Option<String>, usize>>,
    cols_hashed_by_column: HashMap<Option<String>, Vec<usize>>,
}

impl Index<usize> for Schema {
    type Output = ColumnInfo;

    fn index(&self, i: usize) -> &Self::Output {
        &self.column_infos[i]
    }
}

impl IntoIterator for Schema {
    type Item = ColumnInfo;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.column_infos.into_iter()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::new()
    }
}

impl Schema {
    /// Instantiates a new schema with no columns in it.
    pub fn new() -> Schema {
        Schema {
            column_infos: vec![],
            cols_hashed_by_table: Default::default(),
            cols_hashed_by_column: Default::default(),
        }
    }

    /// Instantiates a schema with the given columns.
    ///
    /// # Errors
    /// This constructor will fail if adding a column would fail at any point.
    pub fn with_columns<I: IntoIterator<Item = ColumnInfo>>(
        column_infos: I,
    ) -> Result<Schema, Error> {
        let mut result = Schema::new();
        result.add_columns(column_infos).map(|_| result)
    }

    /// Checks if the schema is empty.
    pub fn is_empty(&self) -> bool {
        self.column_infos.is_empty()
    }

    /// Returns the number of columns currently in the schema.
    pub fn num_columns(&self) -> usize {
        self.column_infos.len()
    }

    /// Returns an iterator over the column infos.
    pub fn iter(&self) -> Iter<ColumnInfo> {
        self.column_infos.iter()
    }

    /// Add one column to the schema.
    ///
    /// # Errors
    /// This will fail if a column with the same (table, name) pair already exists in the schema.
    pub fn add_column(&mut self, column: ColumnInfo) -> Result<(), Error> {
        if column.name.is_some() {
            if let Some(table_map) = self.cols_hashed_by_table.get(&column.table_name) {
                if table_map.contains_key(&column.name) {
                    return Err(Error::Duplicate(column));
                }
            }
        }

        let index = self.column_infos.len();

        self.cols_hashed_by_table
            .entry(column.table_name.clone())
            .or_default()
            .insert(column.name.clone(), index);
        self.cols_hashed_by_column
            .entry(column.name.clone())
            .or_default()
            .push(index);

        self.column_infos.push(column);
        Ok(())
    }

    /// Add multiple columns to the schema.
    pub fn add_columns<T: IntoIterator<Item = ColumnInfo>>(&mut self, columns: T) -> Result<(), Error> {
        for column in columns {
            self.add_column(column)?;
        }
        Ok(())
    }

    /// Looks up a single column by name, enforcing the resolution rules for column references:
    /// a qualified name must match exactly, and an unqualified name must match exactly one column
    /// across all tables in the schema.
    ///
    /// # Errors
    /// `Ambiguous` if an unqualified name matches several columns; `NoSuchColumn` if nothing
    /// matches.
    pub fn find_column(&self, col_name: &ColumnName) -> Result<(usize, &ColumnInfo), Error> {
        match *col_name {
            (Some(ref table_name), Some(ref column_name)) => {
                let idx = self
                    .cols_hashed_by_table
                    .get(&Some(table_name.clone()))
                    .and_then(|m| m.get(&Some(column_name.clone())));
                match idx {
                    Some(&i) => Ok((i, &self.column_infos[i])),
                    None => Err(Error::NoSuchColumn(format!("{}.{}", table_name, column_name))),
                }
            }
            (None, Some(ref column_name)) => {
                match self.cols_hashed_by_column.get(&Some(column_name.clone())) {
                    Some(indexes) => match indexes.len() {
                        0 => Err(Error::NoSuchColumn(column_name.clone())),
                        1 => Ok((indexes[0], &self.column_infos[indexes[0]])),
                        _ => Err(Error::Ambiguous(column_name.clone())),
                    },
                    None => Err(Error::NoSuchColumn(column_name.clone())),
                }
            }
            _ => Err(Error::NoSuchColumn(
                crate::relations::column::column_name_to_string(col_name),
            )),
        }
    }

    /// Given a (possibly wildcard) column-name, returns all columns that match, as (index,
    /// column-info) pairs in schema order.
    ///
    /// All of these forms are supported:
    ///
    /// * `tbl.col`: qualified lookup
    /// * `col`: unqualified lookup (may match several columns)
    /// * `tbl.*`: all columns associated with a particular table name
    /// * `*`: all columns in the schema
    pub fn find_columns(&self, col_name: &ColumnName) -> Vec<(usize, ColumnInfo)> {
        let mut found: Vec<(usize, ColumnInfo)> = Vec::new();

        match *col_name {
            (Some(ref table_name), Some(ref column_name)) => {
                if let Some(table_cols) = self.cols_hashed_by_table.get(&Some(table_name.clone())) {
                    if let Some(&index) = table_cols.get(&Some(column_name.clone())) {
                        found.push((index, self.column_infos[index].clone()));
                    }
                }
            }
            (Some(ref table_name), None) => {
                for (idx, info) in self.column_infos.iter().enumerate() {
                    if info.table_name.as_deref() == Some(table_name.as_str()) {
                        found.push((idx, info.clone()));
                    }
                }
            }
            (None, Some(ref column_name)) => {
                if let Some(indexes) = self.cols_hashed_by_column.get(&Some(column_name.clone())) {
                    for &index in indexes {
                        found.push((index, self.column_infos[index].clone()));
                    }
                }
            }
            (None, None) => {
                for (idx, info) in self.column_infos.iter().enumerate() {
                    found.push((idx, info.clone()));
                }
            }
        }

        found.sort_by_key(|&(idx, _)| idx);
        found
    }

    /// Checks if the schema has exactly one column with the provided unqualified name.
    pub fn has_column<S: Into<String>>(&self, name: S) -> bool {
        self.find_column(&(None, Some(name.into()))).is_ok()
    }

    /// Iterates through all columns in this schema and sets them all to be on the specified
    /// table. Fails if the override would produce duplicate (table, column) pairs.
    pub fn set_table_name<S: Into<String>>(&mut self, name: S) -> Result<(), Error> {
        let name = name.into();

        for (col_name, indexes) in self.cols_hashed_by_column.iter() {
            if col_name.is_some() && indexes.len() > 1 {
                return Err(Error::Ambiguous(col_name.clone().unwrap()));
            }
        }

        let old_infos = std::mem::take(&mut self.column_infos);
        self.cols_hashed_by_table.clear();
        self.cols_hashed_by_column.clear();

        for mut info in old_infos {
            info.table_name = Some(name.clone());
            self.add_column(info)?;
        }
        Ok(())
    }

    /// Write the schema blob to some output, starting at the output's current position. The
    /// format is: column count (u8), then per-column descriptors of SQL type ID, type-specific
    /// modifiers, and the column name as a length-prefixed string.
    pub fn write<W: Write>(&self, output: &mut W) -> Result<(), Error> {
        if self.column_infos.is_empty() {
            return Err(Error::NoColumns);
        }
        if self.column_infos.len() > 255 {
            return Err(Error::TooManyColumns(self.column_infos.len()));
        }

        output.write_u8(self.column_infos.len() as u8)?;
        for column_info in &self.column_infos {
            output.write_u8(u8::from(column_info.column_type))?;

            match column_info.column_type {
                ColumnType::Char { length } | ColumnType::VarChar { length } => {
                    output.write_u16::<BigEndian>(length)?;
                }
                ColumnType::Numeric { precision, scale } => {
                    output.write_u8(precision as u8)?;
                    output.write_u8(scale as u8)?;
                }
                _ => {}
            }

            output.write_varchar255(column_info.name.clone().unwrap_or_default())?;
        }
        Ok(())
    }

    /// Read a schema blob from some input, assigning every column the given table name.
    ///
    /// # Errors
    /// Produces storage-format errors for unknown SQL type IDs and illegal column names.
    pub fn read<R: Read>(input: &mut R, table_name: &str) -> Result<Schema, Error> {
        let num_cols = input.read_u8()?;
        if num_cols < 1 {
            return Err(Error::NoColumns);
        }

        let mut result = Schema::new();
        for _ in 0..num_cols {
            let type_id = input.read_u8()?;
            let col_type = match ColumnType::from_type_id(type_id) {
                Some(t) if t == EMPTY_CHAR => ColumnType::Char {
                    length: input.read_u16::<BigEndian>()?,
                },
                Some(t) if t == EMPTY_VARCHAR => ColumnType::VarChar {
                    length: input.read_u16::<BigEndian>()?,
                },
                Some(t) if t == EMPTY_NUMERIC => {
                    let precision = input.read_u8()? as u16;
                    let scale = input.read_u8()? as u16;
                    ColumnType::Numeric { precision, scale }
                }
                Some(t) => t,
                None => return Err(Error::InvalidTypeId(type_id)),
            };

            let col_name = input.read_varchar255()?;
            if !is_valid_column_name(&col_name) {
                return Err(Error::InvalidColumnName(col_name));
            }

            result.add_column(ColumnInfo::with_table_name(col_type, col_name, table_name))?;
        }

        Ok(result)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let infos: Vec<String> = self.column_infos.iter().map(|c| format!("{}", c)).collect();
        write!(f, "Schema[cols={}]", infos.join(", "))
    }
}

/// One key over a table: the indexes of the participating columns, in key order, plus the name
/// of the index that enforces the key, if one has been created.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyColumnRefs {
    /// Indexes into the table schema's column list.
    pub col_indexes: Vec<u8>,
    /// The name of the enforcing index, if any.
    pub index_name: Option<String>,
}

/// A foreign key over a table: local column indexes, the referenced table, and the referenced
/// table's column indexes, positionally matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyColumnRefs {
    /// Indexes of the referencing columns in this table's schema.
    pub col_indexes: Vec<u8>,
    /// The name of the referenced table.
    pub ref_table: String,
    /// Indexes of the referenced columns in the referenced table's schema.
    pub ref_col_indexes: Vec<u8>,
    /// The name of the enforcing index, if any.
    pub index_name: Option<String>,
}

/// A table schema is a [`Schema`] plus the table's key constraints: an optional primary key,
/// zero or more candidate keys, and zero or more foreign keys.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// The column schema.
    pub schema: Schema,
    /// The table's primary key, if one was declared.
    pub primary_key: Option<KeyColumnRefs>,
    /// The table's candidate keys.
    pub candidate_keys: Vec<KeyColumnRefs>,
    /// The table's foreign keys.
    pub foreign_keys: Vec<ForeignKeyColumnRefs>,
}

impl std::ops::Deref for TableSchema {
    type Target = Schema;
    fn deref(&self) -> &Self::Target {
        &self.schema
    }
}

fn write_key_columns<W: Write>(output: &mut W, key: &KeyColumnRefs) -> Result<(), Error> {
    output.write_u8(key.col_indexes.len() as u8)?;
    for &idx in &key.col_indexes {
        output.write_u8(idx)?;
    }
    output.write_varchar255(key.index_name.clone().unwrap_or_default())?;
    Ok(())
}

fn read_key_columns<R: Read>(input: &mut R, num_cols: usize) -> Result<KeyColumnRefs, Error> {
    let n = input.read_u8()?;
    let mut col_indexes = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let idx = input.read_u8()?;
        if idx as usize >= num_cols {
            return Err(Error::InvalidKeyColumn(idx));
        }
        col_indexes.push(idx);
    }
    let index_name = input.read_varchar255()?;
    Ok(KeyColumnRefs {
        col_indexes,
        index_name: if index_name.is_empty() {
            None
        } else {
            Some(index_name)
        },
    })
}

impl TableSchema {
    /// Wraps a plain schema into a table schema with no declared keys.
    pub fn from_schema(schema: Schema) -> TableSchema {
        TableSchema {
            schema,
            primary_key: None,
            candidate_keys: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Write the full table schema blob (columns, then key descriptors) to the output, starting
    /// at its current position.
    pub fn write<W: Write>(&self, output: &mut W) -> Result<(), Error> {
        self.schema.write(output)?;

        match self.primary_key {
            Some(ref pk) => {
                output.write_u8(1)?;
                write_key_columns(output, pk)?;
            }
            None => output.write_u8(0)?,
        }

        output.write_u8(self.candidate_keys.len() as u8)?;
        for key in &self.candidate_keys {
            write_key_columns(output, key)?;
        }

        output.write_u8(self.foreign_keys.len() as u8)?;
        for fk in &self.foreign_keys {
            output.write_u8(fk.col_indexes.len() as u8)?;
            for &idx in &fk.col_indexes {
                output.write_u8(idx)?;
            }
            output.write_varchar255(fk.ref_table.clone())?;
            for &idx in &fk.ref_col_indexes {
                output.write_u8(idx)?;
            }
            output.write_varchar255(fk.index_name.clone().unwrap_or_default())?;
        }

        Ok(())
    }

    /// Read a full table schema blob from the input, assigning every column the given table
    /// name.
    pub fn read<R: Read>(input: &mut R, table_name: &str) -> Result<TableSchema, Error> {
        let schema = Schema::read(input, table_name)?;
        let num_cols = schema.num_columns();

        let primary_key = if input.read_u8()? != 0 {
            Some(read_key_columns(input, num_cols)?)
        } else {
            None
        };

        let num_candidate = input.read_u8()?;
        let mut candidate_keys = Vec::with_capacity(num_candidate as usize);
        for _ in 0..num_candidate {
            candidate_keys.push(read_key_columns(input, num_cols)?);
        }

        let num_foreign = input.read_u8()?;
        let mut foreign_keys = Vec::with_capacity(num_foreign as usize);
        for _ in 0..num_foreign {
            let n = input.read_u8()?;
            let mut col_indexes = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let idx = input.read_u8()?;
                if idx as usize >= num_cols {
                    return Err(Error::InvalidKeyColumn(idx));
                }
                col_indexes.push(idx);
            }
            let ref_table = input.read_varchar255()?;
            let mut ref_col_indexes = Vec::with_capacity(n as usize);
            for _ in 0..n {
                ref_col_indexes.push(input.read_u8()?);
            }
            let index_name = input.read_varchar255()?;
            foreign_keys.push(ForeignKeyColumnRefs {
                col_indexes,
                ref_table,
                ref_col_indexes,
                index_name: if index_name.is_empty() {
                    None
                } else {
                    Some(index_name)
                },
            });
        }

        Ok(TableSchema {
            schema,
            primary_key,
            candidate_keys,
            foreign_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::relations::{ColumnInfo, ColumnType};

    fn abc_schema() -> Schema {
        Schema::with_columns(vec![
            ColumnInfo::with_table_name(ColumnType::Integer, "a", "foo"),
            ColumnInfo::with_table_name(ColumnType::VarChar { length: 20 }, "b", "foo"),
            ColumnInfo::with_table_name(ColumnType::Integer, "c", "foo"),
        ])
        .unwrap()
    }

    #[test]
    fn test_index_and_iter() {
        let schema = abc_schema();
        assert_eq!(schema.num_columns(), 3);
        assert_eq!(schema[1].name.as_deref(), Some("b"));
        let names: Vec<_> = schema.iter().map(|c| c.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_column() {
        let mut schema = abc_schema();
        let dup = ColumnInfo::with_table_name(ColumnType::Double, "a", "foo");
        assert_eq!(schema.add_column(dup.clone()), Err(Error::Duplicate(dup)));
    }

    #[test]
    fn test_find_column_resolution() {
        let mut schema = abc_schema();
        schema
            .add_column(ColumnInfo::with_table_name(ColumnType::Integer, "a", "bar"))
            .unwrap();

        // Qualified lookups resolve exactly.
        assert_eq!(
            schema
                .find_column(&(Some("bar".into()), Some("a".into())))
                .unwrap()
                .0,
            3
        );

        // Unqualified lookup of a unique name works.
        assert_eq!(schema.find_column(&(None, Some("b".into()))).unwrap().0, 1);

        // Unqualified lookup of a duplicated name is ambiguous.
        assert_eq!(
            schema.find_column(&(None, Some("a".into()))),
            Err(Error::Ambiguous("a".into()))
        );

        // Unknown names fail.
        assert_eq!(
            schema.find_column(&(None, Some("zzz".into()))),
            Err(Error::NoSuchColumn("zzz".into()))
        );
    }

    #[test]
    fn test_find_columns_wildcards() {
        let mut schema = abc_schema();
        schema
            .add_column(ColumnInfo::with_table_name(ColumnType::Integer, "x", "bar"))
            .unwrap();

        assert_eq!(schema.find_columns(&(None, None)).len(), 4);

        let foo_only = schema.find_columns(&(Some("foo".into()), None));
        assert_eq!(foo_only.len(), 3);
        assert_eq!(foo_only[0].0, 0);
        assert_eq!(foo_only[2].0, 2);

        assert_eq!(schema.find_columns(&(None, Some("x".into()))).len(), 1);
        assert!(schema.find_columns(&(None, Some("nope".into()))).is_empty());
    }

    #[test]
    fn test_set_table_name() {
        let mut schema = Schema::with_columns(vec![
            ColumnInfo::with_name(ColumnType::Integer, "a"),
            ColumnInfo::with_name(ColumnType::Float, "b"),
        ])
        .unwrap();
        schema.set_table_name("t").unwrap();
        assert_eq!(schema[0].table_name.as_deref(), Some("t"));
        assert_eq!(schema[1].table_name.as_deref(), Some("t"));

        // Renaming a schema with duplicate column names would create ambiguity.
        let mut dup = Schema::with_columns(vec![
            ColumnInfo::with_table_name(ColumnType::Integer, "a", "t1"),
            ColumnInfo::with_table_name(ColumnType::Integer, "a", "t2"),
        ])
        .unwrap();
        assert_eq!(dup.set_table_name("t"), Err(Error::Ambiguous("a".into())));
    }

    #[test]
    fn test_schema_round_trip() {
        let schema = Schema::with_columns(vec![
            ColumnInfo::with_table_name(ColumnType::Integer, "id", "t"),
            ColumnInfo::with_table_name(ColumnType::VarChar { length: 32 }, "name", "t"),
            ColumnInfo::with_table_name(
                ColumnType::Numeric {
                    precision: 10,
                    scale: 2,
                },
                "price",
                "t",
            ),
        ])
        .unwrap();

        let mut buf = Cursor::new(Vec::new());
        schema.write(&mut buf).unwrap();
        buf.set_position(0);

        let read_back = Schema::read(&mut buf, "t").unwrap();
        assert_eq!(read_back, schema);
    }

    #[test]
    fn test_table_schema_round_trip_with_keys() {
        let mut table_schema = TableSchema::from_schema(
            Schema::with_columns(vec![
                ColumnInfo::with_table_name(ColumnType::Integer, "id", "t"),
                ColumnInfo::with_table_name(ColumnType::Integer, "dept", "t"),
                ColumnInfo::with_table_name(ColumnType::VarChar { length: 16 }, "name", "t"),
            ])
            .unwrap(),
        );
        table_schema.primary_key = Some(KeyColumnRefs {
            col_indexes: vec![0],
            index_name: Some("t_pk".into()),
        });
        table_schema.candidate_keys.push(KeyColumnRefs {
            col_indexes: vec![2],
            index_name: None,
        });
        table_schema.foreign_keys.push(ForeignKeyColumnRefs {
            col_indexes: vec![1],
            ref_table: "dept".into(),
            ref_col_indexes: vec![0],
            index_name: None,
        });

        let mut buf = Cursor::new(Vec::new());
        table_schema.write(&mut buf).unwrap();
        buf.set_position(0);

        let read_back = TableSchema::read(&mut buf, "t").unwrap();
        assert_eq!(read_back, table_schema);
    }

    #[test]
    fn test_read_rejects_bad_column_name() {
        // A schema blob whose single column name starts with a digit.
        let mut blob = vec![1u8, 1u8];
        blob.push(4);
        blob.extend_from_slice(b"2bad");
        let result = Schema::read(&mut Cursor::new(blob), "t");
        assert_eq!(result, Err(Error::InvalidColumnName("2bad".into())));
    }

    #[test]
    fn test_read_rejects_bad_type_id() {
        let blob = vec![1u8, 99u8];
        let result = Schema::read(&mut Cursor::new(blob), "t");
        assert_eq!(result, Err(Error::InvalidTypeId(99)));
    }
}
