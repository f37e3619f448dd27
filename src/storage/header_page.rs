//! Access to the header page (page 0) of a heap table file.
//!
//! Header pages are laid out as follows:
//!
//! 1. As with all `DBFile`s, bytes 0 and 1 are the file type and page-size encoding.
//! 2. At [`OFFSET_SCHEMA_SIZE`] and [`OFFSET_STATS_SIZE`], two-byte sizes of the schema and
//!    statistics areas.
//! 3. At [`OFFSET_SCHEMA_START`], the table schema: column count, per-column descriptors, and
//!    the table's key descriptors. See [`TableSchema`] for the blob format.
//! 4. Immediately after the schema, the table statistics.
//!
//! Even with all this information, only a few hundred bytes are typically needed for most
//! tables.

use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::relations::{SchemaError, TableSchema};
use crate::storage::table_manager::TableStats;
use crate::storage::DBPage;

/// The offset in the header page where the size of the table schema is stored (u16).
pub const OFFSET_SCHEMA_SIZE: u64 = 2;

/// The offset in the header page where the size of the table statistics is stored (u16).
pub const OFFSET_STATS_SIZE: u64 = 4;

/// The offset in the header page where the table schema starts.
pub const OFFSET_SCHEMA_START: u64 = 6;

/// Writes the schema and statistics into a header page, recording both area sizes.
pub fn write_header(
    page: &mut DBPage,
    schema: &TableSchema,
    stats: &TableStats,
) -> Result<(), SchemaError> {
    let mut schema_blob = Cursor::new(Vec::new());
    schema.write(&mut schema_blob)?;
    let schema_blob = schema_blob.into_inner();

    let stats_blob = stats.encode();

    debug!(
        "Writing table header: {} schema bytes, {} stats bytes.",
        schema_blob.len(),
        stats_blob.len()
    );

    page.seek(SeekFrom::Start(OFFSET_SCHEMA_SIZE))?;
    page.write_u16::<BigEndian>(schema_blob.len() as u16)?;
    page.seek(SeekFrom::Start(OFFSET_STATS_SIZE))?;
    page.write_u16::<BigEndian>(stats_blob.len() as u16)?;

    page.write_at_position(OFFSET_SCHEMA_START as usize, &schema_blob)
        .map_err(|e| SchemaError::IOError(e.to_string()))?;
    page.write_at_position(OFFSET_SCHEMA_START as usize + schema_blob.len(), &stats_blob)
        .map_err(|e| SchemaError::IOError(e.to_string()))?;
    Ok(())
}

/// Reads the number of bytes the stored schema occupies.
pub fn get_schema_size(page: &mut DBPage) -> Result<u16, SchemaError> {
    page.seek(SeekFrom::Start(OFFSET_SCHEMA_SIZE))?;
    page.read_u16::<BigEndian>().map_err(Into::into)
}

/// Parses the table schema out of a header page, assigning columns the given table name.
pub fn read_schema(page: &mut DBPage, table_name: &str) -> Result<TableSchema, SchemaError> {
    page.seek(SeekFrom::Start(OFFSET_SCHEMA_START))?;
    TableSchema::read(page, table_name)
}

/// Parses the table statistics out of a header page.
pub fn read_stats(page: &mut DBPage) -> Result<TableStats, SchemaError> {
    let schema_size = get_schema_size(page)? as u64;
    page.seek(SeekFrom::Start(OFFSET_SCHEMA_START + schema_size))?;
    TableStats::read(page).map_err(|e| SchemaError::IOError(e.to_string()))
}

/// Overwrites just the statistics area of a header page, leaving the schema untouched. Used by
/// `ANALYZE` to persist freshly computed statistics.
pub fn write_stats(page: &mut DBPage, stats: &TableStats) -> Result<(), SchemaError> {
    let schema_size = get_schema_size(page)? as usize;
    let stats_blob = stats.encode();

    page.seek(SeekFrom::Start(OFFSET_STATS_SIZE))?;
    page.write_u16::<BigEndian>(stats_blob.len() as u16)?;
    page.write_at_position(OFFSET_SCHEMA_START as usize + schema_size, &stats_blob)
        .map_err(|e| SchemaError::IOError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::{ColumnInfo, ColumnType, KeyColumnRefs, Schema};

    fn sample_schema() -> TableSchema {
        let mut schema = TableSchema::from_schema(
            Schema::with_columns(vec![
                ColumnInfo::with_table_name(ColumnType::Integer, "id", "t"),
                ColumnInfo::with_table_name(ColumnType::VarChar { length: 10 }, "name", "t"),
            ])
            .unwrap(),
        );
        schema.primary_key = Some(KeyColumnRefs {
            col_indexes: vec![0],
            index_name: None,
        });
        schema
    }

    #[test]
    fn test_header_round_trip() {
        let mut page = DBPage::new(512, 0);
        let schema = sample_schema();
        let stats = TableStats {
            num_data_pages: 3,
            num_tuples: 17,
            avg_tuple_size: 12.5,
        };

        write_header(&mut page, &schema, &stats).unwrap();

        assert_eq!(read_schema(&mut page, "t").unwrap(), schema);
        assert_eq!(read_stats(&mut page).unwrap(), stats);
    }

    #[test]
    fn test_stats_update_preserves_schema() {
        let mut page = DBPage::new(512, 0);
        let schema = sample_schema();
        write_header(&mut page, &schema, &TableStats::default()).unwrap();

        let new_stats = TableStats {
            num_data_pages: 9,
            num_tuples: 100,
            avg_tuple_size: 33.0,
        };
        write_stats(&mut page, &new_stats).unwrap();

        assert_eq!(read_schema(&mut page, "t").unwrap(), schema);
        assert_eq!(read_stats(&mut page).unwrap(), new_stats);
    }
}
