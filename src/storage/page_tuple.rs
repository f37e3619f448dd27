//! Tuples stored in slotted data pages.
//!
//! Each stored tuple is laid out as a NULL-bitmap (one bit per column) followed by the
//! concatenated non-NULL column values in schema order. Because values are packed, changing a
//! value's size (a VARCHAR growing, or a column flipping between NULL and non-NULL) moves the
//! bytes of every tuple stored below this one in the page; the page-level range operations
//! handle the shifting and keep all slots consistent.

use log::trace;

use crate::expressions::Literal;
use crate::relations::{ColumnType, Schema};
use crate::storage::buffer_manager::PageHandle;
use crate::storage::{FilePointer, PinError, Pinnable, Tuple, TupleError};

/// The value stored in a tuple's cached value-offset array when the column is NULL.
pub const NULL_OFFSET: u16 = 0;

/// Returns the number of bytes used to store the NULL-flags for a tuple with the given number
/// of columns.
pub fn get_null_flags_size(num_cols: usize) -> u16 {
    if num_cols > 0 {
        1 + (num_cols as u16 - 1) / 8
    } else {
        0
    }
}

/// Returns the storage size of a non-NULL value of the given column type, in bytes. The data
/// length is consulted only for variable-size types (`VARCHAR`), where it is the length of the
/// string being stored.
pub fn get_storage_size(col_type: ColumnType, data_length: u16) -> Result<u16, TupleError> {
    match col_type {
        ColumnType::TinyInt => Ok(1),
        ColumnType::SmallInt => Ok(2),
        ColumnType::Integer | ColumnType::Float | ColumnType::Date | ColumnType::Time => Ok(4),
        ColumnType::BigInt
        | ColumnType::Double
        | ColumnType::Timestamp
        | ColumnType::Numeric { .. } => Ok(8),
        // CHAR fields are fixed-size regardless of the stored string.
        ColumnType::Char { length } => Ok(length),
        // VARCHAR values carry a two-byte length prefix.
        ColumnType::VarChar { .. } => Ok(2 + data_length),
        // A two-byte page number plus a two-byte offset.
        ColumnType::FilePointer => Ok(4),
        ColumnType::Null => Err(TupleError::UnsupportedColumnType(col_type)),
    }
}

fn value_storage_size(col_type: ColumnType, value: &Literal) -> Result<u16, TupleError> {
    let data_length = match *value {
        Literal::String(ref s) => s.len() as u16,
        _ => 0,
    };
    get_storage_size(col_type, data_length)
}

/// Computes how much space a tuple would require if stored in a page with the specified
/// schema: the NULL-bitmap plus the sizes of all non-NULL values. Used to find a page with
/// enough room before inserting.
pub fn get_tuple_storage_size<T: Tuple + ?Sized>(
    schema: &Schema,
    tuple: &T,
) -> Result<u16, TupleError> {
    let mut storage_size = get_null_flags_size(schema.num_columns());
    for (col_idx, col_info) in schema.iter().enumerate() {
        let value = tuple.get_column_value(col_idx)?;
        if value != Literal::Null {
            storage_size += value_storage_size(col_info.column_type, &value)?;
        }
    }
    Ok(storage_size)
}

/// A tuple backed by the data in a buffer page. Reads and writes go straight through to the
/// page image; the page stays pinned for as long as the tuple is alive.
pub struct PageTuple {
    db_page: PageHandle,
    page_offset: u16,
    slot: u16,
    schema: Schema,
    /// Cached start offset of each column's value, or [`NULL_OFFSET`] for NULL columns.
    value_offsets: Vec<u16>,
    /// One past the end of the tuple's storage.
    end_offset: u16,
    pin_count: u32,
}

impl PageTuple {
    /// Constructs a tuple object backed by page data. The tuple pins the page until it is
    /// dropped.
    ///
    /// # Arguments
    /// * db_page - the page that holds the tuple
    /// * slot - the slot the tuple is stored under
    /// * page_offset - the offset of the tuple's data in the page
    /// * schema - the columns that appear within the tuple
    pub fn new(
        db_page: PageHandle,
        slot: u16,
        page_offset: u16,
        schema: Schema,
    ) -> Result<PageTuple, TupleError> {
        db_page.borrow_mut().pin();
        let mut result = PageTuple {
            db_page,
            page_offset,
            slot,
            schema,
            value_offsets: vec![],
            end_offset: 0,
            pin_count: 1,
        };
        result.compute_value_offsets()?;
        Ok(result)
    }

    /// The slot this tuple is stored under.
    pub fn slot(&self) -> u16 {
        self.slot
    }

    /// The page this tuple is stored on.
    pub fn page_no(&self) -> u32 {
        self.db_page.borrow().page_no
    }

    /// The file pointer naming this tuple's slot.
    pub fn file_pointer(&self) -> FilePointer {
        self.db_page.borrow().slot_file_pointer(self.slot)
    }

    /// The page offset where this tuple's data begins.
    pub fn get_page_offset(&self) -> u16 {
        self.page_offset
    }

    /// The total bytes of page storage this tuple currently occupies.
    pub fn storage_size(&self) -> u16 {
        self.end_offset - self.page_offset
    }

    /// A shared handle to the backing page.
    pub fn page_handle(&self) -> PageHandle {
        self.db_page.clone()
    }

    fn check_column_index(&self, col_index: usize) -> Result<(), TupleError> {
        if col_index < self.schema.num_columns() {
            Ok(())
        } else {
            Err(TupleError::InvalidColumnIndex(
                col_index,
                self.schema.num_columns(),
            ))
        }
    }

    /// The offset where the tuple's values start, past the NULL-flag bytes.
    fn get_data_start_offset(&self) -> u16 {
        self.page_offset + get_null_flags_size(self.schema.num_columns())
    }

    fn read_null_flag(&self, col_index: usize) -> Result<bool, TupleError> {
        let flag_offset = self.page_offset as usize + col_index / 8;
        let mask = 1u8 << (col_index % 8);
        let page = self.db_page.borrow();
        Ok(page.page_data[flag_offset] & mask != 0)
    }

    fn write_null_flag(&mut self, col_index: usize, is_null: bool) -> Result<(), TupleError> {
        let flag_offset = self.page_offset as usize + col_index / 8;
        let mask = 1u8 << (col_index % 8);
        let mut page = self.db_page.borrow_mut();
        let mut flags = page.page_data[flag_offset];
        flags = if is_null { flags | mask } else { flags & !mask };
        page.write_at_position(flag_offset, &[flags])
            .map_err(|e| TupleError::IOError(e.to_string()))?;
        Ok(())
    }

    /// Computes and caches the offset of each column value in the tuple, along with the
    /// tuple's end offset.
    fn compute_value_offsets(&mut self) -> Result<(), TupleError> {
        let num_cols = self.schema.num_columns();
        let mut offsets = vec![NULL_OFFSET; num_cols];
        let mut value_offset = self.get_data_start_offset();

        for i in 0..num_cols {
            if self.read_null_flag(i)? {
                offsets[i] = NULL_OFFSET;
            } else {
                offsets[i] = value_offset;
                let col_type = self.schema[i].column_type;
                let size = match col_type {
                    ColumnType::VarChar { .. } => {
                        // The stored size depends on the value; read the length prefix.
                        let mut page = self.db_page.borrow_mut();
                        let data_len = {
                            use byteorder::{BigEndian, ReadBytesExt};
                            use std::io::{Seek, SeekFrom};
                            page.seek(SeekFrom::Start(value_offset as u64))?;
                            page.read_u16::<BigEndian>()?
                        };
                        2 + data_len
                    }
                    _ => get_storage_size(col_type, 0)?,
                };
                value_offset += size;
            }
        }

        self.value_offsets = offsets;
        self.end_offset = value_offset;
        Ok(())
    }

    /// The current storage size of a column's value; zero when the column is NULL.
    fn current_value_size(&self, col_index: usize) -> Result<u16, TupleError> {
        if self.value_offsets[col_index] == NULL_OFFSET {
            return Ok(0);
        }
        // The next value (or the tuple's end) bounds this one.
        let start = self.value_offsets[col_index];
        let mut end = self.end_offset;
        for j in (col_index + 1)..self.schema.num_columns() {
            if self.value_offsets[j] != NULL_OFFSET {
                end = self.value_offsets[j];
                break;
            }
        }
        Ok(end - start)
    }

    /// The offset a value for the given column would occupy if the column is currently NULL:
    /// the offset of the next non-NULL value, or the tuple's end.
    fn value_insertion_point(&self, col_index: usize) -> u16 {
        for j in (col_index + 1)..self.schema.num_columns() {
            if self.value_offsets[j] != NULL_OFFSET {
                return self.value_offsets[j];
            }
        }
        self.end_offset
    }
}

impl Tuple for PageTuple {
    fn is_disk_backed(&self) -> bool {
        true
    }

    fn get_column_count(&self) -> usize {
        self.schema.num_columns()
    }

    fn is_null_value(&self, col_index: usize) -> Result<bool, TupleError> {
        self.check_column_index(col_index)?;
        Ok(self.value_offsets[col_index] == NULL_OFFSET)
    }

    fn get_column_value(&self, col_index: usize) -> Result<Literal, TupleError> {
        self.check_column_index(col_index)?;
        let offset = self.value_offsets[col_index];
        if offset == NULL_OFFSET {
            return Ok(Literal::Null);
        }
        let col_type = self.schema[col_index].column_type;
        self.db_page.borrow_mut().read_literal_at(offset, col_type)
    }

    fn set_column_value(&mut self, col_index: usize, value: Literal) -> Result<(), TupleError> {
        self.check_column_index(col_index)?;
        let col_type = self.schema[col_index].column_type;

        if value == Literal::Null {
            // Setting NULL reclaims the old value's bytes.
            let old_size = self.current_value_size(col_index)?;
            if old_size > 0 {
                let offset = self.value_offsets[col_index];
                self.db_page
                    .borrow_mut()
                    .delete_tuple_data_range(offset, old_size)?;
                self.page_offset += old_size;
            }
            self.write_null_flag(col_index, true)?;
            self.compute_value_offsets()?;
            return Ok(());
        }

        if !col_type.can_store_literal(&value) {
            return Err(TupleError::CannotStoreValue(col_type, value));
        }

        let old_size = self.current_value_size(col_index)?;
        let new_size = value_storage_size(col_type, &value)?;
        let was_null = self.value_offsets[col_index] == NULL_OFFSET;

        // Where the value currently starts, or would start if the column is NULL.
        let old_position = if was_null {
            self.value_insertion_point(col_index)
        } else {
            self.value_offsets[col_index]
        };
        let mut new_position = old_position;

        if new_size > old_size {
            let delta = new_size - old_size;
            let free = {
                let mut page = self.db_page.borrow_mut();
                page.get_free_space()?
            };
            if delta > free {
                return Err(TupleError::NoRoom {
                    needed: delta,
                    available: free,
                });
            }
            trace!(
                "Growing column {} by {} bytes in slot {}.",
                col_index,
                delta,
                self.slot
            );
            self.db_page
                .borrow_mut()
                .insert_tuple_data_range(old_position, delta)?;
            self.page_offset -= delta;
            new_position = old_position - delta;
        } else if new_size < old_size {
            let delta = old_size - new_size;
            trace!(
                "Shrinking column {} by {} bytes in slot {}.",
                col_index,
                delta,
                self.slot
            );
            self.db_page
                .borrow_mut()
                .delete_tuple_data_range(old_position, delta)?;
            self.page_offset += delta;
            new_position = old_position + delta;
        }

        self.write_null_flag(col_index, false)?;
        self.db_page
            .borrow_mut()
            .write_literal_at(new_position, col_type, &value)?;
        self.compute_value_offsets()?;
        Ok(())
    }
}

impl Pinnable for PageTuple {
    fn pin(&mut self) {
        self.db_page.borrow_mut().pin();
        self.pin_count += 1;
    }

    fn unpin(&mut self) -> Result<(), PinError> {
        if self.pin_count == 0 {
            return Err(PinError::PinCountNotPositive);
        }
        self.pin_count -= 1;
        self.db_page.borrow_mut().unpin()
    }

    fn get_pin_count(&self) -> u32 {
        self.pin_count
    }
}

impl Drop for PageTuple {
    fn drop(&mut self) {
        // Release any pins this tuple still holds on its page.
        let mut page = self.db_page.borrow_mut();
        while self.pin_count > 0 {
            let _ = page.unpin();
            self.pin_count -= 1;
        }
    }
}

/// Writes a brand-new tuple's data into freshly allocated page space, returning the bytes
/// consumed. The space at `offset` must already be zeroed (as
/// [`alloc_new_tuple`](crate::storage::DBPage::alloc_new_tuple) leaves it), so the NULL-bitmap
/// starts out clear.
pub fn store_new_tuple<T: Tuple + ?Sized>(
    page: &PageHandle,
    offset: u16,
    schema: &Schema,
    tuple: &T,
) -> Result<(), TupleError> {
    let mut cur_offset = offset + get_null_flags_size(schema.num_columns());

    for (col_idx, col_info) in schema.iter().enumerate() {
        let value = tuple.get_column_value(col_idx)?;
        let mut page = page.borrow_mut();
        if value == Literal::Null {
            let flag_offset = offset as usize + col_idx / 8;
            let mask = 1u8 << (col_idx % 8);
            let flags = page.page_data[flag_offset] | mask;
            page.write_at_position(flag_offset, &[flags])
                .map_err(|e| TupleError::IOError(e.to_string()))?;
        } else {
            let written = page.write_literal_at(cur_offset, col_info.column_type, &value)?;
            cur_offset += written;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::relations::ColumnInfo;
    use crate::storage::{DBPage, TupleLiteral};

    lazy_static::lazy_static! {
        static ref TEST_SCHEMA: Schema = Schema::with_columns(vec![
            ColumnInfo::with_table_name(ColumnType::Integer, "a", "t"),
            ColumnInfo::with_table_name(ColumnType::VarChar { length: 20 }, "b", "t"),
            ColumnInfo::with_table_name(ColumnType::Integer, "c", "t"),
        ])
        .unwrap();
    }

    fn test_schema() -> Schema {
        TEST_SCHEMA.clone()
    }

    /// Allocates a fresh page holding one tuple with the given values, returning the page and
    /// the tuple.
    fn stored_tuple(values: Vec<Literal>) -> (PageHandle, PageTuple) {
        let schema = test_schema();
        let mut page = DBPage::new(512, 1);
        page.init_new_page().unwrap();
        let page: PageHandle = Rc::new(RefCell::new(page));

        let literal = TupleLiteral::from_values(values);
        let size = get_tuple_storage_size(&schema, &literal).unwrap();
        let slot = page.borrow_mut().alloc_new_tuple(size).unwrap();
        let offset = page.borrow_mut().get_slot_value(slot).unwrap();
        store_new_tuple(&page, offset, &schema, &literal).unwrap();

        let tuple = PageTuple::new(page.clone(), slot, offset, schema).unwrap();
        (page, tuple)
    }

    #[test]
    fn test_null_flags_size() {
        assert_eq!(get_null_flags_size(0), 0);
        assert_eq!(get_null_flags_size(1), 1);
        assert_eq!(get_null_flags_size(8), 1);
        assert_eq!(get_null_flags_size(9), 2);
        assert_eq!(get_null_flags_size(16), 2);
        assert_eq!(get_null_flags_size(17), 3);
    }

    #[test]
    fn test_tuple_storage_size() {
        let schema = test_schema();
        let tuple =
            TupleLiteral::from_values(vec![Literal::Int(1), Literal::from("abc"), Literal::Int(2)]);
        // 1 byte of null flags + 4 + (2 + 3) + 4
        assert_eq!(get_tuple_storage_size(&schema, &tuple).unwrap(), 14);

        let with_null =
            TupleLiteral::from_values(vec![Literal::Int(1), Literal::Null, Literal::Int(2)]);
        assert_eq!(get_tuple_storage_size(&schema, &with_null).unwrap(), 9);
    }

    #[test]
    fn test_store_and_read_back() {
        let (_, tuple) = stored_tuple(vec![Literal::Int(7), Literal::from("hi"), Literal::Null]);

        assert_eq!(tuple.get_column_count(), 3);
        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(7)));
        assert_eq!(tuple.get_column_value(1), Ok(Literal::from("hi")));
        assert_eq!(tuple.get_column_value(2), Ok(Literal::Null));
        assert_eq!(tuple.is_null_value(2), Ok(true));
        assert!(tuple.is_disk_backed());
    }

    #[test]
    fn test_set_same_size_value() {
        let (_, mut tuple) =
            stored_tuple(vec![Literal::Int(7), Literal::from("hi"), Literal::Int(9)]);
        tuple.set_column_value(0, Literal::Int(42)).unwrap();
        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(42)));
        assert_eq!(tuple.get_column_value(1), Ok(Literal::from("hi")));
        assert_eq!(tuple.get_column_value(2), Ok(Literal::Int(9)));
    }

    #[test]
    fn test_grow_varchar_in_place() {
        let (page, mut tuple) =
            stored_tuple(vec![Literal::Int(7), Literal::from("hi"), Literal::Int(9)]);
        let size_before = tuple.storage_size();

        tuple
            .set_column_value(1, Literal::from("a longer value"))
            .unwrap();

        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(7)));
        assert_eq!(tuple.get_column_value(1), Ok(Literal::from("a longer value")));
        assert_eq!(tuple.get_column_value(2), Ok(Literal::Int(9)));
        assert_eq!(tuple.storage_size(), size_before + 12);

        // The page's slot tracks the moved tuple start.
        let offset = page.borrow_mut().get_slot_value(tuple.slot()).unwrap();
        assert_eq!(offset, tuple.get_page_offset());
    }

    #[test]
    fn test_shrink_varchar_in_place() {
        let (_, mut tuple) = stored_tuple(vec![
            Literal::Int(7),
            Literal::from("a longer value"),
            Literal::Int(9),
        ]);
        tuple.set_column_value(1, Literal::from("x")).unwrap();
        assert_eq!(tuple.get_column_value(1), Ok(Literal::from("x")));
        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(7)));
        assert_eq!(tuple.get_column_value(2), Ok(Literal::Int(9)));
    }

    #[test]
    fn test_null_transitions() {
        let (_, mut tuple) =
            stored_tuple(vec![Literal::Int(7), Literal::from("hi"), Literal::Int(9)]);

        tuple.set_column_value(1, Literal::Null).unwrap();
        assert_eq!(tuple.get_column_value(1), Ok(Literal::Null));
        assert_eq!(tuple.get_column_value(0), Ok(Literal::Int(7)));
        assert_eq!(tuple.get_column_value(2), Ok(Literal::Int(9)));

        tuple.set_column_value(1, Literal::from("back")).unwrap();
        assert_eq!(tuple.get_column_value(1), Ok(Literal::from("back")));
        assert_eq!(tuple.get_column_value(2), Ok(Literal::Int(9)));
    }

    #[test]
    fn test_update_without_room_fails() {
        let schema = Schema::with_columns(vec![ColumnInfo::with_table_name(
            ColumnType::VarChar { length: 600 },
            "a",
            "t",
        )])
        .unwrap();
        let mut page = DBPage::new(512, 1);
        page.init_new_page().unwrap();
        let page: PageHandle = Rc::new(RefCell::new(page));

        let literal = TupleLiteral::from_values(vec![Literal::from("small")]);
        let size = get_tuple_storage_size(&schema, &literal).unwrap();
        let slot = page.borrow_mut().alloc_new_tuple(size).unwrap();
        let offset = page.borrow_mut().get_slot_value(slot).unwrap();
        store_new_tuple(&page, offset, &schema, &literal).unwrap();

        // Fill the rest of the page so there's no room to grow.
        let free = page.borrow_mut().get_free_space().unwrap();
        page.borrow_mut().alloc_new_tuple(free - 2).unwrap();

        let mut tuple = PageTuple::new(page.clone(), slot, offset, schema).unwrap();
        let big = "x".repeat(500);
        let result = tuple.set_column_value(0, Literal::String(big));
        assert!(matches!(result, Err(TupleError::NoRoom { .. })));

        // The original value is untouched.
        assert_eq!(tuple.get_column_value(0), Ok(Literal::from("small")));
    }

    #[test]
    fn test_tuple_pins_page() {
        let (page, tuple) = stored_tuple(vec![Literal::Int(1), Literal::Null, Literal::Null]);
        assert_eq!(page.borrow().get_pin_count(), 1);
        drop(tuple);
        assert_eq!(page.borrow().get_pin_count(), 0);
    }
}
