//! This module contains the in-memory page image, including the slotted-page layout used by
//! heap tuple files.

use std::fmt;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, trace};

use crate::expressions::Literal;
use crate::relations::ColumnType;
use crate::storage::{FilePointer, PinError, Pinnable, ReadNanoDBExt, TupleError, WriteNanoDBExt};
use crate::transactions::LogSequenceNumber;

/// The offset in a data page where the number of slots in the slot table is stored.
const OFFSET_NUM_SLOTS: u64 = 0;

/// This offset-value is stored into a slot when it is empty. It is zero because that is where
/// the page's slot-count lives, which is never a valid tuple offset.
pub const EMPTY_SLOT: u16 = 0;

/// An error that can occur during operations on a `DBPage`.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The slot asked for is at an invalid position, as (num slots, slot requested).
    InvalidSlot(u16, u16),
    /// The page does not have enough space, as (bytes needed, bytes free).
    NotEnoughFreeSpace(u16, u16),
    /// The provided offset is not in the tuple-data portion of the page, as (offset, data start).
    OffsetNotInTuplePortion(u16, u16),
    /// Some I/O error occurred while accessing the page image.
    IOError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidSlot(num_slots, slot) => {
                write!(f, "valid slots are in range [0, {}); got {}", num_slots, slot)
            }
            Error::NotEnoughFreeSpace(needed, free) => write!(
                f,
                "requested {} bytes, but the page only has {} bytes free",
                needed, free
            ),
            Error::OffsetNotInTuplePortion(offset, data_start) => write!(
                f,
                "offset {} is not in the tuple-data portion of the page (data starts at {})",
                offset, data_start
            ),
            Error::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::IOError(e.to_string())
    }
}

impl From<Error> for TupleError {
    fn from(e: Error) -> TupleError {
        match e {
            Error::NotEnoughFreeSpace(needed, available) => {
                TupleError::NoRoom { needed, available }
            }
            other => TupleError::IOError(other.to_string()),
        }
    }
}

#[inline]
fn slot_offset(slot: u16) -> u64 {
    (1 + slot as u64) * 2
}

/// A single page in a database file. The page's (zero-based) index in the file, its dirty state,
/// and its pin count are tracked by the object.
///
/// The page records the pre-image of its data at the moment it is first dirtied; the
/// transaction manager diffs the pre-image against the current data to build physical WAL
/// records. For that to work, all mutation must flow through this type's methods, which mark
/// the page dirty before changing bytes.
///
/// Multibyte values are stored in big-endian format. Database pages provide no locking; that is
/// managed above this class.
pub struct DBPage {
    /// The page number of this page within its file.
    pub page_no: u32,
    pin_count: u32,
    dirty: bool,
    /// The raw page image.
    pub page_data: Vec<u8>,
    old_page_data: Option<Vec<u8>>,
    /// The LSN of the last WAL record that modified this page, used to enforce the
    /// WAL-before-flush rule.
    page_lsn: Option<LogSequenceNumber>,
    cur_position: u64,
}

impl DBPage {
    /// Instantiate a new zero-filled `DBPage` for the given page size and page number.
    pub fn new(page_size: u32, page_no: u32) -> DBPage {
        DBPage {
            page_no,
            pin_count: 0,
            dirty: false,
            page_data: vec![0; page_size as usize],
            old_page_data: None,
            page_lsn: None,
            cur_position: 0,
        }
    }

    /// Returns whether the page's data has been changed in memory.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Sets the dirty flag. Dirtying a clean page captures the pre-image of its data; cleaning
    /// a dirty page discards it.
    pub fn set_dirty(&mut self, is_dirty: bool) {
        if !self.dirty && is_dirty {
            self.old_page_data = Some(self.page_data.clone());
        } else if self.dirty && !is_dirty {
            self.old_page_data = None;
        }
        self.dirty = is_dirty;
    }

    /// Returns the page's pre-image, captured when the page was first dirtied.
    pub fn old_data(&self) -> Option<&[u8]> {
        self.old_page_data.as_deref()
    }

    /// Resets the pre-image to the page's current contents. The transaction manager calls this
    /// after logging a page update, so that the next update diffs against the logged state.
    pub fn sync_old_data(&mut self) {
        if self.dirty {
            self.old_page_data = Some(self.page_data.clone());
        }
    }

    /// Returns the LSN of the last WAL record that modified this page.
    pub fn get_page_lsn(&self) -> Option<LogSequenceNumber> {
        self.page_lsn
    }

    /// Records the LSN of a WAL record that modified this page.
    pub fn set_page_lsn(&mut self, lsn: LogSequenceNumber) {
        self.page_lsn = Some(lsn);
    }

    /// Read `buffer.len()` bytes starting at the given position in the page.
    pub fn read_at_position(&self, position: usize, buffer: &mut [u8]) -> Result<usize, Error> {
        if position + buffer.len() > self.page_data.len() {
            return Err(Error::IOError("read past end of page".into()));
        }
        buffer.copy_from_slice(&self.page_data[position..position + buffer.len()]);
        Ok(buffer.len())
    }

    /// Write the buffer's bytes starting at the given position in the page, dirtying it.
    pub fn write_at_position(&mut self, position: usize, buffer: &[u8]) -> Result<usize, Error> {
        if position + buffer.len() > self.page_data.len() {
            return Err(Error::IOError("write past end of page".into()));
        }
        self.set_dirty(true);
        self.page_data[position..position + buffer.len()].copy_from_slice(buffer);
        Ok(buffer.len())
    }

    /// Initialize a newly allocated data page: the slot count is set to zero, and the rest of
    /// the page is free space.
    pub fn init_new_page(&mut self) -> Result<(), Error> {
        self.set_num_slots(0)
    }

    /// Returns the number of slots in this data page. This is the page's current "capacity",
    /// since any of the slots could be [`EMPTY_SLOT`].
    pub fn get_num_slots(&mut self) -> Result<u16, Error> {
        self.seek(SeekFrom::Start(OFFSET_NUM_SLOTS))?;
        self.read_u16::<BigEndian>().map_err(Into::into)
    }

    fn set_num_slots(&mut self, num_slots: u16) -> Result<(), Error> {
        self.seek(SeekFrom::Start(OFFSET_NUM_SLOTS))?;
        self.write_u16::<BigEndian>(num_slots).map_err(Into::into)
    }

    /// Returns the value stored in the specified slot: the offset of the start of a tuple, or
    /// [`EMPTY_SLOT`].
    pub fn get_slot_value(&mut self, slot: u16) -> Result<u16, Error> {
        let num_slots = self.get_num_slots()?;
        if slot >= num_slots {
            return Err(Error::InvalidSlot(num_slots, slot));
        }
        self.seek(SeekFrom::Start(slot_offset(slot)))?;
        self.read_u16::<BigEndian>().map_err(Into::into)
    }

    /// Stores a value into the specified slot.
    pub fn set_slot_value(&mut self, slot: u16, value: u16) -> Result<(), Error> {
        let num_slots = self.get_num_slots()?;
        if slot >= num_slots {
            return Err(Error::InvalidSlot(num_slots, slot));
        }
        self.seek(SeekFrom::Start(slot_offset(slot)))?;
        self.write_u16::<BigEndian>(value).map_err(Into::into)
    }

    /// Translates a slot number into the [`FilePointer`] that names it.
    pub fn slot_file_pointer(&self, slot: u16) -> FilePointer {
        FilePointer::new(self.page_no as u16, slot_offset(slot) as u16)
    }

    /// Translates a file pointer's offset back into a slot number, if the offset actually lands
    /// on a slot entry within this page's slot table.
    pub fn offset_to_slot(&mut self, offset: u16) -> Result<u16, Error> {
        let num_slots = self.get_num_slots()?;
        if offset < 2 || offset % 2 != 0 {
            return Err(Error::InvalidSlot(num_slots, offset));
        }
        let slot = offset / 2 - 1;
        if slot >= num_slots {
            return Err(Error::InvalidSlot(num_slots, slot));
        }
        Ok(slot)
    }

    /// Returns the index one past the end of the slot table.
    fn get_slots_end_index(&mut self) -> Result<u16, Error> {
        self.get_num_slots().map(|n| slot_offset(n) as u16)
    }

    /// Returns the offset where tuple data starts: the smallest offset of any live tuple, or
    /// the page size when the page holds no tuples.
    pub fn get_tuple_data_start(&mut self) -> Result<u16, Error> {
        let num_slots = self.get_num_slots()?;
        let mut data_start = self.page_data.len() as u16;
        for slot in 0..num_slots {
            let value = self.get_slot_value(slot)?;
            if value != EMPTY_SLOT && value < data_start {
                data_start = value;
            }
        }
        Ok(data_start)
    }

    /// Returns the amount of free space in the page: the gap between the end of the slot table
    /// and the start of tuple data.
    pub fn get_free_space(&mut self) -> Result<u16, Error> {
        let data_start = self.get_tuple_data_start()?;
        let slots_end = self.get_slots_end_index()?;
        Ok(data_start - slots_end)
    }

    /// Update the data page so that it has space for a new tuple of the specified size. The new
    /// tuple is assigned a slot (reusing the lowest-indexed empty slot when one exists), and
    /// the space for the tuple is zero-initialized.
    ///
    /// Returns the slot index for the new tuple; the offset to the start of the allocated space
    /// is available via [`get_slot_value`](Self::get_slot_value).
    pub fn alloc_new_tuple(&mut self, len: u16) -> Result<u16, Error> {
        let mut space_needed = len;
        debug!("Allocating space for new {}-byte tuple.", len);

        let mut num_slots = self.get_num_slots()?;

        // Find the slot for the new tuple, tracking where the tuple should END: the offset of
        // the last live tuple before the chosen slot, or the page size when the slot table is
        // empty of live entries so far.
        let mut new_tuple_end = self.page_data.len() as u16;
        let mut slot = 0;
        while slot < num_slots {
            let cur_slot_value = self.get_slot_value(slot)?;
            if cur_slot_value == EMPTY_SLOT {
                break;
            }
            new_tuple_end = cur_slot_value;
            slot += 1;
        }

        if slot == num_slots {
            // No empty slot to reuse; a fresh slot entry takes two more bytes.
            space_needed += 2;
        }

        let free_space = self.get_free_space()?;
        if space_needed > free_space {
            return Err(Error::NotEnoughFreeSpace(space_needed, free_space));
        }

        if slot == num_slots {
            trace!("No empty slot available; adding a new slot.");
            num_slots += 1;
            self.set_num_slots(num_slots)?;
            self.set_slot_value(slot, EMPTY_SLOT)?;
        }

        trace!(
            "New tuple gets slot {}; total slots now {}.",
            slot,
            num_slots
        );

        // Open a gap of `len` bytes ending at new_tuple_end. This shifts all tuples below the
        // insertion point down and updates their slots.
        self.insert_tuple_data_range(new_tuple_end, len)?;

        // Point the slot at the start of the gap. This must happen after the range insert, or
        // the insert would shift this slot's value too.
        let new_tuple_start = new_tuple_end - len;
        self.set_slot_value(slot, new_tuple_start)?;

        Ok(slot)
    }

    fn move_data_range(&mut self, src_pos: usize, dest_pos: usize, length: usize) {
        self.set_dirty(true);
        self.page_data.copy_within(src_pos..src_pos + length, dest_pos);
    }

    fn set_data_range(&mut self, position: usize, length: usize, value: u8) {
        self.set_dirty(true);
        for byte in &mut self.page_data[position..position + length] {
            *byte = value;
        }
    }

    /// Opens a gap of `len` zeroed bytes ending at `offset` within the tuple-data region: the
    /// data in `[data_start, offset)` moves down by `len` bytes, and every live slot whose
    /// offset was below `offset` is adjusted.
    pub fn insert_tuple_data_range(&mut self, offset: u16, len: u16) -> Result<(), Error> {
        let tuple_data_start = self.get_tuple_data_start()?;

        if offset < tuple_data_start {
            return Err(Error::OffsetNotInTuplePortion(offset, tuple_data_start));
        }
        let free_space = self.get_free_space()?;
        if len > free_space {
            return Err(Error::NotEnoughFreeSpace(len, free_space));
        }

        if offset > tuple_data_start {
            self.move_data_range(
                tuple_data_start as usize,
                (tuple_data_start - len) as usize,
                (offset - tuple_data_start) as usize,
            );
        }

        self.set_data_range((offset - len) as usize, len as usize, 0);

        let num_slots = self.get_num_slots()?;
        for slot in 0..num_slots {
            let slot_value = self.get_slot_value(slot)?;
            if slot_value != EMPTY_SLOT && slot_value < offset {
                self.set_slot_value(slot, slot_value - len)?;
            }
        }

        Ok(())
    }

    /// Closes a gap of `len` bytes starting at `offset` within the tuple-data region: the data
    /// in `[data_start, offset)` moves up by `len` bytes, and every live slot whose offset was
    /// below `offset` is adjusted. Used when deleting a tuple or shrinking a value in place.
    pub fn delete_tuple_data_range(&mut self, offset: u16, len: u16) -> Result<(), Error> {
        let tuple_data_start = self.get_tuple_data_start()?;

        if offset < tuple_data_start {
            return Err(Error::OffsetNotInTuplePortion(offset, tuple_data_start));
        }

        if offset > tuple_data_start {
            self.move_data_range(
                tuple_data_start as usize,
                (tuple_data_start + len) as usize,
                (offset - tuple_data_start) as usize,
            );
        }

        // Zero the vacated region at the top of tuple data.
        self.set_data_range(tuple_data_start as usize, len as usize, 0);

        let num_slots = self.get_num_slots()?;
        for slot in 0..num_slots {
            let slot_value = self.get_slot_value(slot)?;
            if slot_value != EMPTY_SLOT && slot_value < offset {
                self.set_slot_value(slot, slot_value + len)?;
            }
        }

        Ok(())
    }

    /// Writes a non-NULL literal of the given column type at the given offset, returning the
    /// number of bytes written.
    pub fn write_literal_at(
        &mut self,
        offset: u16,
        col_type: ColumnType,
        value: &Literal,
    ) -> Result<u16, TupleError> {
        if !col_type.can_store_literal(value) {
            return Err(TupleError::CannotStoreValue(col_type, value.clone()));
        }

        self.seek(SeekFrom::Start(offset as u64))
            .map_err(|e| TupleError::IOError(e.to_string()))?;

        let written = match col_type {
            ColumnType::TinyInt => {
                self.write_i8(value.to_long().unwrap() as i8)?;
                1
            }
            ColumnType::SmallInt => {
                self.write_i16::<BigEndian>(value.to_long().unwrap() as i16)?;
                2
            }
            ColumnType::Integer | ColumnType::Date | ColumnType::Time => {
                self.write_i32::<BigEndian>(value.to_long().unwrap() as i32)?;
                4
            }
            ColumnType::BigInt | ColumnType::Timestamp => {
                self.write_i64::<BigEndian>(value.to_long().unwrap())?;
                8
            }
            ColumnType::Float => {
                self.write_f32::<BigEndian>(value.to_double().unwrap() as f32)?;
                4
            }
            ColumnType::Double | ColumnType::Numeric { .. } => {
                self.write_f64::<BigEndian>(value.to_double().unwrap())?;
                8
            }
            ColumnType::Char { length } => {
                self.write_fixed_size_string(value.as_string().unwrap(), length)?;
                length
            }
            ColumnType::VarChar { .. } => {
                let s = value.as_string().unwrap();
                let len = s.len() as u16;
                self.write_varchar65535(s)?;
                2 + len
            }
            ColumnType::FilePointer => {
                let fp = match *value {
                    Literal::FilePointer(fp) => fp,
                    _ => unreachable!(),
                };
                self.write_u16::<BigEndian>(fp.page_no)?;
                self.write_u16::<BigEndian>(fp.offset)?;
                4
            }
            ColumnType::Null => {
                return Err(TupleError::UnsupportedColumnType(col_type));
            }
        };
        Ok(written)
    }

    /// Reads a non-NULL literal of the given column type from the given offset.
    pub fn read_literal_at(
        &mut self,
        offset: u16,
        col_type: ColumnType,
    ) -> Result<Literal, TupleError> {
        self.seek(SeekFrom::Start(offset as u64))
            .map_err(|e| TupleError::IOError(e.to_string()))?;

        let value = match col_type {
            ColumnType::TinyInt => Literal::Int(self.read_i8()? as i32),
            ColumnType::SmallInt => Literal::Int(self.read_i16::<BigEndian>()? as i32),
            ColumnType::Integer | ColumnType::Date | ColumnType::Time => {
                Literal::Int(self.read_i32::<BigEndian>()?)
            }
            ColumnType::BigInt | ColumnType::Timestamp => {
                Literal::Long(self.read_i64::<BigEndian>()?)
            }
            ColumnType::Float => Literal::Float(self.read_f32::<BigEndian>()?),
            ColumnType::Double | ColumnType::Numeric { .. } => {
                Literal::Double(self.read_f64::<BigEndian>()?)
            }
            ColumnType::Char { length } => Literal::String(self.read_fixed_size_string(length)?),
            ColumnType::VarChar { .. } => Literal::String(self.read_varchar65535()?),
            ColumnType::FilePointer => {
                let page_no = self.read_u16::<BigEndian>()?;
                let slot_off = self.read_u16::<BigEndian>()?;
                Literal::FilePointer(FilePointer::new(page_no, slot_off))
            }
            ColumnType::Null => {
                return Err(TupleError::UnsupportedColumnType(col_type));
            }
        };
        Ok(value)
    }
}

impl Read for DBPage {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let position = self.cur_position as usize;
        match self.read_at_position(position, buffer) {
            Ok(bytes) => {
                self.cur_position += bytes as u64;
                Ok(bytes)
            }
            Err(_) => Err(ErrorKind::UnexpectedEof.into()),
        }
    }
}

impl Write for DBPage {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        let position = self.cur_position as usize;
        match self.write_at_position(position, buffer) {
            Ok(bytes) => {
                self.cur_position += bytes as u64;
                Ok(bytes)
            }
            Err(_) => Err(ErrorKind::WriteZero.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for DBPage {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos: i64 = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.cur_position as i64 + offset,
            SeekFrom::End(offset) => self.page_data.len() as i64 + offset,
        };
        if new_pos < 0 || new_pos > self.page_data.len() as i64 {
            return Err(ErrorKind::InvalidInput.into());
        }
        self.cur_position = new_pos as u64;
        Ok(self.cur_position)
    }
}

impl Pinnable for DBPage {
    fn pin(&mut self) {
        self.pin_count += 1;
    }

    fn unpin(&mut self) -> Result<(), PinError> {
        if self.pin_count == 0 {
            return Err(PinError::PinCountNotPositive);
        }
        self.pin_count -= 1;
        Ok(())
    }

    fn get_pin_count(&self) -> u32 {
        self.pin_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_SIZE: u32 = 512;

    fn data_page() -> DBPage {
        let mut page = DBPage::new(PAGE_SIZE, 1);
        page.init_new_page().unwrap();
        page
    }

    /// Sums the live tuple sizes on a page by measuring each slot's region.
    fn live_tuple_bytes(page: &mut DBPage) -> u32 {
        let data_start = page.get_tuple_data_start().unwrap() as u32;
        PAGE_SIZE - data_start
    }

    #[test]
    fn test_pinning() {
        let mut page = DBPage::new(PAGE_SIZE, 0);
        assert_eq!(page.unpin(), Err(PinError::PinCountNotPositive));
        page.pin();
        page.pin();
        assert_eq!(page.get_pin_count(), 2);
        assert_eq!(page.unpin(), Ok(()));
        assert_eq!(page.unpin(), Ok(()));
        assert_eq!(page.unpin(), Err(PinError::PinCountNotPositive));
    }

    #[test]
    fn test_dirty_captures_pre_image() {
        let mut page = data_page();
        page.set_dirty(false);
        assert!(page.old_data().is_none());

        page.write_at_position(100, &[1, 2, 3]).unwrap();
        assert!(page.is_dirty());
        let old = page.old_data().unwrap();
        assert_eq!(&old[100..103], &[0, 0, 0]);
        assert_eq!(&page.page_data[100..103], &[1, 2, 3]);
    }

    #[test]
    fn test_alloc_and_accounting_invariant() {
        let mut page = data_page();

        let slot0 = page.alloc_new_tuple(20).unwrap();
        let slot1 = page.alloc_new_tuple(30).unwrap();
        assert_eq!(slot0, 0);
        assert_eq!(slot1, 1);

        assert_eq!(page.get_slot_value(0).unwrap(), (PAGE_SIZE - 20) as u16);
        assert_eq!(page.get_slot_value(1).unwrap(), (PAGE_SIZE - 50) as u16);

        // live bytes + slot table (2 + 2*numSlots) + free space == page size
        let num_slots = page.get_num_slots().unwrap() as u32;
        let free = page.get_free_space().unwrap() as u32;
        assert_eq!(
            live_tuple_bytes(&mut page) + 2 + 2 * num_slots + free,
            PAGE_SIZE
        );
    }

    #[test]
    fn test_alloc_reuses_lowest_empty_slot() {
        let mut page = data_page();
        page.alloc_new_tuple(10).unwrap();
        page.alloc_new_tuple(10).unwrap();
        page.alloc_new_tuple(10).unwrap();

        // Delete the middle tuple: empty its slot and close the gap.
        let offset = page.get_slot_value(1).unwrap();
        page.set_slot_value(1, EMPTY_SLOT).unwrap();
        page.delete_tuple_data_range(offset, 10).unwrap();

        // The next allocation must take slot 1 again.
        let slot = page.alloc_new_tuple(8).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(page.get_num_slots().unwrap(), 3);
    }

    #[test]
    fn test_alloc_out_of_space() {
        let mut page = data_page();
        // Page has 512 - 2 = 510 free bytes; a 509-byte tuple needs 511 with its slot.
        assert!(matches!(
            page.alloc_new_tuple(509),
            Err(Error::NotEnoughFreeSpace(511, 510))
        ));
        // 508 bytes exactly fits with its slot entry.
        assert!(page.alloc_new_tuple(508).is_ok());
        assert_eq!(page.get_free_space().unwrap(), 0);
    }

    #[test]
    fn test_delete_range_adjusts_lower_slots() {
        let mut page = data_page();
        page.alloc_new_tuple(10).unwrap(); // slot 0 at 502
        page.alloc_new_tuple(20).unwrap(); // slot 1 at 482
        page.alloc_new_tuple(30).unwrap(); // slot 2 at 452

        // Delete slot 0's region; slots 1 and 2 shift up by 10.
        let offset = page.get_slot_value(0).unwrap();
        page.set_slot_value(0, EMPTY_SLOT).unwrap();
        page.delete_tuple_data_range(offset, 10).unwrap();

        assert_eq!(page.get_slot_value(1).unwrap(), 492);
        assert_eq!(page.get_slot_value(2).unwrap(), 462);
        assert_eq!(page.get_tuple_data_start().unwrap(), 462);
    }

    #[test]
    fn test_literal_round_trip() {
        let mut page = data_page();
        let cases: Vec<(ColumnType, Literal)> = vec![
            (ColumnType::TinyInt, Literal::Int(-5)),
            (ColumnType::SmallInt, Literal::Int(-1234)),
            (ColumnType::Integer, Literal::Int(123456)),
            (ColumnType::BigInt, Literal::Long(1 << 40)),
            (ColumnType::Float, Literal::Float(2.5)),
            (ColumnType::Double, Literal::Double(-0.125)),
            (ColumnType::Char { length: 6 }, Literal::from("fixed")),
            (ColumnType::VarChar { length: 20 }, Literal::from("variable")),
            (
                ColumnType::FilePointer,
                Literal::FilePointer(FilePointer::new(3, 44)),
            ),
        ];

        for (col_type, value) in cases {
            let written = page.write_literal_at(64, col_type, &value).unwrap();
            assert!(written > 0);
            let read_back = page.read_literal_at(64, col_type).unwrap();
            assert_eq!(read_back, value, "round trip failed for {}", col_type);
        }
    }

    #[test]
    fn test_write_rejects_mismatched_value() {
        let mut page = data_page();
        let result = page.write_literal_at(64, ColumnType::Integer, &Literal::from("nope"));
        assert!(matches!(result, Err(TupleError::CannotStoreValue(..))));

        // Over-length strings don't fit their declared type.
        let result = page.write_literal_at(
            64,
            ColumnType::VarChar { length: 3 },
            &Literal::from("too long"),
        );
        assert!(matches!(result, Err(TupleError::CannotStoreValue(..))));
    }
}
