//! This module contains the storage layer: paged database files, the buffer manager, slotted
//! heap pages, tuple representations, and the heap table manager.

pub mod buffer_manager;
pub mod dbfile;
pub mod dbpage;
pub mod file_manager;
pub mod header_page;
pub mod page_tuple;
pub mod storage_manager;
pub mod table_manager;
pub mod tuple_literal;

use std::fmt;
use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub use self::buffer_manager::BufferManager;
pub use self::dbfile::{DBFile, DBFileInfo, DBFileType};
pub use self::dbpage::DBPage;
pub use self::file_manager::FileManager;
pub use self::page_tuple::PageTuple;
pub use self::storage_manager::StorageManager;
pub use self::table_manager::{TableManager, TableStats};
pub use self::tuple_literal::TupleLiteral;

use crate::expressions::Literal;
use crate::relations::ColumnType;

/// A (page number, in-page offset) pair identifying a tuple's slot entry within a heap file.
///
/// File pointers order lexicographically, which matches the physical scan order of a heap file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePointer {
    /// The page the slot lives on.
    pub page_no: u16,
    /// The byte offset of the slot entry within the page.
    pub offset: u16,
}

impl FilePointer {
    /// Creates a new file pointer.
    pub fn new(page_no: u16, offset: u16) -> FilePointer {
        FilePointer { page_no, offset }
    }
}

impl fmt::Display for FilePointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FP[{}:{}]", self.page_no, self.offset)
    }
}

/// An error that may occur while pinning or unpinning a page or tuple.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PinError {
    /// A caller attempted to unpin an object whose pin count was already zero.
    PinCountNotPositive,
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PinError::PinCountNotPositive => write!(f, "pin count is not positive"),
        }
    }
}

/// The basic "pin" and "unpin" operations that pinnable objects provide. An object's pin count
/// is simply a reference count; a pinned page cannot be evicted from the buffer cache.
pub trait Pinnable {
    /// Increase the pin count on the object by one.
    fn pin(&mut self);

    /// Decrease the pin count on the object by one. When the pin count reaches zero, the object
    /// can be released.
    fn unpin(&mut self) -> Result<(), PinError>;

    /// Returns the object's current pin count.
    fn get_pin_count(&self) -> u32;

    /// Returns true if the object is currently pinned.
    fn is_pinned(&self) -> bool {
        self.get_pin_count() > 0
    }
}

/// Errors that can occur while reading or writing a tuple's columns.
#[derive(Clone, Debug, PartialEq)]
pub enum TupleError {
    /// The column index provided is out of range, as (index, column count).
    InvalidColumnIndex(usize, usize),
    /// The column's type is not supported for storage.
    UnsupportedColumnType(ColumnType),
    /// The value cannot be stored in the column's type.
    CannotStoreValue(ColumnType, Literal),
    /// An in-place update would exceed the space available in the page.
    NoRoom {
        /// Bytes the new value encoding requires beyond the old one.
        needed: u16,
        /// Bytes actually available in the page.
        available: u16,
    },
    /// An I/O error occurred while accessing the backing page.
    IOError(String),
}

impl fmt::Display for TupleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TupleError::InvalidColumnIndex(idx, count) => {
                write!(f, "column index {} out of range [0, {})", idx, count)
            }
            TupleError::UnsupportedColumnType(t) => {
                write!(f, "column type {} is not supported for storage", t)
            }
            TupleError::CannotStoreValue(t, ref v) => {
                write!(f, "cannot store value {} in a column of type {}", v, t)
            }
            TupleError::NoRoom { needed, available } => write!(
                f,
                "not enough room to update tuple in place: need {} more bytes, {} available",
                needed, available
            ),
            TupleError::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
        }
    }
}

impl From<io::Error> for TupleError {
    fn from(e: io::Error) -> Self {
        TupleError::IOError(e.to_string())
    }
}

/// The operations that can be performed with a tuple. In relational database theory a tuple is
/// an ordered set of attribute-value pairs, but in this implementation the tuple's data and its
/// schema are kept completely separate: this interface is an index-accessed collection of
/// values, and the schema is represented separately by [`crate::relations::Schema`].
///
/// Different implementations store their data in different places: [`PageTuple`]s read and
/// write values straight out of a buffer page, while [`TupleLiteral`]s exist entirely in
/// memory.
pub trait Tuple {
    /// Returns true if this tuple is backed by a disk page that must be kept in memory as long
    /// as the tuple is in use. Plan nodes that hold onto tuples for a long time (e.g. for
    /// sorting or grouping) must make in-memory copies of disk-backed tuples.
    fn is_disk_backed(&self) -> bool;

    /// Returns a count of the number of columns in the tuple.
    fn get_column_count(&self) -> usize;

    /// Determine if the column at the given index is `NULL`.
    fn is_null_value(&self, col_index: usize) -> Result<bool, TupleError>;

    /// Returns the value of the column at the given index; `NULL` is returned as
    /// [`Literal::Null`].
    fn get_column_value(&self, col_index: usize) -> Result<Literal, TupleError>;

    /// Sets the value of the column at the given index; storing [`Literal::Null`] sets the
    /// column to `NULL`.
    fn set_column_value(&mut self, col_index: usize, value: Literal) -> Result<(), TupleError>;
}

/// Additional write operations for the storage layer's length-prefixed string encodings.
pub trait WriteNanoDBExt: WriteBytesExt {
    /// Write a string whose length fits in one byte (up to 255 bytes of UTF-8).
    fn write_varchar255<S: Into<String>>(&mut self, string: S) -> io::Result<()> {
        let bytes = string.into().into_bytes();
        self.write_u8(bytes.len() as u8)?;
        self.write_all(&bytes)?;
        Ok(())
    }

    /// Write a string whose length fits in two bytes (up to 65535 bytes of UTF-8).
    fn write_varchar65535<S: Into<String>>(&mut self, string: S) -> io::Result<()> {
        let bytes = string.into().into_bytes();
        self.write_u16::<BigEndian>(bytes.len() as u16)?;
        self.write_all(&bytes)?;
        Ok(())
    }

    /// Write a string into a fixed-size field, padding with NUL bytes. Strings exactly the
    /// field length are stored without a terminator, so embedded NUL characters are not
    /// supported by this encoding.
    fn write_fixed_size_string<S: Into<String>>(&mut self, string: S, length: u16) -> io::Result<()> {
        let bytes = string.into().into_bytes();
        if bytes.len() > length as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "string too long for fixed-size field",
            ));
        }
        self.write_all(&bytes)?;
        if bytes.len() < length as usize {
            self.write_all(&vec![0u8; length as usize - bytes.len()])?;
        }
        Ok(())
    }
}

impl<W: io::Write + ?Sized> WriteNanoDBExt for W {}

/// Additional read operations matching [`WriteNanoDBExt`].
pub trait ReadNanoDBExt: ReadBytesExt {
    /// Read a string stored with a one-byte length prefix.
    fn read_varchar255(&mut self) -> io::Result<String> {
        let len = self.read_u8()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid UTF-8 in string"))
    }

    /// Read a string stored with a two-byte length prefix.
    fn read_varchar65535(&mut self) -> io::Result<String> {
        let len = self.read_u16::<BigEndian>()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid UTF-8 in string"))
    }

    /// Read a fixed-size string field, trimming the NUL padding.
    fn read_fixed_size_string(&mut self, length: u16) -> io::Result<String> {
        let mut buf = vec![0u8; length as usize];
        self.read_exact(&mut buf)?;

        let actual_length = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        buf.truncate(actual_length);
        String::from_utf8(buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid UTF-8 in string"))
    }
}

impl<R: io::Read + ?Sized> ReadNanoDBExt for R {}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_file_pointer_ordering() {
        let a = FilePointer::new(1, 100);
        let b = FilePointer::new(1, 200);
        let c = FilePointer::new(2, 50);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_varchar255_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_varchar255("hello").unwrap();
        buf.set_position(0);
        assert_eq!(buf.read_varchar255().unwrap(), "hello");
    }

    #[test]
    fn test_fixed_size_string_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_fixed_size_string("abc", 8).unwrap();
        assert_eq!(buf.get_ref().len(), 8);
        buf.set_position(0);
        assert_eq!(buf.read_fixed_size_string(8).unwrap(), "abc");

        // A string exactly the field length has no padding.
        let mut buf = Cursor::new(Vec::new());
        buf.write_fixed_size_string("abcdefgh", 8).unwrap();
        buf.set_position(0);
        assert_eq!(buf.read_fixed_size_string(8).unwrap(), "abcdefgh");

        // Too-long strings are rejected.
        let mut buf = Cursor::new(Vec::new());
        assert!(buf.write_fixed_size_string("abcdefghi", 8).is_err());
    }
}
