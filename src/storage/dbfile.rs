//! This module contains utilities to handle paged database files.
//!
//! A `DBFile` provides page-level access to one file in the data directory. Files are created
//! and opened through the [`FileManager`](super::FileManager), and their pages are cached by the
//! [`BufferManager`](super::BufferManager).

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The minimum page size is 512 bytes.
pub const MIN_PAGESIZE: u32 = 512;

/// The maximum page size is 64K bytes.
pub const MAX_PAGESIZE: u32 = 65536;

/// The default page size is 8K bytes.
pub const DEFAULT_PAGESIZE: u32 = 8192;

/// An error in creating or using a `DBFile`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Error {
    /// The page size provided to the file is invalid.
    InvalidPageSize(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidPageSize(size) => {
                write!(f, "the page size {} is not valid for a DB file", size)
            }
        }
    }
}

/// Returns true if the specified page size is valid: a power of two within the minimum and
/// maximum page sizes.
pub fn is_valid_pagesize(page_size: u32) -> bool {
    (MIN_PAGESIZE..=MAX_PAGESIZE).contains(&page_size) && page_size.is_power_of_two()
}

/// Given a valid page size, returns the base-2 logarithm of the page size for storing in a data
/// file; e.g. 512 encodes to 9. This is the encoding stored in byte 1 of every data file.
pub fn encode_pagesize(page_size: u32) -> Result<u8, Error> {
    if !is_valid_pagesize(page_size) {
        return Err(Error::InvalidPageSize(page_size));
    }
    Ok(page_size.trailing_zeros() as u8)
}

/// Given the base-2 logarithm of a page size, returns the actual page size.
pub fn decode_pagesize(encoded: u8) -> Result<u32, Error> {
    if encoded >= 32 {
        return Err(Error::InvalidPageSize(0));
    }
    let page_size = 1u32 << encoded;
    if is_valid_pagesize(page_size) {
        Ok(page_size)
    } else {
        Err(Error::InvalidPageSize(page_size))
    }
}

/// The different types of data file that the database knows about. Each file type is assigned a
/// unique integer value which is stored as the very first byte of data files of that type, so a
/// file's type can be determined by examination.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum DBFileType {
    /// A heap tuple file, which supports variable-size tuples stored in no particular order.
    HeapTupleFile = 1,
    /// A B⁺-tree tuple file. The tag is reserved by the on-disk format; no B-tree implementation
    /// lives in this crate.
    BTreeTupleFile = 2,
    /// The transaction-state file used for write-ahead logging and recovery.
    TxnStateFile = 3,
    /// A write-ahead log file used for transaction processing and recovery.
    WriteAheadLogFile = 4,
}

impl DBFileType {
    /// Looks up a file type from its stored tag, if the tag is recognized.
    pub fn from_tag(byte: u8) -> Option<DBFileType> {
        match byte {
            1 => Some(DBFileType::HeapTupleFile),
            2 => Some(DBFileType::BTreeTupleFile),
            3 => Some(DBFileType::TxnStateFile),
            4 => Some(DBFileType::WriteAheadLogFile),
            _ => None,
        }
    }
}

/// Identifying information for a `DBFile`: its type, page size, and backing path.
#[derive(Clone, Debug, PartialEq)]
pub struct DBFileInfo {
    /// The storage type of the underlying `DBFile`.
    pub file_type: DBFileType,
    /// The page size of the data in the `DBFile`.
    pub page_size: u32,
    /// The path of the backing file, when there is one.
    pub path: Option<PathBuf>,
}

/// Page-level access to a database file. Many kinds of data are stored in this format: tuples in
/// a database table, recovery logs, and the transaction-state file.
///
/// For a file to be opened as a `DBFile`, its first page must start with:
///
/// - __Byte 0:__ the file type (one of [`DBFileType`])
/// - __Byte 1:__ the page size _p_ stored as log₂(_P_); the file's page size is _P_ = 2^_p_
#[derive(Debug)]
pub struct DBFile<F: Read + Seek + Write> {
    /// The DB file metadata, not dependent on the content.
    pub file_info: DBFileInfo,
    contents: F,
}

impl<F: Read + Seek + Write> std::ops::Deref for DBFile<F> {
    type Target = DBFileInfo;
    fn deref(&self) -> &Self::Target {
        &self.file_info
    }
}

impl<F: Read + Seek + Write> DBFile<F> {
    /// Creates a new `DBFile` wrapping some contents.
    ///
    /// # Errors
    /// Fails with `InvalidPageSize` if the page size is not acceptable.
    pub fn new(file_type: DBFileType, page_size: u32, contents: F) -> Result<DBFile<F>, Error> {
        if !is_valid_pagesize(page_size) {
            return Err(Error::InvalidPageSize(page_size));
        }
        Ok(DBFile {
            file_info: DBFileInfo {
                file_type,
                page_size,
                path: None,
            },
            contents,
        })
    }

    /// Creates a new `DBFile` with contents and a backing path.
    pub fn with_path<P: AsRef<Path>>(
        file_type: DBFileType,
        page_size: u32,
        contents: F,
        path: P,
    ) -> Result<DBFile<F>, Error> {
        let mut result = DBFile::new(file_type, page_size, contents)?;
        result.file_info.path = Some(path.as_ref().to_path_buf());
        Ok(result)
    }

    /// Retrieve the page size of the current `DBFile`.
    pub fn get_page_size(&self) -> u32 {
        self.page_size
    }

    /// Retrieve a reference to the contents of the current `DBFile`.
    pub fn get_contents(&self) -> &F {
        &self.contents
    }
}

impl DBFile<File> {
    /// Sets the length of the underlying file. Used when extending a file by a page, or
    /// truncating it.
    pub fn set_file_length(&mut self, size: u64) -> io::Result<()> {
        self.contents.set_len(size)
    }

    /// Returns the current length of the underlying file in bytes.
    pub fn file_length(&self) -> io::Result<u64> {
        self.contents.metadata().map(|m| m.len())
    }

    /// Forces any OS-buffered writes for this file to durable storage.
    pub fn sync(&mut self) -> io::Result<()> {
        self.contents.flush()?;
        self.contents.sync_all()
    }
}

impl<F: Read + Seek + Write> Read for DBFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.contents.read(buf)
    }
}

impl<F: Read + Seek + Write> Seek for DBFile<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.contents.seek(pos)
    }
}

impl<F: Read + Seek + Write> Write for DBFile<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.contents.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.contents.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_is_valid_pagesize() {
        // Too small or too large.
        assert!(!is_valid_pagesize(256));
        assert!(!is_valid_pagesize(131072));

        // Not powers of two.
        assert!(!is_valid_pagesize(511));
        assert!(!is_valid_pagesize(513));
        assert!(!is_valid_pagesize(6144));
        assert!(!is_valid_pagesize(65535));
        assert!(!is_valid_pagesize(10000));

        // Every power of two in range is valid.
        let mut size = MIN_PAGESIZE;
        while size <= MAX_PAGESIZE {
            assert!(is_valid_pagesize(size));
            size *= 2;
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut size = MIN_PAGESIZE;
        while size <= MAX_PAGESIZE {
            let encoded = encode_pagesize(size).unwrap();
            assert_eq!(decode_pagesize(encoded), Ok(size));
            size *= 2;
        }

        assert_eq!(encode_pagesize(512), Ok(9));
        assert_eq!(encode_pagesize(65536), Ok(16));
        assert_eq!(encode_pagesize(513), Err(Error::InvalidPageSize(513)));
        assert_eq!(encode_pagesize(32), Err(Error::InvalidPageSize(32)));

        assert_eq!(decode_pagesize(9), Ok(512));
        assert_eq!(decode_pagesize(8), Err(Error::InvalidPageSize(256)));
        assert_eq!(decode_pagesize(17), Err(Error::InvalidPageSize(131072)));
        assert!(decode_pagesize(40).is_err());
    }

    #[test]
    fn test_dbfile_creation() {
        let contents = Cursor::new(vec![0u8; 512]);
        let dbfile = DBFile::new(DBFileType::HeapTupleFile, 512, contents).unwrap();
        assert_eq!(dbfile.get_page_size(), 512);
        assert_eq!(dbfile.file_type, DBFileType::HeapTupleFile);

        let contents = Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            DBFile::new(DBFileType::HeapTupleFile, 1000, contents),
            Err(Error::InvalidPageSize(1000))
        ));
    }

    #[test]
    fn test_file_type_tags() {
        assert_eq!(DBFileType::from_tag(1), Some(DBFileType::HeapTupleFile));
        assert_eq!(DBFileType::from_tag(3), Some(DBFileType::TxnStateFile));
        assert_eq!(DBFileType::from_tag(4), Some(DBFileType::WriteAheadLogFile));
        assert_eq!(DBFileType::from_tag(0), None);
        assert_eq!(DBFileType::from_tag(99), None);
    }
}
