//! The File Manager provides unbuffered, low-level operations for working with paged data
//! files. It knows nothing about the internal formats of the files, except that the first two
//! bytes of the first page specify the type and page size of the file.
//!
//! Page-level caching lives above this layer, in the
//! [`BufferManager`](super::BufferManager).

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::storage::dbfile::{self, decode_pagesize, encode_pagesize, DBFile, DBFileType};

/// An error produced by file-manager operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The base directory does not exist and could not be created, or is not a directory.
    InvalidBaseDir(PathBuf),
    /// The named database file already exists.
    FileExists(String),
    /// The named database file does not exist.
    FileDoesNotExist(String),
    /// A page read landed beyond the end of the file; the value is the requested page number.
    EndOfFile(u32),
    /// The first page's type tag was not recognized.
    InvalidFileType(u8),
    /// The file header carried an invalid page-size encoding.
    DBFileError(dbfile::Error),
    /// The buffer handed to a page read/write did not match the file's page size.
    IncorrectBufferSize(usize, u32),
    /// An I/O error occurred.
    IOError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidBaseDir(ref p) => {
                write!(f, "invalid base directory: {}", p.display())
            }
            Error::FileExists(ref name) => write!(f, "database file {} already exists", name),
            Error::FileDoesNotExist(ref name) => {
                write!(f, "database file {} does not exist", name)
            }
            Error::EndOfFile(page_no) => {
                write!(f, "page {} is past the end of the file", page_no)
            }
            Error::InvalidFileType(tag) => write!(f, "unrecognized file-type tag {}", tag),
            Error::DBFileError(ref e) => write!(f, "{}", e),
            Error::IncorrectBufferSize(got, want) => {
                write!(f, "page buffer is {} bytes; page size is {}", got, want)
            }
            Error::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
        }
    }
}

impl From<dbfile::Error> for Error {
    fn from(e: dbfile::Error) -> Error {
        Error::DBFileError(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::IOError(e.to_string())
    }
}

/// This helper function calculates the file-position of the specified page.
fn get_page_start(page_size: u32, page_no: u32) -> u64 {
    (page_no as u64) * (page_size as u64)
}

/// Saves a page image to the DB file. Note that the data might not actually reach disk until a
/// sync operation is performed.
///
/// # Errors
/// Fails if the buffer length does not match the file's page size, or on an I/O error.
pub fn save_page(dbfile: &mut DBFile<File>, page_no: u32, buffer: &[u8]) -> Result<(), Error> {
    if buffer.len() as u32 != dbfile.get_page_size() {
        return Err(Error::IncorrectBufferSize(
            buffer.len(),
            dbfile.get_page_size(),
        ));
    }

    let page_start = get_page_start(dbfile.get_page_size(), page_no);
    dbfile.seek(SeekFrom::Start(page_start))?;
    dbfile.write_all(buffer)?;
    Ok(())
}

/// Loads a page from the underlying data file into the buffer. The `create` flag controls what
/// happens when the requested page is past the end of the file: with `create` the file is
/// extended by exactly enough zeroed pages to contain it, and without it the read fails with an
/// end-of-file error.
///
/// This function does no caching whatsoever.
pub fn load_page(
    dbfile: &mut DBFile<File>,
    page_no: u32,
    buffer: &mut [u8],
    create: bool,
) -> Result<(), Error> {
    let page_size = dbfile.get_page_size();
    if buffer.len() as u32 != page_size {
        return Err(Error::IncorrectBufferSize(buffer.len(), page_size));
    }

    let page_start = get_page_start(page_size, page_no);
    let file_len = dbfile.file_length()?;

    if page_start + page_size as u64 > file_len {
        if !create {
            return Err(Error::EndOfFile(page_no));
        }
        debug!(
            "Requested page {} doesn't yet exist in file {:?}; extending.",
            page_no, dbfile.path
        );
        dbfile.set_file_length(page_start + page_size as u64)?;
        buffer.fill(0);
        return Ok(());
    }

    dbfile.seek(SeekFrom::Start(page_start))?;
    dbfile.read_exact(buffer)?;
    Ok(())
}

/// The file manager, rooted at a single data directory holding all of the database's files.
#[derive(Debug, Clone, PartialEq)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    /// Creates a file manager over the given directory, creating the directory if it does not
    /// yet exist.
    pub fn with_directory<P: AsRef<Path>>(base_dir: P) -> Result<FileManager, Error> {
        let base_dir = base_dir.as_ref();
        if !base_dir.exists() {
            fs::create_dir_all(base_dir)
                .map_err(|_| Error::InvalidBaseDir(base_dir.to_path_buf()))?;
        } else if !base_dir.is_dir() {
            return Err(Error::InvalidBaseDir(base_dir.to_path_buf()));
        }
        Ok(FileManager {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// The directory this file manager works in.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Checks if a database file exists.
    pub fn dbfile_exists<P: AsRef<Path>>(&self, filename: P) -> bool {
        self.base_dir.join(filename).exists()
    }

    /// Removes a database file from the data directory.
    pub fn remove_dbfile<P: AsRef<Path>>(&self, filename: P) -> Result<(), Error> {
        let name = filename.as_ref().to_string_lossy().into_owned();
        if !self.dbfile_exists(&filename) {
            return Err(Error::FileDoesNotExist(name));
        }
        fs::remove_file(self.base_dir.join(filename)).map_err(Into::into)
    }

    /// Creates a new database file in the data directory, writing the file-type tag and
    /// page-size encoding into the first two bytes of a zeroed first page.
    ///
    /// # Errors
    /// Fails if the file already exists, the page size is invalid, or creation fails.
    pub fn create_dbfile<P: AsRef<Path>>(
        &self,
        filename: P,
        file_type: DBFileType,
        page_size: u32,
    ) -> Result<DBFile<File>, Error> {
        let full_path = self.base_dir.join(&filename);
        let name = filename.as_ref().to_string_lossy().into_owned();

        if full_path.exists() {
            return Err(Error::FileExists(name));
        }

        let encoded = encode_pagesize(page_size)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&full_path)?;

        let mut db_file = DBFile::with_path(file_type, page_size, file, &full_path)?;

        let mut buffer = vec![0u8; page_size as usize];
        buffer[0] = file_type as u8;
        buffer[1] = encoded;

        debug!("Creating new database file {}.", full_path.display());
        save_page(&mut db_file, 0, &buffer)?;
        db_file.flush()?;

        Ok(db_file)
    }

    /// Opens a database file, reading its type and page size from the first two bytes.
    ///
    /// # Errors
    /// Fails if the file does not exist or its header is corrupt.
    pub fn open_dbfile<P: AsRef<Path>>(&self, filename: P) -> Result<DBFile<File>, Error> {
        let full_path = self.base_dir.join(&filename);
        let name = filename.as_ref().to_string_lossy().into_owned();

        if !full_path.exists() {
            return Err(Error::FileDoesNotExist(name));
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&full_path)?;

        let mut header = [0u8; 2];
        file.read_exact(&mut header)?;

        let file_type =
            DBFileType::from_tag(header[0]).ok_or(Error::InvalidFileType(header[0]))?;
        let page_size = decode_pagesize(header[1])?;

        debug!(
            "Opened database file {}; type {:?}, page size {}.",
            full_path.display(),
            file_type,
            page_size
        );

        DBFile::with_path(file_type, page_size, file, &full_path).map_err(Into::into)
    }

    /// Forces any OS-buffered writes for the given file to durable storage.
    pub fn sync_dbfile(&self, dbfile: &mut DBFile<File>) -> Result<(), Error> {
        dbfile.sync().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_create_then_open() {
        let dir = TempDir::new("test_dbfiles").unwrap();
        let file_manager = FileManager::with_directory(dir.path()).unwrap();

        let created = file_manager
            .create_dbfile("foo.tbl", DBFileType::HeapTupleFile, 512)
            .unwrap();
        assert_eq!(created.get_page_size(), 512);

        // Creating again fails.
        assert_eq!(
            file_manager
                .create_dbfile("foo.tbl", DBFileType::HeapTupleFile, 512)
                .err(),
            Some(Error::FileExists("foo.tbl".into()))
        );

        let opened = file_manager.open_dbfile("foo.tbl").unwrap();
        assert_eq!(opened.file_type, DBFileType::HeapTupleFile);
        assert_eq!(opened.get_page_size(), 512);

        assert_eq!(
            file_manager.open_dbfile("missing.tbl").err(),
            Some(Error::FileDoesNotExist("missing.tbl".into()))
        );
    }

    #[test]
    fn test_save_and_load_pages() {
        let dir = TempDir::new("test_dbfiles").unwrap();
        let file_manager = FileManager::with_directory(dir.path()).unwrap();
        let mut dbfile = file_manager
            .create_dbfile("foo.tbl", DBFileType::HeapTupleFile, 512)
            .unwrap();

        let page1 = [0xAC; 512];
        save_page(&mut dbfile, 1, &page1).unwrap();

        let mut buffer = [0u8; 512];
        load_page(&mut dbfile, 1, &mut buffer, false).unwrap();
        assert_eq!(&buffer[..], &page1[..]);

        // Reading past EOF without `create` fails.
        assert_eq!(
            load_page(&mut dbfile, 9, &mut buffer, false).err(),
            Some(Error::EndOfFile(9))
        );

        // With `create`, the file is extended and a zeroed page comes back.
        load_page(&mut dbfile, 2, &mut buffer, true).unwrap();
        assert_eq!(buffer, [0u8; 512]);
        assert_eq!(dbfile.file_length().unwrap(), 3 * 512);

        // A wrong-size buffer is rejected.
        let mut small = [0u8; 256];
        assert!(matches!(
            load_page(&mut dbfile, 0, &mut small, false),
            Err(Error::IncorrectBufferSize(256, 512))
        ));
    }

    #[test]
    fn test_remove_dbfile() {
        let dir = TempDir::new("test_dbfiles").unwrap();
        let file_manager = FileManager::with_directory(dir.path()).unwrap();
        file_manager
            .create_dbfile("foo.tbl", DBFileType::HeapTupleFile, 512)
            .unwrap();

        assert!(file_manager.dbfile_exists("foo.tbl"));
        file_manager.remove_dbfile("foo.tbl").unwrap();
        assert!(!file_manager.dbfile_exists("foo.tbl"));
        assert!(file_manager.remove_dbfile("foo.tbl").is_err());
    }

    #[test]
    fn test_open_rejects_corrupt_header() {
        let dir = TempDir::new("test_dbfiles").unwrap();
        let file_manager = FileManager::with_directory(dir.path()).unwrap();

        let path = dir.path().join("bad.tbl");
        std::fs::write(&path, [0xEEu8, 0x09]).unwrap();
        assert_eq!(
            file_manager.open_dbfile("bad.tbl").err(),
            Some(Error::InvalidFileType(0xEE))
        );

        let path = dir.path().join("badsize.tbl");
        std::fs::write(&path, [0x01u8, 0x03]).unwrap();
        assert!(matches!(
            file_manager.open_dbfile("badsize.tbl"),
            Err(Error::DBFileError(dbfile::Error::InvalidPageSize(8)))
        ));
    }
}
