//! This module manages the write-ahead log files themselves: appending records, reading them
//! back, and forcing the log to durable storage.
//!
//! WAL files are named `wal-NNNNNN.log` and written as a byte stream; the first two bytes are
//! the standard file-type/page-size header, so records begin at
//! [`OFFSET_FIRST_RECORD`]. When an append would overflow the size cap, the log rolls to the
//! next file number.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::{debug, trace};

use crate::storage::dbfile::{encode_pagesize, DBFileType, MIN_PAGESIZE};
use crate::transactions::{Error, LogSequenceNumber, WALRecord};

/// Records begin right after the two file-header bytes.
pub const OFFSET_FIRST_RECORD: u32 = 2;

/// The log rolls to a new file when an append would push it past this size.
const MAX_WAL_FILE_SIZE: u32 = 4 * 1024 * 1024;

/// Returns the name of the WAL file with the given number.
pub fn wal_file_name(file_no: u16) -> String {
    format!("wal-{:06}.log", file_no)
}

/// The write-ahead log manager. See the module docs for the file layout.
pub struct WalManager {
    base_dir: PathBuf,
    next_lsn: LogSequenceNumber,
    last_forced: Option<LogSequenceNumber>,
    open_files: HashMap<u16, File>,
}

impl WalManager {
    /// Creates a WAL manager writing into the given data directory. The next-LSN starts at the
    /// beginning of file 0; recovery overwrites it with the persisted value.
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> WalManager {
        WalManager {
            base_dir: base_dir.into(),
            next_lsn: LogSequenceNumber::new(0, OFFSET_FIRST_RECORD),
            last_forced: None,
            open_files: HashMap::new(),
        }
    }

    /// Where the next record will be written.
    pub fn next_lsn(&self) -> LogSequenceNumber {
        self.next_lsn
    }

    /// Positions the log at the given next-LSN. Called during startup after reading the
    /// transaction-state file.
    pub fn set_next_lsn(&mut self, lsn: LogSequenceNumber) {
        self.next_lsn = lsn;
    }

    fn get_wal_file(&mut self, file_no: u16, create: bool) -> Result<&mut File, Error> {
        if !self.open_files.contains_key(&file_no) {
            let path = self.base_dir.join(wal_file_name(file_no));
            let file = if path.exists() {
                OpenOptions::new().read(true).write(true).open(&path)?
            } else if create {
                debug!("Creating write-ahead log file {}.", path.display());
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .open(&path)?;
                let header = [
                    DBFileType::WriteAheadLogFile as u8,
                    encode_pagesize(MIN_PAGESIZE).unwrap(),
                ];
                file.write_all(&header)?;
                file
            } else {
                return Err(Error::IOError(format!(
                    "write-ahead log file {} does not exist",
                    path.display()
                )));
            };
            self.open_files.insert(file_no, file);
        }
        Ok(self.open_files.get_mut(&file_no).unwrap())
    }

    /// Returns the current length in bytes of the given WAL file, or 0 if it does not exist.
    pub fn file_length(&self, file_no: u16) -> u64 {
        self.base_dir
            .join(wal_file_name(file_no))
            .metadata()
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Appends a record to the log, returning the LSN it was written at. The record is only
    /// buffered by the OS; call [`force_wal`](Self::force_wal) to make it durable.
    pub fn append_record(&mut self, record: &WALRecord) -> Result<LogSequenceNumber, Error> {
        let bytes = record.encode();

        let mut lsn = self.next_lsn;
        if lsn.offset > OFFSET_FIRST_RECORD
            && lsn.offset as u64 + bytes.len() as u64 > MAX_WAL_FILE_SIZE as u64
        {
            // Roll to the next log file.
            if lsn.log_file_no == u16::MAX {
                return Err(Error::WalSpaceExhausted);
            }
            lsn = LogSequenceNumber::new(lsn.log_file_no + 1, OFFSET_FIRST_RECORD);
            debug!("Rolling write-ahead log to file {}.", lsn.log_file_no);
        }

        let file = self.get_wal_file(lsn.log_file_no, true)?;
        file.seek(SeekFrom::Start(lsn.offset as u64))?;
        file.write_all(&bytes)?;

        trace!(
            "Wrote {:?} record of {} bytes at {}.",
            record.record_type(),
            bytes.len(),
            lsn
        );

        self.next_lsn = LogSequenceNumber::new(lsn.log_file_no, lsn.offset + bytes.len() as u32);
        Ok(lsn)
    }

    /// Reads the record stored at the given LSN, returning it along with its encoded length.
    pub fn read_record_at(
        &mut self,
        lsn: LogSequenceNumber,
    ) -> Result<(WALRecord, u32), Error> {
        let file = self.get_wal_file(lsn.log_file_no, false)?;
        file.seek(SeekFrom::Start(lsn.offset as u64))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Err(Error::MalformedRecord(format!("no record at {}", lsn)));
        }
        WALRecord::decode(&bytes)
    }

    /// Forces the log to durable storage, up to at least the given LSN. A no-op when the log
    /// has already been forced past it.
    pub fn force_wal(&mut self, up_to: LogSequenceNumber) -> Result<(), Error> {
        if let Some(forced) = self.last_forced {
            if forced >= up_to {
                return Ok(());
            }
        }

        debug!("Forcing write-ahead log to {}.", up_to);
        for (&file_no, file) in self.open_files.iter_mut() {
            if file_no <= up_to.log_file_no {
                file.flush()?;
                file.sync_all()?;
            }
        }

        self.last_forced = Some(up_to);
        Ok(())
    }

    /// Forces everything written so far.
    pub fn force_all(&mut self) -> Result<(), Error> {
        let up_to = self.next_lsn;
        self.force_wal(up_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    use crate::transactions::UpdateSegment;

    #[test]
    fn test_append_then_read_back() {
        let dir = TempDir::new("test_wal").unwrap();
        let mut wal = WalManager::new(dir.path());

        let start = WALRecord::StartTxn { txn_id: 1 };
        let update = WALRecord::UpdatePage {
            txn_id: 1,
            prev_lsn: LogSequenceNumber::new(0, OFFSET_FIRST_RECORD),
            filename: "t.tbl".into(),
            page_no: 1,
            segments: vec![UpdateSegment {
                offset: 8,
                before: vec![0, 0],
                after: vec![1, 2],
            }],
        };

        let lsn1 = wal.append_record(&start).unwrap();
        let lsn2 = wal.append_record(&update).unwrap();
        assert_eq!(lsn1, LogSequenceNumber::new(0, OFFSET_FIRST_RECORD));
        assert!(lsn2 > lsn1);

        wal.force_all().unwrap();

        let (read1, len1) = wal.read_record_at(lsn1).unwrap();
        assert_eq!(read1, start);
        assert_eq!(lsn2.offset, lsn1.offset + len1);

        let (read2, _) = wal.read_record_at(lsn2).unwrap();
        assert_eq!(read2, update);

        // The next-LSN points past the last record.
        let (_, len2) = wal.read_record_at(lsn2).unwrap();
        assert_eq!(wal.next_lsn(), LogSequenceNumber::new(0, lsn2.offset + len2));
    }

    #[test]
    fn test_wal_file_header() {
        let dir = TempDir::new("test_wal").unwrap();
        let mut wal = WalManager::new(dir.path());
        wal.append_record(&WALRecord::StartTxn { txn_id: 1 }).unwrap();
        wal.force_all().unwrap();

        let bytes = std::fs::read(dir.path().join(wal_file_name(0))).unwrap();
        assert_eq!(bytes[0], DBFileType::WriteAheadLogFile as u8);
        assert_eq!(bytes[1], 9);
    }

    #[test]
    fn test_file_naming() {
        assert_eq!(wal_file_name(0), "wal-000000.log");
        assert_eq!(wal_file_name(123), "wal-000123.log");
        assert_eq!(wal_file_name(65535), "wal-065535.log");
    }
}
