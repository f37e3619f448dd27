//! Write-ahead log record types and their on-disk encoding.
//!
//! Records are variable-length with all multibyte fields big-endian:
//!
//! - Byte 0: the record-type tag.
//! - 4-byte transaction ID.
//! - 8-byte previous LSN, threading the per-transaction undo chain (all zeros for
//!   `START_TXN`).
//! - For page updates: the file name (length-prefixed), the page number, then a sequence of
//!   (segment offset, segment length, before-image, after-image) entries terminated by the
//!   `0xFFFF` sentinel. Redo-only updates omit the before-images.
//! - A trailing 4-byte record length, allowing records to be stepped over backwards.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::storage::{ReadNanoDBExt, WriteNanoDBExt};
use crate::transactions::Error;

/// The sentinel segment-offset value that terminates an update record's segment list.
const SEGMENT_SENTINEL: u16 = 0xFFFF;

/// A log sequence number: the number of the WAL file a record lives in, plus the record's byte
/// offset within that file. LSNs order lexicographically, which is exactly the order records
/// were written in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogSequenceNumber {
    /// The WAL file number, in [0, 65535].
    pub log_file_no: u16,
    /// The byte offset of the record within the file.
    pub offset: u32,
}

impl LogSequenceNumber {
    /// Creates an LSN.
    pub fn new(log_file_no: u16, offset: u32) -> LogSequenceNumber {
        LogSequenceNumber {
            log_file_no,
            offset,
        }
    }
}

impl fmt::Display for LogSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LSN[{:06}:{:08}]", self.log_file_no, self.offset)
    }
}

/// The tags identifying each kind of WAL record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WALRecordType {
    /// A transaction produced its first update.
    StartTxn = 1,
    /// A physical page update with undo and redo images.
    UpdatePage = 2,
    /// A physical page update with only redo images; emitted while rolling back.
    UpdatePageRedoOnly = 3,
    /// A transaction committed.
    CommitTxn = 4,
    /// A transaction aborted.
    AbortTxn = 5,
}

impl WALRecordType {
    /// Looks up a record type from its stored tag.
    pub fn from_tag(byte: u8) -> Option<WALRecordType> {
        match byte {
            1 => Some(WALRecordType::StartTxn),
            2 => Some(WALRecordType::UpdatePage),
            3 => Some(WALRecordType::UpdatePageRedoOnly),
            4 => Some(WALRecordType::CommitTxn),
            5 => Some(WALRecordType::AbortTxn),
            _ => None,
        }
    }
}

/// One changed byte-range in an update record, with both images.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSegment {
    /// The offset of the changed range within the page.
    pub offset: u16,
    /// The bytes before the change. Always the same length as `after`.
    pub before: Vec<u8>,
    /// The bytes after the change.
    pub after: Vec<u8>,
}

/// One byte-range in a redo-only update record.
#[derive(Debug, Clone, PartialEq)]
pub struct RedoSegment {
    /// The offset of the range within the page.
    pub offset: u16,
    /// The bytes to (re)apply.
    pub data: Vec<u8>,
}

/// A decoded write-ahead log record.
#[derive(Debug, Clone, PartialEq)]
pub enum WALRecord {
    /// A transaction produced its first update.
    StartTxn {
        /// The transaction's ID.
        txn_id: i32,
    },
    /// A physical page update with undo and redo images.
    UpdatePage {
        /// The transaction's ID.
        txn_id: i32,
        /// The previous record in this transaction's undo chain.
        prev_lsn: LogSequenceNumber,
        /// The name of the modified file.
        filename: String,
        /// The modified page number.
        page_no: u16,
        /// The changed byte-ranges.
        segments: Vec<UpdateSegment>,
    },
    /// A redo-only page update, written while undoing.
    UpdatePageRedoOnly {
        /// The transaction's ID.
        txn_id: i32,
        /// The previous record in this transaction's undo chain.
        prev_lsn: LogSequenceNumber,
        /// The name of the modified file.
        filename: String,
        /// The modified page number.
        page_no: u16,
        /// The byte-ranges to reapply.
        segments: Vec<RedoSegment>,
    },
    /// A transaction committed.
    CommitTxn {
        /// The transaction's ID.
        txn_id: i32,
        /// The transaction's last record before this one.
        prev_lsn: LogSequenceNumber,
    },
    /// A transaction aborted.
    AbortTxn {
        /// The transaction's ID.
        txn_id: i32,
        /// The transaction's last record before this one.
        prev_lsn: LogSequenceNumber,
    },
}

/// The LSN encoded as all zeros, stored in records that have no predecessor.
const NULL_LSN: LogSequenceNumber = LogSequenceNumber {
    log_file_no: 0,
    offset: 0,
};

fn write_lsn(out: &mut Vec<u8>, lsn: LogSequenceNumber) {
    out.write_u32::<BigEndian>(lsn.log_file_no as u32).unwrap();
    out.write_u32::<BigEndian>(lsn.offset).unwrap();
}

fn read_lsn<R: Read>(input: &mut R) -> Result<LogSequenceNumber, Error> {
    let file_no = input.read_u32::<BigEndian>()?;
    let offset = input.read_u32::<BigEndian>()?;
    if file_no > u16::MAX as u32 {
        return Err(Error::MalformedRecord(format!(
            "LSN file number {} out of range",
            file_no
        )));
    }
    Ok(LogSequenceNumber::new(file_no as u16, offset))
}

impl WALRecord {
    /// The record's type tag.
    pub fn record_type(&self) -> WALRecordType {
        match *self {
            WALRecord::StartTxn { .. } => WALRecordType::StartTxn,
            WALRecord::UpdatePage { .. } => WALRecordType::UpdatePage,
            WALRecord::UpdatePageRedoOnly { .. } => WALRecordType::UpdatePageRedoOnly,
            WALRecord::CommitTxn { .. } => WALRecordType::CommitTxn,
            WALRecord::AbortTxn { .. } => WALRecordType::AbortTxn,
        }
    }

    /// The transaction the record belongs to.
    pub fn txn_id(&self) -> i32 {
        match *self {
            WALRecord::StartTxn { txn_id }
            | WALRecord::UpdatePage { txn_id, .. }
            | WALRecord::UpdatePageRedoOnly { txn_id, .. }
            | WALRecord::CommitTxn { txn_id, .. }
            | WALRecord::AbortTxn { txn_id, .. } => txn_id,
        }
    }

    /// The previous LSN in the record's undo chain; `None` for `START_TXN`.
    pub fn prev_lsn(&self) -> Option<LogSequenceNumber> {
        match *self {
            WALRecord::StartTxn { .. } => None,
            WALRecord::UpdatePage { prev_lsn, .. }
            | WALRecord::UpdatePageRedoOnly { prev_lsn, .. }
            | WALRecord::CommitTxn { prev_lsn, .. }
            | WALRecord::AbortTxn { prev_lsn, .. } => Some(prev_lsn),
        }
    }

    /// Encodes the record into its on-disk byte form, including the trailing length footer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        out.write_u8(self.record_type() as u8).unwrap();
        out.write_i32::<BigEndian>(self.txn_id()).unwrap();
        write_lsn(&mut out, self.prev_lsn().unwrap_or(NULL_LSN));

        match *self {
            WALRecord::UpdatePage {
                ref filename,
                page_no,
                ref segments,
                ..
            } => {
                out.write_varchar255(filename.clone()).unwrap();
                out.write_u16::<BigEndian>(page_no).unwrap();
                for seg in segments {
                    debug_assert_eq!(seg.before.len(), seg.after.len());
                    out.write_u16::<BigEndian>(seg.offset).unwrap();
                    out.write_u16::<BigEndian>(seg.after.len() as u16).unwrap();
                    out.extend_from_slice(&seg.before);
                    out.extend_from_slice(&seg.after);
                }
                out.write_u16::<BigEndian>(SEGMENT_SENTINEL).unwrap();
            }
            WALRecord::UpdatePageRedoOnly {
                ref filename,
                page_no,
                ref segments,
                ..
            } => {
                out.write_varchar255(filename.clone()).unwrap();
                out.write_u16::<BigEndian>(page_no).unwrap();
                for seg in segments {
                    out.write_u16::<BigEndian>(seg.offset).unwrap();
                    out.write_u16::<BigEndian>(seg.data.len() as u16).unwrap();
                    out.extend_from_slice(&seg.data);
                }
                out.write_u16::<BigEndian>(SEGMENT_SENTINEL).unwrap();
            }
            _ => {}
        }

        // The footer counts the entire record, footer included.
        let total = out.len() as u32 + 4;
        out.write_u32::<BigEndian>(total).unwrap();
        out
    }

    /// Decodes one record from the given bytes, returning the record and its encoded length.
    pub fn decode(bytes: &[u8]) -> Result<(WALRecord, u32), Error> {
        let mut input = Cursor::new(bytes);

        let tag = input.read_u8()?;
        let record_type = WALRecordType::from_tag(tag)
            .ok_or_else(|| Error::MalformedRecord(format!("unknown record tag {}", tag)))?;
        let txn_id = input.read_i32::<BigEndian>()?;
        let prev_lsn = read_lsn(&mut input)?;

        let record = match record_type {
            WALRecordType::StartTxn => WALRecord::StartTxn { txn_id },
            WALRecordType::CommitTxn => WALRecord::CommitTxn { txn_id, prev_lsn },
            WALRecordType::AbortTxn => WALRecord::AbortTxn { txn_id, prev_lsn },
            WALRecordType::UpdatePage => {
                let filename = input.read_varchar255()?;
                let page_no = input.read_u16::<BigEndian>()?;
                let mut segments = Vec::new();
                loop {
                    let offset = input.read_u16::<BigEndian>()?;
                    if offset == SEGMENT_SENTINEL {
                        break;
                    }
                    let len = input.read_u16::<BigEndian>()? as usize;
                    let mut before = vec![0u8; len];
                    input.read_exact(&mut before)?;
                    let mut after = vec![0u8; len];
                    input.read_exact(&mut after)?;
                    segments.push(UpdateSegment {
                        offset,
                        before,
                        after,
                    });
                }
                WALRecord::UpdatePage {
                    txn_id,
                    prev_lsn,
                    filename,
                    page_no,
                    segments,
                }
            }
            WALRecordType::UpdatePageRedoOnly => {
                let filename = input.read_varchar255()?;
                let page_no = input.read_u16::<BigEndian>()?;
                let mut segments = Vec::new();
                loop {
                    let offset = input.read_u16::<BigEndian>()?;
                    if offset == SEGMENT_SENTINEL {
                        break;
                    }
                    let len = input.read_u16::<BigEndian>()? as usize;
                    let mut data = vec![0u8; len];
                    input.read_exact(&mut data)?;
                    segments.push(RedoSegment { offset, data });
                }
                WALRecord::UpdatePageRedoOnly {
                    txn_id,
                    prev_lsn,
                    filename,
                    page_no,
                    segments,
                }
            }
        };

        let length = input.read_u32::<BigEndian>()?;
        let consumed = input.position() as u32;
        if length != consumed {
            return Err(Error::MalformedRecord(format!(
                "record footer says {} bytes but {} were decoded",
                length, consumed
            )));
        }
        Ok((record, consumed))
    }
}

/// Diffs a page's pre-image against its current data, producing the changed byte-runs as
/// update segments. Adjacent runs separated by fewer than four unchanged bytes are merged, since
/// a segment header costs four bytes.
pub fn compute_changed_segments(old: &[u8], new: &[u8]) -> Vec<UpdateSegment> {
    debug_assert_eq!(old.len(), new.len());
    const MERGE_GAP: usize = 4;

    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < old.len() {
        if old[i] != new[i] {
            let start = i;
            while i < old.len() && old[i] != new[i] {
                i += 1;
            }
            match runs.last_mut() {
                Some(&mut (_, ref mut end)) if start - *end < MERGE_GAP => *end = i,
                _ => runs.push((start, i)),
            }
        } else {
            i += 1;
        }
    }

    runs.into_iter()
        .map(|(start, end)| UpdateSegment {
            offset: start as u16,
            before: old[start..end].to_vec(),
            after: new[start..end].to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_ordering() {
        let a = LogSequenceNumber::new(0, 100);
        let b = LogSequenceNumber::new(0, 200);
        let c = LogSequenceNumber::new(1, 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_simple_record_round_trip() {
        let records = vec![
            WALRecord::StartTxn { txn_id: 7 },
            WALRecord::CommitTxn {
                txn_id: 7,
                prev_lsn: LogSequenceNumber::new(0, 42),
            },
            WALRecord::AbortTxn {
                txn_id: 9,
                prev_lsn: LogSequenceNumber::new(2, 77),
            },
        ];
        for record in records {
            let bytes = record.encode();
            let (decoded, len) = WALRecord::decode(&bytes).unwrap();
            assert_eq!(decoded, record);
            assert_eq!(len as usize, bytes.len());
        }
    }

    #[test]
    fn test_update_record_round_trip() {
        let record = WALRecord::UpdatePage {
            txn_id: 3,
            prev_lsn: LogSequenceNumber::new(0, 2),
            filename: "t.tbl".into(),
            page_no: 5,
            segments: vec![
                UpdateSegment {
                    offset: 10,
                    before: vec![0, 0, 0],
                    after: vec![1, 2, 3],
                },
                UpdateSegment {
                    offset: 100,
                    before: vec![9],
                    after: vec![8],
                },
            ],
        };
        let bytes = record.encode();
        let (decoded, len) = WALRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(len as usize, bytes.len());
    }

    #[test]
    fn test_redo_only_round_trip() {
        let record = WALRecord::UpdatePageRedoOnly {
            txn_id: 3,
            prev_lsn: LogSequenceNumber::new(0, 2),
            filename: "t.tbl".into(),
            page_no: 5,
            segments: vec![RedoSegment {
                offset: 64,
                data: vec![5, 6, 7, 8],
            }],
        };
        let bytes = record.encode();
        let (decoded, _) = WALRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(WALRecord::decode(&[0xCCu8; 32]).is_err());
    }

    #[test]
    fn test_changed_segments() {
        let old = vec![0u8; 32];
        let mut new = old.clone();
        new[4] = 1;
        new[5] = 2;
        new[20] = 3;

        let segments = compute_changed_segments(&old, &new);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].offset, 4);
        assert_eq!(segments[0].before, vec![0, 0]);
        assert_eq!(segments[0].after, vec![1, 2]);
        assert_eq!(segments[1].offset, 20);

        // Runs separated by a tiny gap merge into one segment.
        let mut new2 = old.clone();
        new2[4] = 1;
        new2[6] = 2;
        let segments = compute_changed_segments(&old, &new2);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].offset, 4);
        assert_eq!(segments[0].after, vec![1, 0, 2]);

        assert!(compute_changed_segments(&old, &old).is_empty());
    }
}
