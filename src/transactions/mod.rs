//! This module contains transaction support: write-ahead log records and files, per-session
//! transaction state, and crash recovery.

pub mod session;
pub mod transaction_manager;
pub mod wal;
pub mod wal_manager;

pub use self::session::{SessionState, TransactionState, NO_TRANSACTION_ID};
pub use self::transaction_manager::TransactionManager;
pub use self::wal::{
    compute_changed_segments, LogSequenceNumber, RedoSegment, UpdateSegment, WALRecord,
    WALRecordType,
};
pub use self::wal_manager::WalManager;

use std::fmt;
use std::io;

/// An error produced by the transaction subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// `startTransaction` was called while a transaction was already active.
    TransactionAlreadyActive(i32),
    /// Commit or rollback was requested with no active transaction.
    NoActiveTransaction,
    /// A WAL record failed to encode or decode, with a description of the corruption.
    MalformedRecord(String),
    /// The WAL or transaction-state file could not be read or written.
    IOError(String),
    /// The WAL file number space is exhausted.
    WalSpaceExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::TransactionAlreadyActive(id) => {
                write!(f, "transaction {} is already in progress", id)
            }
            Error::NoActiveTransaction => write!(f, "no transaction is in progress"),
            Error::MalformedRecord(ref why) => write!(f, "malformed WAL record: {}", why),
            Error::IOError(ref e) => write!(f, "an IO error occurred: {}", e),
            Error::WalSpaceExhausted => write!(f, "write-ahead log file numbers exhausted"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::IOError(e.to_string())
    }
}
