//! The top-level database context: configuration, the storage manager, the transaction
//! manager, and the session state, threaded explicitly through command execution.

use std::fmt;
use std::path::PathBuf;

use log::{info, warn};

use crate::storage::buffer_manager::{BufferManager, PageHandle, DEFAULT_PAGECACHE_SIZE};
use crate::storage::dbfile::DEFAULT_PAGESIZE;
use crate::storage::{table_manager, FileManager, StorageManager};
use crate::transactions::{self, SessionState, TransactionManager, WalManager};

/// An error produced while opening or closing the database.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An error from the storage layer.
    Storage(table_manager::Error),
    /// An error from the transaction subsystem.
    Transaction(transactions::Error),
    /// The data directory could not be used.
    BadDataDirectory(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Storage(ref e) => write!(f, "{}", e),
            Error::Transaction(ref e) => write!(f, "{}", e),
            Error::BadDataDirectory(ref why) => write!(f, "bad data directory: {}", why),
        }
    }
}

impl From<table_manager::Error> for Error {
    fn from(e: table_manager::Error) -> Error {
        Error::Storage(e)
    }
}

impl From<transactions::Error> for Error {
    fn from(e: transactions::Error) -> Error {
        Error::Transaction(e)
    }
}

/// Configuration for a database instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// The directory holding every database file.
    pub base_dir: PathBuf,
    /// The page size used for newly created tables.
    pub page_size: u32,
    /// The `nanodb.transactions` switch: enables the transaction manager and write-ahead log.
    /// On by default.
    pub enable_transactions: bool,
    /// The buffer pool capacity in bytes.
    pub buffer_pool_size: usize,
}

impl DatabaseConfig {
    /// A default configuration rooted at the given data directory.
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> DatabaseConfig {
        DatabaseConfig {
            base_dir: base_dir.into(),
            page_size: DEFAULT_PAGESIZE,
            enable_transactions: true,
            buffer_pool_size: DEFAULT_PAGECACHE_SIZE,
        }
    }

    /// Overrides the page size used for new tables.
    pub fn with_page_size(mut self, page_size: u32) -> DatabaseConfig {
        self.page_size = page_size;
        self
    }

    /// Enables or disables the transaction subsystem.
    pub fn with_transactions(mut self, enabled: bool) -> DatabaseConfig {
        self.enable_transactions = enabled;
        self
    }
}

/// A running database instance: the context object handed to every command's `execute` and
/// every plan node's `prepare`.
pub struct Database {
    /// The storage manager.
    pub storage: StorageManager,
    /// The transaction manager.
    pub txn_manager: TransactionManager,
    /// The (single) session's state.
    pub session: SessionState,
    config: DatabaseConfig,
}

impl Database {
    /// Opens a database over the configured data directory, running crash recovery if the
    /// transaction subsystem is enabled.
    pub fn open(config: DatabaseConfig) -> Result<Database, Error> {
        let file_manager = FileManager::with_directory(&config.base_dir)
            .map_err(|e| Error::BadDataDirectory(e.to_string()))?;
        let buffer_manager = BufferManager::new(config.buffer_pool_size);
        let wal_manager = if config.enable_transactions {
            Some(WalManager::new(&config.base_dir))
        } else {
            None
        };

        let mut storage =
            StorageManager::new(file_manager, buffer_manager, wal_manager, config.page_size);
        let mut txn_manager = TransactionManager::new();

        info!(
            "Opening database in {} (transactions {}).",
            config.base_dir.display(),
            if config.enable_transactions { "on" } else { "off" }
        );
        txn_manager.initialize(&mut storage)?;

        Ok(Database {
            storage,
            txn_manager,
            session: SessionState::new(1),
            config,
        })
    }

    /// The configuration the database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Ensures the session has an active transaction, starting an implicit one if needed.
    /// Returns true when an implicit transaction was started (and should be auto-committed when
    /// the statement completes).
    pub fn ensure_transaction(&mut self) -> Result<bool, Error> {
        if self.session.txn_state.is_txn_in_progress() {
            return Ok(false);
        }
        self.txn_manager
            .start_transaction(&mut self.session, false)?;
        Ok(true)
    }

    /// Starts a user transaction (`BEGIN`).
    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        self.txn_manager
            .start_transaction(&mut self.session, true)
            .map_err(Into::into)
    }

    /// Commits the session's transaction (`COMMIT`, or the end of an implicit transaction).
    pub fn commit_transaction(&mut self) -> Result<(), Error> {
        self.txn_manager
            .commit_transaction(&mut self.storage, &mut self.session)
            .map_err(Into::into)
    }

    /// Rolls back the session's transaction (`ROLLBACK`).
    pub fn rollback_transaction(&mut self) -> Result<(), Error> {
        self.txn_manager
            .rollback_transaction(&mut self.storage, &mut self.session)
            .map_err(Into::into)
    }

    /// Reports a page mutation to the transaction manager, which emits the WAL record for it.
    pub fn record_page_update(
        &mut self,
        filename: &str,
        handle: &PageHandle,
    ) -> Result<(), Error> {
        self.txn_manager
            .record_page_update(&mut self.storage, &mut self.session, filename, handle)
            .map_err(Into::into)
    }

    /// Closes the database cleanly: open work is rolled back, all dirty pages are flushed (WAL
    /// first), and the transaction state is persisted. Per-table failures are logged and do
    /// not prevent the remaining tables from being closed.
    ///
    /// Dropping a `Database` without calling `close` leaves unflushed work to be recovered
    /// from the WAL at the next open, which is exactly what the crash-recovery tests do.
    pub fn close(mut self) -> Result<(), Error> {
        if self.session.txn_state.is_txn_in_progress() {
            warn!("Session still has a transaction at shutdown; rolling it back.");
            if let Err(e) = self.rollback_transaction() {
                warn!("Rollback at shutdown failed: {}", e);
            }
        }

        let flush_result = self.storage.flush_all_pages();
        if let Err(ref e) = flush_result {
            warn!("Error while flushing pages at shutdown: {}", e);
        }

        if self.storage.wal_manager.is_some() {
            self.txn_manager.store_txn_state(&mut self.storage)?;
        }

        flush_result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    use crate::expressions::Literal;
    use crate::relations::{ColumnInfo, ColumnType, Schema, TableSchema};
    use crate::storage::table_manager::get_table_file_name;
    use crate::storage::{Tuple, TupleLiteral};

    fn config(dir: &TempDir) -> DatabaseConfig {
        DatabaseConfig::new(dir.path()).with_page_size(512)
    }

    fn int_table_schema(table: &str) -> TableSchema {
        TableSchema::from_schema(
            Schema::with_columns(vec![ColumnInfo::with_table_name(
                ColumnType::Integer,
                "a",
                table,
            )])
            .unwrap(),
        )
    }

    /// Inserts a row and reports the page mutation to the WAL.
    fn insert_row(db: &mut Database, table: &str, a: i32) {
        let tuple = TupleLiteral::from_values(vec![Literal::Int(a)]);
        let stored = db.storage.add_tuple(table, &tuple).unwrap();
        let handle = stored.page_handle();
        drop(stored);
        db.record_page_update(&get_table_file_name(table), &handle)
            .unwrap();
    }

    fn scan_values(db: &mut Database, table: &str) -> Vec<i32> {
        let mut values = Vec::new();
        let mut cur = db.storage.get_first_tuple(table).unwrap();
        while let Some(tuple) = cur {
            match tuple.get_column_value(0).unwrap() {
                Literal::Int(i) => values.push(i),
                other => panic!("unexpected value {}", other),
            }
            let fp = tuple.file_pointer();
            drop(tuple);
            cur = db.storage.get_next_tuple(table, fp).unwrap();
        }
        values
    }

    #[test]
    fn test_rollback_restores_pages() {
        let dir = TempDir::new("test_db").unwrap();
        let mut db = Database::open(config(&dir)).unwrap();

        db.ensure_transaction().unwrap();
        db.storage.create_table("t", int_table_schema("t")).unwrap();
        insert_row(&mut db, "t", 1);
        insert_row(&mut db, "t", 2);
        db.commit_transaction().unwrap();

        // Insert ten rows inside an explicit transaction, then roll it back.
        db.begin_transaction().unwrap();
        for i in 10..20 {
            insert_row(&mut db, "t", i);
        }
        assert_eq!(scan_values(&mut db, "t").len(), 12);
        db.rollback_transaction().unwrap();

        // Only the committed rows remain.
        assert_eq!(scan_values(&mut db, "t"), vec![1, 2]);

        // Restarting gives the same result.
        db.close().unwrap();
        let mut db = Database::open(config(&dir)).unwrap();
        db.storage.open_table("t").unwrap();
        assert_eq!(scan_values(&mut db, "t"), vec![1, 2]);
    }

    #[test]
    fn test_crash_recovery_redoes_committed_work() {
        let dir = TempDir::new("test_db").unwrap();

        {
            let mut db = Database::open(config(&dir)).unwrap();
            db.ensure_transaction().unwrap();
            db.storage.create_table("t", int_table_schema("t")).unwrap();
            insert_row(&mut db, "t", 7);
            insert_row(&mut db, "t", 8);
            insert_row(&mut db, "t", 9);
            db.commit_transaction().unwrap();

            // Simulate a crash: the buffer pool vanishes without flushing data pages. The
            // committed work exists only in the forced WAL.
            db.storage.discard_buffer_pool();
            drop(db);
        }

        let mut db = Database::open(config(&dir)).unwrap();
        db.storage.open_table("t").unwrap();
        assert_eq!(scan_values(&mut db, "t"), vec![7, 8, 9]);
    }

    #[test]
    fn test_crash_recovery_undoes_uncommitted_work() {
        let dir = TempDir::new("test_db").unwrap();

        {
            let mut db = Database::open(config(&dir)).unwrap();
            db.ensure_transaction().unwrap();
            db.storage.create_table("t", int_table_schema("t")).unwrap();
            insert_row(&mut db, "t", 1);
            db.commit_transaction().unwrap();

            // Start a transaction whose records reach the log but which never commits: the
            // eviction path forces the WAL when it flushes a dirty page.
            db.begin_transaction().unwrap();
            insert_row(&mut db, "t", 99);
            db.storage.flush_all_pages().unwrap();
            db.storage.discard_buffer_pool();
            drop(db);
        }

        let mut db = Database::open(config(&dir)).unwrap();
        db.storage.open_table("t").unwrap();
        assert_eq!(scan_values(&mut db, "t"), vec![1]);
    }

    #[test]
    fn test_transactions_disabled() {
        let dir = TempDir::new("test_db").unwrap();
        let mut db =
            Database::open(config(&dir).with_transactions(false)).unwrap();

        db.ensure_transaction().unwrap();
        db.storage.create_table("t", int_table_schema("t")).unwrap();
        insert_row(&mut db, "t", 5);
        db.commit_transaction().unwrap();
        assert_eq!(scan_values(&mut db, "t"), vec![5]);

        db.close().unwrap();
        assert!(!dir.path().join("txnstate.dat").exists());
        assert!(!dir.path().join("wal-000000.log").exists());
    }
}
