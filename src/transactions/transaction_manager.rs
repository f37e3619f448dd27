//! The transaction manager: per-session transaction lifecycle, WAL record emission for page
//! updates, rollback, and crash recovery.
//!
//! Recovery is ARIES-lite over physical byte-range logging. The redo pass scans forward from
//! the persisted first-LSN, reapplying every update's after-images and collecting the set of
//! transactions with a `START_TXN` but no matching `COMMIT_TXN`/`ABORT_TXN`. The undo pass then
//! walks each such loser's undo chain backwards, restoring before-images and emitting
//! redo-only compensation records so the undo itself survives a second crash. Recovery ends
//! with a checkpoint: all pages are flushed, the log is forced, and the first-LSN advances to
//! the end of the log.
//!
//! The redo scan reads to the end of the valid log rather than stopping at the persisted
//! next-LSN: eviction may flush pages of an uncommitted transaction (after forcing the WAL),
//! so records past the persisted boundary must still be discovered for their transactions to
//! be undone. A record that fails to decode past that boundary marks the end of the log; one
//! that fails before it is genuine corruption.

use std::collections::HashMap;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use crate::storage::buffer_manager::PageHandle;
use crate::storage::dbfile::DBFileType;
use crate::storage::{file_manager, StorageManager};
use crate::transactions::wal_manager::OFFSET_FIRST_RECORD;
use crate::transactions::{
    compute_changed_segments, Error, LogSequenceNumber, RedoSegment, SessionState, WALRecord,
};

/// The name of the transaction-state file.
pub const TXN_STATE_FILENAME: &str = "txnstate.dat";

/// The page size used for the transaction-state file.
const TXN_STATE_PAGESIZE: u32 = 512;

// Field offsets within the transaction-state file's first page.
const OFFSET_NEXT_TXN_ID: usize = 2;
const OFFSET_FIRST_LSN_FILE: usize = 6;
const OFFSET_FIRST_LSN_OFFSET: usize = 8;
const OFFSET_NEXT_LSN_FILE: usize = 12;
const OFFSET_NEXT_LSN_OFFSET: usize = 14;

/// The transaction manager. One instance serves the whole database; per-session state lives in
/// [`SessionState`].
pub struct TransactionManager {
    next_txn_id: i32,
    first_lsn: LogSequenceNumber,
}

/// Borrows the WAL manager out of the storage manager, failing when transactions are off.
fn wal_of(storage: &mut StorageManager) -> Result<&mut crate::transactions::WalManager, Error> {
    storage
        .wal_manager
        .as_mut()
        .ok_or_else(|| Error::IOError("the transaction subsystem is disabled".into()))
}

impl Default for TransactionManager {
    fn default() -> Self {
        TransactionManager::new()
    }
}

impl TransactionManager {
    /// Creates a transaction manager with default state; [`initialize`](Self::initialize)
    /// loads the persisted state and runs recovery.
    pub fn new() -> TransactionManager {
        TransactionManager {
            next_txn_id: 1,
            first_lsn: LogSequenceNumber::new(0, OFFSET_FIRST_RECORD),
        }
    }

    /// The LSN recovery will scan from at the next startup.
    pub fn first_lsn(&self) -> LogSequenceNumber {
        self.first_lsn
    }

    /// Starts a transaction in the given session, assigning it the next transaction ID. No WAL
    /// record is written until the transaction first modifies a page.
    ///
    /// # Errors
    /// Fails if the session already has a transaction in progress.
    pub fn start_transaction(
        &mut self,
        session: &mut SessionState,
        user_started: bool,
    ) -> Result<(), Error> {
        if session.txn_state.is_txn_in_progress() {
            return Err(Error::TransactionAlreadyActive(
                session.txn_state.transaction_id,
            ));
        }

        let txn_id = self.next_txn_id;
        self.next_txn_id += 1;

        session.txn_state.transaction_id = txn_id;
        session.txn_state.user_started_txn = user_started;
        session.txn_state.last_lsn = None;
        session.txn_state.logged_txn_start = false;

        debug!(
            "Started {} transaction {}.",
            if user_started { "user" } else { "implicit" },
            txn_id
        );
        Ok(())
    }

    /// Records a page modification in the WAL: the page's pre-image is diffed against its
    /// current contents, and an update record with both images is appended. The session's
    /// `START_TXN` record is written lazily, before the first update.
    ///
    /// The page's LSN is advanced to the new record, and its pre-image is re-synced so the
    /// next modification diffs against the logged state. A no-op when the transaction
    /// subsystem is disabled or the page has no changes.
    pub fn record_page_update(
        &mut self,
        storage: &mut StorageManager,
        session: &mut SessionState,
        filename: &str,
        handle: &PageHandle,
    ) -> Result<(), Error> {
        let wal = match storage.wal_manager.as_mut() {
            Some(wal) => wal,
            None => return Ok(()),
        };

        if !session.txn_state.is_txn_in_progress() {
            return Err(Error::NoActiveTransaction);
        }
        let txn_id = session.txn_state.transaction_id;

        let mut page = handle.borrow_mut();
        if !page.is_dirty() {
            return Ok(());
        }

        let segments = match page.old_data() {
            Some(old) => compute_changed_segments(old, &page.page_data),
            None => return Ok(()),
        };
        if segments.is_empty() {
            return Ok(());
        }

        if !session.txn_state.logged_txn_start {
            let lsn = wal.append_record(&WALRecord::StartTxn { txn_id })?;
            session.txn_state.last_lsn = Some(lsn);
            session.txn_state.logged_txn_start = true;
        }

        let record = WALRecord::UpdatePage {
            txn_id,
            prev_lsn: session.txn_state.last_lsn.unwrap(),
            filename: filename.to_string(),
            page_no: page.page_no as u16,
            segments,
        };
        let lsn = wal.append_record(&record)?;

        debug!(
            "Logged update of page [{}, {}] by transaction {} at {}.",
            filename, page.page_no, txn_id, lsn
        );

        page.set_page_lsn(lsn);
        page.sync_old_data();
        session.txn_state.last_lsn = Some(lsn);
        Ok(())
    }

    /// Commits the session's transaction: a `COMMIT_TXN` record is written and the log is
    /// forced through it. If the transaction logged nothing, no record is written.
    ///
    /// On a WAL failure the session is left in its pre-commit state.
    pub fn commit_transaction(
        &mut self,
        storage: &mut StorageManager,
        session: &mut SessionState,
    ) -> Result<(), Error> {
        if !session.txn_state.is_txn_in_progress() {
            return Err(Error::NoActiveTransaction);
        }
        let txn_id = session.txn_state.transaction_id;

        if session.txn_state.logged_txn_start {
            let wal = wal_of(storage)?;
            wal.append_record(&WALRecord::CommitTxn {
                txn_id,
                prev_lsn: session.txn_state.last_lsn.unwrap(),
            })?;
            wal.force_all()?;
            self.store_txn_state(storage)?;
            info!("Committed transaction {}.", txn_id);
        } else {
            debug!("Transaction {} logged nothing; committing trivially.", txn_id);
        }

        session.txn_state.clear();
        Ok(())
    }

    /// Rolls back the session's transaction: its undo chain is walked backwards, restoring
    /// before-images and emitting redo-only compensation records, and an `ABORT_TXN` record
    /// finishes the chain.
    pub fn rollback_transaction(
        &mut self,
        storage: &mut StorageManager,
        session: &mut SessionState,
    ) -> Result<(), Error> {
        if !session.txn_state.is_txn_in_progress() {
            return Err(Error::NoActiveTransaction);
        }
        let txn_id = session.txn_state.transaction_id;

        if session.txn_state.logged_txn_start {
            let last_lsn = session.txn_state.last_lsn.unwrap();
            self.rollback_chain(storage, txn_id, last_lsn)?;
            info!("Rolled back transaction {}.", txn_id);
        }

        session.txn_state.clear();
        Ok(())
    }

    /// Loads a page referenced by a WAL record. The file is opened by name; `create` extends
    /// it when redo references a page that was never flushed.
    fn load_wal_target_page(
        storage: &mut StorageManager,
        filename: &str,
        page_no: u16,
        create: bool,
    ) -> Result<Option<PageHandle>, Error> {
        if !storage.file_manager.dbfile_exists(filename) {
            // The file may have been legitimately dropped after these records were written.
            warn!("WAL references missing file {}; skipping.", filename);
            return Ok(None);
        }
        let mut db_file = storage
            .file_manager
            .open_dbfile(filename)
            .map_err(|e| Error::IOError(e.to_string()))?;
        storage
            .load_page(&mut db_file, filename, page_no as u32, create)
            .map_err(|e| Error::IOError(e.to_string()))
            .map(Some)
    }

    /// Walks one transaction's undo chain from `last_lsn` backwards, restoring before-images.
    /// Used both by user-issued rollback and by recovery's undo pass.
    fn rollback_chain(
        &mut self,
        storage: &mut StorageManager,
        txn_id: i32,
        last_lsn: LogSequenceNumber,
    ) -> Result<(), Error> {
        let mut cur = Some(last_lsn);
        let mut chain_tail = last_lsn;

        while let Some(lsn) = cur {
            let (record, _) = wal_of(storage)?.read_record_at(lsn)?;

            if record.txn_id() != txn_id {
                return Err(Error::MalformedRecord(format!(
                    "undo chain of transaction {} reached record of transaction {} at {}",
                    txn_id,
                    record.txn_id(),
                    lsn
                )));
            }

            match record {
                WALRecord::StartTxn { .. } => break,
                WALRecord::UpdatePageRedoOnly { prev_lsn, .. } => {
                    // Already-undone work; skip over it.
                    cur = Some(prev_lsn);
                }
                WALRecord::UpdatePage {
                    prev_lsn,
                    filename,
                    page_no,
                    segments,
                    ..
                } => {
                    debug!(
                        "Undoing update of page [{}, {}] by transaction {}.",
                        filename, page_no, txn_id
                    );

                    if let Some(handle) =
                        Self::load_wal_target_page(storage, &filename, page_no, false)?
                    {
                        let mut page = handle.borrow_mut();
                        let redo_segments: Vec<RedoSegment> = segments
                            .iter()
                            .map(|seg| RedoSegment {
                                offset: seg.offset,
                                data: seg.before.clone(),
                            })
                            .collect();
                        for seg in &segments {
                            page.write_at_position(seg.offset as usize, &seg.before)
                                .map_err(|e| Error::IOError(e.to_string()))?;
                        }

                        // Compensation record: its prev-LSN skips past the undone update, so
                        // an interrupted rollback resumes where it left off.
                        let wal = wal_of(storage)?;
                        let clr = WALRecord::UpdatePageRedoOnly {
                            txn_id,
                            prev_lsn,
                            filename: filename.clone(),
                            page_no,
                            segments: redo_segments,
                        };
                        let clr_lsn = wal.append_record(&clr)?;
                        page.set_page_lsn(clr_lsn);
                        page.sync_old_data();
                        chain_tail = clr_lsn;
                    }

                    cur = Some(prev_lsn);
                }
                WALRecord::CommitTxn { .. } | WALRecord::AbortTxn { .. } => {
                    return Err(Error::MalformedRecord(format!(
                        "undo chain of transaction {} contains a completion record at {}",
                        txn_id, lsn
                    )));
                }
            }
        }

        wal_of(storage)?.append_record(&WALRecord::AbortTxn {
            txn_id,
            prev_lsn: chain_tail,
        })?;
        Ok(())
    }

    /// Loads persisted transaction state and performs crash recovery. Called once at startup,
    /// before any command runs. Creates the transaction-state file with defaults when it does
    /// not exist yet.
    pub fn initialize(&mut self, storage: &mut StorageManager) -> Result<(), Error> {
        if storage.wal_manager.is_none() {
            return Ok(());
        }

        if self.load_txn_state(storage)? {
            self.recover(storage)?;
        } else {
            info!("No transaction state found; creating fresh state.");
            self.store_txn_state(storage)?;
        }
        Ok(())
    }

    /// Runs the redo and undo passes, then checkpoints.
    fn recover(&mut self, storage: &mut StorageManager) -> Result<(), Error> {
        let durable_next = wal_of(storage)?.next_lsn();
        let mut lsn = self.first_lsn;
        let mut incomplete: HashMap<i32, LogSequenceNumber> = HashMap::new();
        let mut max_txn_id = 0;

        debug!("Recovery redo pass starting at {}.", lsn);

        loop {
            let file_len = wal_of(storage)?.file_length(lsn.log_file_no);
            if (lsn.offset as u64) >= file_len {
                // This file is exhausted; continue into the next one if it has records.
                let next_file = match lsn.log_file_no.checked_add(1) {
                    Some(n) => n,
                    None => break,
                };
                let next_len = wal_of(storage)?.file_length(next_file);
                if next_len > OFFSET_FIRST_RECORD as u64 {
                    lsn = LogSequenceNumber::new(next_file, OFFSET_FIRST_RECORD);
                    continue;
                }
                break;
            }

            let read = wal_of(storage)?.read_record_at(lsn);
            let (record, len) = match read {
                Ok(ok) => ok,
                Err(e) => {
                    if lsn >= durable_next {
                        // Trailing bytes past the durable boundary never finished writing.
                        debug!("End of valid log at {} ({}).", lsn, e);
                        break;
                    }
                    return Err(e);
                }
            };

            max_txn_id = max_txn_id.max(record.txn_id());

            match record {
                WALRecord::StartTxn { txn_id } => {
                    incomplete.insert(txn_id, lsn);
                }
                WALRecord::UpdatePage {
                    txn_id,
                    ref filename,
                    page_no,
                    ref segments,
                    ..
                } => {
                    if let Some(handle) =
                        Self::load_wal_target_page(storage, filename, page_no, true)?
                    {
                        let mut page = handle.borrow_mut();
                        for seg in segments {
                            page.write_at_position(seg.offset as usize, &seg.after)
                                .map_err(|e| Error::IOError(e.to_string()))?;
                        }
                        page.set_page_lsn(lsn);
                        page.sync_old_data();
                    }
                    incomplete.insert(txn_id, lsn);
                }
                WALRecord::UpdatePageRedoOnly {
                    txn_id,
                    ref filename,
                    page_no,
                    ref segments,
                    ..
                } => {
                    if let Some(handle) =
                        Self::load_wal_target_page(storage, filename, page_no, true)?
                    {
                        let mut page = handle.borrow_mut();
                        for seg in segments {
                            page.write_at_position(seg.offset as usize, &seg.data)
                                .map_err(|e| Error::IOError(e.to_string()))?;
                        }
                        page.set_page_lsn(lsn);
                        page.sync_old_data();
                    }
                    incomplete.insert(txn_id, lsn);
                }
                WALRecord::CommitTxn { txn_id, .. } | WALRecord::AbortTxn { txn_id, .. } => {
                    incomplete.remove(&txn_id);
                }
            }

            lsn = LogSequenceNumber::new(lsn.log_file_no, lsn.offset + len);
        }

        wal_of(storage)?.set_next_lsn(lsn);

        if !incomplete.is_empty() {
            info!(
                "Recovery undo pass: rolling back {} incomplete transaction(s).",
                incomplete.len()
            );
            let mut losers: Vec<(i32, LogSequenceNumber)> = incomplete.into_iter().collect();
            losers.sort();
            for (txn_id, last_lsn) in losers {
                debug!("Undoing loser transaction {} from {}.", txn_id, last_lsn);
                self.rollback_chain(storage, txn_id, last_lsn)?;
            }
        }

        // Checkpoint: flush everything recovery touched, then advance the first-LSN so the
        // next startup's redo pass starts past this point.
        storage
            .flush_all_pages()
            .map_err(|e| Error::IOError(e.to_string()))?;
        wal_of(storage)?.force_all()?;

        self.first_lsn = wal_of(storage)?.next_lsn();
        self.next_txn_id = self.next_txn_id.max(max_txn_id + 1);
        self.store_txn_state(storage)?;

        info!(
            "Recovery complete; next transaction ID {}, first LSN {}.",
            self.next_txn_id, self.first_lsn
        );
        Ok(())
    }

    /// Reads the transaction-state file, returning false when it does not exist.
    fn load_txn_state(&mut self, storage: &mut StorageManager) -> Result<bool, Error> {
        if !storage.file_manager.dbfile_exists(TXN_STATE_FILENAME) {
            return Ok(false);
        }

        let mut db_file = storage
            .file_manager
            .open_dbfile(TXN_STATE_FILENAME)
            .map_err(|e| Error::IOError(e.to_string()))?;
        let mut buffer = vec![0u8; TXN_STATE_PAGESIZE as usize];
        file_manager::load_page(&mut db_file, 0, &mut buffer, false)
            .map_err(|e| Error::IOError(e.to_string()))?;

        let mut cursor = std::io::Cursor::new(&buffer);
        cursor.set_position(OFFSET_NEXT_TXN_ID as u64);
        self.next_txn_id = cursor.read_i32::<BigEndian>()?;

        cursor.set_position(OFFSET_FIRST_LSN_FILE as u64);
        let first_file = cursor.read_u16::<BigEndian>()?;
        cursor.set_position(OFFSET_FIRST_LSN_OFFSET as u64);
        let first_offset = cursor.read_i32::<BigEndian>()?;
        self.first_lsn = LogSequenceNumber::new(first_file, first_offset as u32);

        cursor.set_position(OFFSET_NEXT_LSN_FILE as u64);
        let next_file = cursor.read_u16::<BigEndian>()?;
        cursor.set_position(OFFSET_NEXT_LSN_OFFSET as u64);
        let next_offset = cursor.read_i32::<BigEndian>()?;
        let next_lsn = LogSequenceNumber::new(next_file, next_offset as u32);

        wal_of(storage)?.set_next_lsn(next_lsn);

        debug!(
            "Loaded transaction state: next txn {}, first {}, next {}.",
            self.next_txn_id, self.first_lsn, next_lsn
        );
        Ok(true)
    }

    /// Persists the transaction state (next transaction ID, first LSN, next LSN) and syncs it.
    pub fn store_txn_state(&self, storage: &mut StorageManager) -> Result<(), Error> {
        let next_lsn = wal_of(storage)?.next_lsn();

        let mut buffer = vec![0u8; TXN_STATE_PAGESIZE as usize];
        buffer[0] = DBFileType::TxnStateFile as u8;
        buffer[1] = crate::storage::dbfile::encode_pagesize(TXN_STATE_PAGESIZE).unwrap();

        {
            let mut cursor = std::io::Cursor::new(&mut buffer[..]);
            cursor.set_position(OFFSET_NEXT_TXN_ID as u64);
            cursor.write_i32::<BigEndian>(self.next_txn_id)?;
            cursor.set_position(OFFSET_FIRST_LSN_FILE as u64);
            cursor.write_u16::<BigEndian>(self.first_lsn.log_file_no)?;
            cursor.set_position(OFFSET_FIRST_LSN_OFFSET as u64);
            cursor.write_i32::<BigEndian>(self.first_lsn.offset as i32)?;
            cursor.set_position(OFFSET_NEXT_LSN_FILE as u64);
            cursor.write_u16::<BigEndian>(next_lsn.log_file_no)?;
            cursor.set_position(OFFSET_NEXT_LSN_OFFSET as u64);
            cursor.write_i32::<BigEndian>(next_lsn.offset as i32)?;
        }

        let mut db_file = if storage.file_manager.dbfile_exists(TXN_STATE_FILENAME) {
            storage
                .file_manager
                .open_dbfile(TXN_STATE_FILENAME)
                .map_err(|e| Error::IOError(e.to_string()))?
        } else {
            storage
                .file_manager
                .create_dbfile(
                    TXN_STATE_FILENAME,
                    DBFileType::TxnStateFile,
                    TXN_STATE_PAGESIZE,
                )
                .map_err(|e| Error::IOError(e.to_string()))?
        };

        file_manager::save_page(&mut db_file, 0, &buffer)
            .map_err(|e| Error::IOError(e.to_string()))?;
        storage
            .file_manager
            .sync_dbfile(&mut db_file)
            .map_err(|e| Error::IOError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    use crate::storage::buffer_manager::DEFAULT_PAGECACHE_SIZE;
    use crate::storage::{BufferManager, FileManager};
    use crate::transactions::WalManager;

    fn storage_with_wal(dir: &TempDir) -> StorageManager {
        StorageManager::new(
            FileManager::with_directory(dir.path()).unwrap(),
            BufferManager::new(DEFAULT_PAGECACHE_SIZE),
            Some(WalManager::new(dir.path())),
            512,
        )
    }

    #[test]
    fn test_nested_transactions_rejected() {
        let mut tm = TransactionManager::new();
        let mut session = SessionState::new(1);

        tm.start_transaction(&mut session, true).unwrap();
        assert!(matches!(
            tm.start_transaction(&mut session, true),
            Err(Error::TransactionAlreadyActive(_))
        ));
    }

    #[test]
    fn test_commit_without_transaction_rejected() {
        let dir = TempDir::new("test_txn").unwrap();
        let mut storage = storage_with_wal(&dir);
        let mut tm = TransactionManager::new();
        let mut session = SessionState::new(1);

        assert_eq!(
            tm.commit_transaction(&mut storage, &mut session),
            Err(Error::NoActiveTransaction)
        );
        assert_eq!(
            tm.rollback_transaction(&mut storage, &mut session),
            Err(Error::NoActiveTransaction)
        );
    }

    #[test]
    fn test_read_only_transaction_logs_nothing() {
        let dir = TempDir::new("test_txn").unwrap();
        let mut storage = storage_with_wal(&dir);
        let mut tm = TransactionManager::new();
        let mut session = SessionState::new(1);

        tm.start_transaction(&mut session, true).unwrap();
        tm.commit_transaction(&mut storage, &mut session).unwrap();

        // No WAL file was ever created.
        assert_eq!(storage.wal_manager.as_ref().unwrap().file_length(0), 0);
        assert!(!session.txn_state.is_txn_in_progress());
    }

    #[test]
    fn test_txn_state_round_trip() {
        let dir = TempDir::new("test_txn").unwrap();
        let mut storage = storage_with_wal(&dir);

        let mut tm = TransactionManager::new();
        tm.next_txn_id = 42;
        tm.first_lsn = LogSequenceNumber::new(3, 777);
        storage
            .wal_manager
            .as_mut()
            .unwrap()
            .set_next_lsn(LogSequenceNumber::new(4, 888));
        tm.store_txn_state(&mut storage).unwrap();

        let mut fresh = TransactionManager::new();
        assert!(fresh.load_txn_state(&mut storage).unwrap());
        assert_eq!(fresh.next_txn_id, 42);
        assert_eq!(fresh.first_lsn, LogSequenceNumber::new(3, 777));
        assert_eq!(
            storage.wal_manager.as_ref().unwrap().next_lsn(),
            LogSequenceNumber::new(4, 888)
        );
    }

    #[test]
    fn test_initialize_creates_fresh_state() {
        let dir = TempDir::new("test_txn").unwrap();
        let mut storage = storage_with_wal(&dir);
        let mut tm = TransactionManager::new();
        tm.initialize(&mut storage).unwrap();
        assert!(storage.file_manager.dbfile_exists(TXN_STATE_FILENAME));
    }
}
