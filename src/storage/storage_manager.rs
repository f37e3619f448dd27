//! The storage manager ties the storage layer together: it owns the file manager, the buffer
//! manager, the open-table registry, and (when transactions are enabled) the write-ahead log.
//!
//! All page access flows through [`StorageManager::load_page`], which consults the buffer
//! cache and enforces the WAL-before-flush rule when eviction writes out a dirty page: the log
//! is forced up to the page's recorded LSN before the page image reaches disk.

use std::collections::HashSet;
use std::fs::File;

use log::{debug, info};

use crate::expressions::Literal;
use crate::relations::TableSchema;
use crate::storage::buffer_manager::{PageHandle, PageKey};
use crate::storage::dbpage::EMPTY_SLOT;
use crate::storage::header_page;
use crate::storage::page_tuple::{get_tuple_storage_size, store_new_tuple, PageTuple};
use crate::storage::table_manager::{
    get_table_file_name, ColumnStats, Error, Table, TableManager, TableStats,
};
use crate::storage::{
    file_manager, BufferManager, DBFile, DBFileType, DBPage, FileManager, FilePointer, Tuple,
};
use crate::transactions::WalManager;

/// The storage manager. See the module docs for the layering.
pub struct StorageManager {
    /// Low-level paged file I/O.
    pub file_manager: FileManager,
    /// The page cache.
    pub buffer_manager: BufferManager,
    /// The open-table registry.
    pub table_manager: TableManager,
    /// The write-ahead log, absent when transactions are disabled.
    pub wal_manager: Option<WalManager>,
    page_size: u32,
}

impl StorageManager {
    /// Creates a storage manager over the given data directory.
    pub fn new(
        file_manager: FileManager,
        buffer_manager: BufferManager,
        wal_manager: Option<WalManager>,
        page_size: u32,
    ) -> StorageManager {
        StorageManager {
            file_manager,
            buffer_manager,
            table_manager: TableManager::new(),
            wal_manager,
            page_size,
        }
    }

    /// The page size used for newly created tables.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Writes a dirty page image out to its file, forcing the WAL first when the page carries
    /// an LSN. The file is (re)opened by name, so victims of any file can be written.
    fn write_out_page(
        wal_manager: &mut Option<WalManager>,
        file_manager: &FileManager,
        key: &PageKey,
        handle: &PageHandle,
    ) -> Result<(), Error> {
        let mut page = handle.borrow_mut();
        if !page.is_dirty() {
            return Ok(());
        }

        if let (Some(wal), Some(lsn)) = (wal_manager.as_mut(), page.get_page_lsn()) {
            wal.force_wal(lsn)
                .map_err(|e| Error::IOError(e.to_string()))?;
        }

        debug!("Writing out dirty page [{}, {}].", key.0, key.1);
        let mut db_file = file_manager.open_dbfile(&key.0)?;
        file_manager::save_page(&mut db_file, key.1, &page.page_data)?;
        page.set_dirty(false);
        Ok(())
    }

    fn evict_to_capacity(
        buffer_manager: &mut BufferManager,
        wal_manager: &mut Option<WalManager>,
        file_manager: &FileManager,
    ) -> Result<(), Error> {
        while buffer_manager.over_capacity() {
            match buffer_manager.pop_victim() {
                Some((key, handle)) => {
                    Self::write_out_page(wal_manager, file_manager, &key, &handle)?;
                }
                // Everything left is pinned or in use; let the cache run over.
                None => break,
            }
        }
        Ok(())
    }

    fn load_page_impl(
        buffer_manager: &mut BufferManager,
        wal_manager: &mut Option<WalManager>,
        file_manager: &FileManager,
        db_file: &mut DBFile<File>,
        filename: &str,
        page_no: u32,
        create: bool,
    ) -> Result<PageHandle, Error> {
        if let Some(handle) = buffer_manager.get_page(filename, page_no) {
            return Ok(handle);
        }

        let mut page = DBPage::new(db_file.get_page_size(), page_no);
        file_manager::load_page(db_file, page_no, &mut page.page_data, create)?;
        let handle = buffer_manager.add_page(filename, page);

        Self::evict_to_capacity(buffer_manager, wal_manager, file_manager)?;
        Ok(handle)
    }

    /// Loads a page of an arbitrary database file through the cache. The returned page's
    /// contents exactly match the on-disk bytes, or are zeroed if `create` extended the file.
    pub fn load_page(
        &mut self,
        db_file: &mut DBFile<File>,
        filename: &str,
        page_no: u32,
        create: bool,
    ) -> Result<PageHandle, Error> {
        Self::load_page_impl(
            &mut self.buffer_manager,
            &mut self.wal_manager,
            &self.file_manager,
            db_file,
            filename,
            page_no,
            create,
        )
    }

    /// Loads a page of an open table through the cache.
    pub fn load_table_page(
        &mut self,
        table_name: &str,
        page_no: u32,
        create: bool,
    ) -> Result<PageHandle, Error> {
        let table = self
            .table_manager
            .get_mut(table_name)
            .ok_or_else(|| Error::TableDoesNotExist(table_name.to_string()))?;
        let filename = get_table_file_name(table_name);
        Self::load_page_impl(
            &mut self.buffer_manager,
            &mut self.wal_manager,
            &self.file_manager,
            &mut table.db_file,
            &filename,
            page_no,
            create,
        )
    }

    /// Whether a table of the given name exists on disk or is already open.
    pub fn table_exists(&self, name: &str) -> bool {
        self.table_manager.is_open(name) || self.file_manager.dbfile_exists(get_table_file_name(name))
    }

    /// Creates a new heap table file with the given schema and writes its header page. Fails if
    /// the table already exists.
    pub fn create_table(&mut self, name: &str, schema: TableSchema) -> Result<(), Error> {
        if self.table_exists(name) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }

        let filename = get_table_file_name(name);
        let mut db_file =
            self.file_manager
                .create_dbfile(&filename, DBFileType::HeapTupleFile, self.page_size)?;

        let mut header = DBPage::new(self.page_size, 0);
        file_manager::load_page(&mut db_file, 0, &mut header.page_data, false)?;
        header_page::write_header(&mut header, &schema, &TableStats::default())?;
        file_manager::save_page(&mut db_file, 0, &header.page_data)?;
        self.file_manager.sync_dbfile(&mut db_file)?;

        info!("Created table {} with schema {}.", name, *schema);

        self.table_manager.insert(Table {
            name: name.to_string(),
            db_file,
            schema,
            stats: TableStats::default(),
            column_stats: vec![],
        });
        Ok(())
    }

    /// Opens a table if it is not already open, parsing its header page into schema and
    /// statistics. Fails with storage-format errors on malformed headers.
    pub fn open_table(&mut self, name: &str) -> Result<(), Error> {
        if self.table_manager.is_open(name) {
            return Ok(());
        }

        let filename = get_table_file_name(name);
        if !self.file_manager.dbfile_exists(&filename) {
            return Err(Error::TableDoesNotExist(name.to_string()));
        }

        let mut db_file = self.file_manager.open_dbfile(&filename)?;
        let header = Self::load_page_impl(
            &mut self.buffer_manager,
            &mut self.wal_manager,
            &self.file_manager,
            &mut db_file,
            &filename,
            0,
            false,
        )?;

        let (schema, stats) = {
            let mut page = header.borrow_mut();
            let schema = header_page::read_schema(&mut page, name)
                .map_err(|e| Error::BadHeaderPage(e.to_string()))?;
            let stats = header_page::read_stats(&mut page)
                .map_err(|e| Error::BadHeaderPage(e.to_string()))?;
            (schema, stats)
        };

        debug!("Opened table {}; stats {:?}.", name, stats);

        self.table_manager.insert(Table {
            name: name.to_string(),
            db_file,
            schema,
            stats,
            column_stats: vec![],
        });
        Ok(())
    }

    /// Returns the schema of an open table.
    pub fn table_schema(&self, name: &str) -> Result<&TableSchema, Error> {
        self.table_manager
            .get(name)
            .map(|t| &t.schema)
            .ok_or_else(|| Error::TableDoesNotExist(name.to_string()))
    }

    /// Returns the statistics of an open table.
    pub fn table_stats(&self, name: &str) -> Result<&TableStats, Error> {
        self.table_manager
            .get(name)
            .map(|t| &t.stats)
            .ok_or_else(|| Error::TableDoesNotExist(name.to_string()))
    }

    /// Returns the per-column statistics of an open table; empty until analyzed.
    pub fn table_column_stats(&self, name: &str) -> Result<&[ColumnStats], Error> {
        self.table_manager
            .get(name)
            .map(|t| t.column_stats.as_slice())
            .ok_or_else(|| Error::TableDoesNotExist(name.to_string()))
    }

    /// Rewrites an open table's header page with a new schema (the statistics are preserved).
    /// Returns the header page handle so the caller can report the mutation to the
    /// transaction manager. Used by `CREATE INDEX` to record new key metadata.
    pub fn update_table_schema(
        &mut self,
        name: &str,
        schema: TableSchema,
    ) -> Result<PageHandle, Error> {
        self.open_table(name)?;
        let stats = *self.table_stats(name)?;

        let handle = self.load_table_page(name, 0, false)?;
        header_page::write_header(&mut handle.borrow_mut(), &schema, &stats)
            .map_err(|e| Error::BadHeaderPage(e.to_string()))?;

        let table = self.table_manager.get_mut(name).unwrap();
        table.schema = schema;
        Ok(handle)
    }

    /// Drops a table: discards its cached pages, closes it, and deletes its file.
    pub fn drop_table(&mut self, name: &str) -> Result<(), Error> {
        self.open_table(name)?;
        let filename = get_table_file_name(name);

        // Cached pages of a dropped table are discarded, not flushed.
        self.buffer_manager.remove_file_pages(&filename);
        self.table_manager.remove(name);
        self.file_manager.remove_dbfile(&filename)?;
        info!("Dropped table {}.", name);
        Ok(())
    }

    fn table_plain_schema(&self, name: &str) -> Result<crate::relations::Schema, Error> {
        self.table_schema(name).map(|s| s.schema.clone())
    }

    /// Scans for the first live tuple at or after the given (page, slot) position.
    fn scan_from(
        &mut self,
        name: &str,
        mut page_no: u32,
        mut slot: u16,
    ) -> Result<Option<PageTuple>, Error> {
        let schema = self.table_plain_schema(name)?;
        loop {
            let handle = match self.load_table_page(name, page_no, false) {
                Ok(handle) => handle,
                Err(Error::FileManagerError(file_manager::Error::EndOfFile(_))) => {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            let num_slots = handle.borrow_mut().get_num_slots()?;
            while slot < num_slots {
                let offset = handle.borrow_mut().get_slot_value(slot)?;
                if offset != EMPTY_SLOT {
                    let tuple = PageTuple::new(handle, slot, offset, schema)?;
                    return Ok(Some(tuple));
                }
                slot += 1;
            }
            drop(handle);

            page_no += 1;
            slot = 0;
        }
    }

    /// Returns the first tuple in the table, or `None` if the table is empty. The scan is
    /// left-to-right over pages, and within each page over slots.
    pub fn get_first_tuple(&mut self, name: &str) -> Result<Option<PageTuple>, Error> {
        self.scan_from(name, 1, 0)
    }

    /// Returns the tuple following the one at the given file pointer, or `None` at the end of
    /// the table.
    pub fn get_next_tuple(
        &mut self,
        name: &str,
        prev: FilePointer,
    ) -> Result<Option<PageTuple>, Error> {
        let handle = match self.load_table_page(name, prev.page_no as u32, false) {
            Ok(handle) => handle,
            Err(Error::FileManagerError(file_manager::Error::EndOfFile(_))) => return Ok(None),
            Err(e) => return Err(e),
        };
        let slot = handle
            .borrow_mut()
            .offset_to_slot(prev.offset)
            .map_err(|e| Error::InvalidFilePointer(prev, e.to_string()))?;
        drop(handle);
        self.scan_from(name, prev.page_no as u32, slot + 1)
    }

    /// Fetches the tuple named by a file pointer.
    ///
    /// # Errors
    /// Fails with an invalid-pointer error if the page does not exist, the offset does not
    /// resolve to a slot, or the slot is empty.
    pub fn get_tuple(&mut self, name: &str, fp: FilePointer) -> Result<PageTuple, Error> {
        let schema = self.table_plain_schema(name)?;
        let handle = match self.load_table_page(name, fp.page_no as u32, false) {
            Ok(handle) => handle,
            Err(Error::FileManagerError(file_manager::Error::EndOfFile(_))) => {
                return Err(Error::InvalidFilePointer(fp, "page does not exist".into()));
            }
            Err(e) => return Err(e),
        };

        let (slot, offset) = {
            let mut page = handle.borrow_mut();
            let slot = page
                .offset_to_slot(fp.offset)
                .map_err(|e| Error::InvalidFilePointer(fp, e.to_string()))?;
            (slot, page.get_slot_value(slot)?)
        };
        if offset == EMPTY_SLOT {
            return Err(Error::InvalidFilePointer(fp, "slot is empty".into()));
        }

        PageTuple::new(handle, slot, offset, schema).map_err(Into::into)
    }

    /// Adds a tuple to the table, returning a page tuple backed by the stored data.
    ///
    /// The file is scanned for the first page with enough free space (the tuple's size plus a
    /// fresh slot entry); if no page has room, the file is extended by one page.
    pub fn add_tuple<T: Tuple + ?Sized>(
        &mut self,
        name: &str,
        tuple: &T,
    ) -> Result<PageTuple, Error> {
        let schema = self.table_plain_schema(name)?;
        let tuple_size = get_tuple_storage_size(&schema, tuple)?;
        debug!("Adding new tuple of size {} bytes.", tuple_size);

        if tuple_size as u32 + 2 > self.page_size {
            return Err(Error::TupleTooBig(tuple_size, self.page_size));
        }

        let mut page_no: u32 = 1;
        let handle = loop {
            match self.load_table_page(name, page_no, false) {
                Ok(handle) => {
                    let free_space = handle.borrow_mut().get_free_space()?;
                    if free_space >= tuple_size + 2 {
                        debug!("Found space for new tuple in page {}.", page_no);
                        break handle;
                    }
                }
                Err(Error::FileManagerError(file_manager::Error::EndOfFile(_))) => {
                    // No page had room; extend the file by one fresh data page.
                    debug!("Creating new page {} to store new tuple.", page_no);
                    let handle = self.load_table_page(name, page_no, true)?;
                    handle.borrow_mut().init_new_page()?;
                    break handle;
                }
                Err(e) => return Err(e),
            }
            if page_no as u64 >= u16::MAX as u64 {
                return Err(Error::TupleTooBig(tuple_size, self.page_size));
            }
            page_no += 1;
        };

        let (slot, tuple_offset) = {
            let mut page = handle.borrow_mut();
            let slot = page.alloc_new_tuple(tuple_size)?;
            let offset = page.get_slot_value(slot)?;
            (slot, offset)
        };
        store_new_tuple(&handle, tuple_offset, &schema, tuple)?;

        debug!("New tuple resides on page {}, slot {}.", page_no, slot);

        PageTuple::new(handle, slot, tuple_offset, schema).map_err(Into::into)
    }

    /// Applies column-name → new-value changes to the tuple at the given file pointer, in
    /// place. Best-effort: if a new value's encoding no longer fits in the page, the update
    /// fails with a no-room error and no tuple migration is attempted.
    pub fn update_tuple(
        &mut self,
        name: &str,
        fp: FilePointer,
        changes: &[(String, Literal)],
    ) -> Result<(), Error> {
        // Resolve all column names before touching anything.
        let mut resolved: Vec<(usize, Literal)> = Vec::with_capacity(changes.len());
        {
            let schema = self.table_schema(name)?;
            for (col_name, value) in changes {
                let (idx, _) = schema.find_column(&(None, Some(col_name.clone())))?;
                resolved.push((idx, value.clone()));
            }
        }

        let mut tuple = self.get_tuple(name, fp)?;
        for (idx, value) in resolved {
            tuple.set_column_value(idx, value)?;
        }
        Ok(())
    }

    /// Deletes the tuple at the given file pointer: its slot is marked empty and the page's
    /// tuple-data region is compacted.
    pub fn delete_tuple(&mut self, name: &str, fp: FilePointer) -> Result<(), Error> {
        let tuple = self.get_tuple(name, fp)?;
        let slot = tuple.slot();
        let offset = tuple.get_page_offset();
        let size = tuple.storage_size();
        let handle = tuple.page_handle();
        drop(tuple);

        let mut page = handle.borrow_mut();
        page.set_slot_value(slot, EMPTY_SLOT)?;
        page.delete_tuple_data_range(offset, size)?;
        debug!("Deleted tuple at {}; freed {} bytes.", fp, size);
        Ok(())
    }

    /// Sequentially scans the table, recomputing table statistics (persisted to the header
    /// page) and in-memory per-column statistics.
    pub fn analyze_table(&mut self, name: &str) -> Result<TableStats, Error> {
        let schema = self.table_plain_schema(name)?;
        let num_columns = schema.num_columns();

        let mut num_pages: u16 = 0;
        let mut num_tuples: u32 = 0;
        let mut total_bytes: u64 = 0;
        let mut distinct: Vec<HashSet<crate::expressions::LiteralKey>> =
            vec![HashSet::new(); num_columns];
        let mut nulls: Vec<u32> = vec![0; num_columns];
        let mut mins: Vec<Option<Literal>> = vec![None; num_columns];
        let mut maxs: Vec<Option<Literal>> = vec![None; num_columns];

        let mut page_no: u32 = 1;
        loop {
            let handle = match self.load_table_page(name, page_no, false) {
                Ok(handle) => handle,
                Err(Error::FileManagerError(file_manager::Error::EndOfFile(_))) => break,
                Err(e) => return Err(e),
            };
            num_pages += 1;

            let num_slots = handle.borrow_mut().get_num_slots()?;
            for slot in 0..num_slots {
                let offset = handle.borrow_mut().get_slot_value(slot)?;
                if offset == EMPTY_SLOT {
                    continue;
                }
                let tuple = PageTuple::new(handle.clone(), slot, offset, schema.clone())?;
                num_tuples += 1;
                total_bytes += tuple.storage_size() as u64;

                for col in 0..num_columns {
                    let value = tuple.get_column_value(col)?;
                    if value == Literal::Null {
                        nulls[col] += 1;
                        continue;
                    }
                    distinct[col].insert(value.hash_key());
                    let lower = match mins[col] {
                        Some(ref cur) => value.compare(cur) == Some(std::cmp::Ordering::Less),
                        None => true,
                    };
                    if lower {
                        mins[col] = Some(value.clone());
                    }
                    let higher = match maxs[col] {
                        Some(ref cur) => value.compare(cur) == Some(std::cmp::Ordering::Greater),
                        None => true,
                    };
                    if higher {
                        maxs[col] = Some(value);
                    }
                }
            }
            page_no += 1;
        }

        let stats = TableStats {
            num_data_pages: num_pages,
            num_tuples,
            avg_tuple_size: if num_tuples > 0 {
                total_bytes as f32 / num_tuples as f32
            } else {
                0.0
            },
        };

        let column_stats: Vec<ColumnStats> = (0..num_columns)
            .map(|col| ColumnStats {
                num_distinct: Some(distinct[col].len() as u32),
                num_nulls: nulls[col],
                min_value: mins[col].clone(),
                max_value: maxs[col].clone(),
            })
            .collect();

        // Persist the table-level stats into the header page.
        let header = self.load_table_page(name, 0, false)?;
        header_page::write_stats(&mut header.borrow_mut(), &stats)
            .map_err(|e| Error::BadHeaderPage(e.to_string()))?;

        let table = self.table_manager.get_mut(name).unwrap();
        table.stats = stats;
        table.column_stats = column_stats;

        info!(
            "Analyzed table {}: {} pages, {} tuples, {:.1} avg bytes.",
            name, stats.num_data_pages, stats.num_tuples, stats.avg_tuple_size
        );
        Ok(stats)
    }

    /// Writes out every dirty cached page (forcing the WAL as needed) and syncs every open
    /// table file. Called at shutdown.
    pub fn flush_all_pages(&mut self) -> Result<(), Error> {
        let mut failed: Option<Error> = None;

        for (key, handle) in self.buffer_manager.all_pages() {
            if let Err(e) = Self::write_out_page(
                &mut self.wal_manager,
                &self.file_manager,
                &key,
                &handle,
            ) {
                // Keep flushing the remaining pages; report the first failure at the end.
                failed.get_or_insert(e);
            }
        }

        for name in self.table_manager.open_table_names() {
            let table = self.table_manager.get_mut(&name).unwrap();
            if let Err(e) = self.file_manager.sync_dbfile(&mut table.db_file) {
                failed.get_or_insert(e.into());
            }
        }

        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drops every cached page without flushing. Only used by tests that simulate a crash.
    pub fn discard_buffer_pool(&mut self) {
        self.buffer_manager.discard_all();
    }
}
