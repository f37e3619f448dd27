//! The Buffer Manager caches `DBPage` objects so that repeatedly-accessed pages are not read
//! from disk over and over.
//!
//! Pages are shared out as `Rc<RefCell<DBPage>>` handles; the engine is single-threaded within
//! a session, and all cross-session access is serialized above this layer. A page is evictable
//! only when it is unpinned and no handles to it remain outside the cache.
//!
//! Eviction itself is orchestrated by the [`StorageManager`](super::StorageManager), because
//! flushing a dirty page must first force the write-ahead log up to the page's LSN
//! (WAL-before-flush). This type only picks victims and tracks recency.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::storage::{DBPage, Pinnable};

/// The default size of the page cache, in bytes.
pub const DEFAULT_PAGECACHE_SIZE: usize = 1 << 20;

/// A cached page is keyed by its file's name and its page number.
pub type PageKey = (String, u32);

/// A shared handle to a cached page.
pub type PageHandle = Rc<RefCell<DBPage>>;

/// The page cache. See the module docs for the sharing and eviction model.
pub struct BufferManager {
    max_cache_size: usize,
    total_bytes: usize,
    cache: HashMap<PageKey, PageHandle>,
    /// Keys in least-recently-used order, oldest first. Touching a page moves its key to the
    /// back.
    lru: Vec<PageKey>,
}

impl BufferManager {
    /// Creates a buffer manager bounded by the given cache size in bytes.
    pub fn new(max_cache_size: usize) -> BufferManager {
        BufferManager {
            max_cache_size,
            total_bytes: 0,
            cache: HashMap::new(),
            lru: Vec::new(),
        }
    }

    /// The number of pages currently cached.
    pub fn num_cached_pages(&self) -> usize {
        self.cache.len()
    }

    /// The number of bytes of page data currently cached.
    pub fn cached_bytes(&self) -> usize {
        self.total_bytes
    }

    fn touch(&mut self, key: &PageKey) {
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            let key = self.lru.remove(pos);
            self.lru.push(key);
        }
    }

    /// Looks up a cached page, marking it recently used.
    pub fn get_page(&mut self, filename: &str, page_no: u32) -> Option<PageHandle> {
        let key = (filename.to_string(), page_no);
        let found = self.cache.get(&key).cloned();
        if found.is_some() {
            self.touch(&key);
        }
        found
    }

    /// Adds a freshly-loaded page to the cache, returning the shared handle.
    pub fn add_page(&mut self, filename: &str, page: DBPage) -> PageHandle {
        let key = (filename.to_string(), page.page_no);
        trace!("Caching page [{}, {}].", key.0, key.1);

        self.total_bytes += page.page_data.len();
        let handle = Rc::new(RefCell::new(page));
        self.cache.insert(key.clone(), handle.clone());
        self.lru.push(key);
        handle
    }

    /// Whether the cache is over its configured capacity.
    pub fn over_capacity(&self) -> bool {
        self.total_bytes > self.max_cache_size
    }

    /// Removes and returns the least-recently-used evictable page, or `None` when every cached
    /// page is pinned or still referenced. The caller is responsible for flushing the page if
    /// it is dirty, honoring WAL-before-flush.
    pub fn pop_victim(&mut self) -> Option<(PageKey, PageHandle)> {
        let mut victim_pos = None;
        for (pos, key) in self.lru.iter().enumerate() {
            let handle = &self.cache[key];
            if Rc::strong_count(handle) == 1 && !handle.borrow().is_pinned() {
                victim_pos = Some(pos);
                break;
            }
        }

        let pos = victim_pos?;
        let key = self.lru.remove(pos);
        let handle = self.cache.remove(&key).unwrap();
        self.total_bytes -= handle.borrow().page_data.len();
        trace!("Evicting page [{}, {}].", key.0, key.1);
        Some((key, handle))
    }

    /// Removes and returns every cached page belonging to the given file, in page order. Used
    /// when a table is dropped or the database shuts down.
    pub fn remove_file_pages(&mut self, filename: &str) -> Vec<(PageKey, PageHandle)> {
        let mut keys: Vec<PageKey> = self
            .cache
            .keys()
            .filter(|(name, _)| name == filename)
            .cloned()
            .collect();
        keys.sort();

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            self.lru.retain(|k| *k != key);
            let handle = self.cache.remove(&key).unwrap();
            self.total_bytes -= handle.borrow().page_data.len();
            removed.push((key, handle));
        }
        removed
    }

    /// Returns handles to every cached page, in (file, page) order. Used for full flushes.
    pub fn all_pages(&self) -> Vec<(PageKey, PageHandle)> {
        let mut result: Vec<_> = self
            .cache
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Drops every cached page without flushing anything. Only used by tests that simulate a
    /// crash.
    pub fn discard_all(&mut self) {
        self.cache.clear();
        self.lru.clear();
        self.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_no: u32) -> DBPage {
        DBPage::new(512, page_no)
    }

    #[test]
    fn test_cache_hit_and_miss() {
        let mut mgr = BufferManager::new(DEFAULT_PAGECACHE_SIZE);
        assert!(mgr.get_page("t.tbl", 0).is_none());

        mgr.add_page("t.tbl", page(0));
        assert!(mgr.get_page("t.tbl", 0).is_some());
        assert!(mgr.get_page("t.tbl", 1).is_none());
        assert!(mgr.get_page("u.tbl", 0).is_none());
        assert_eq!(mgr.num_cached_pages(), 1);
        assert_eq!(mgr.cached_bytes(), 512);
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut mgr = BufferManager::new(1024);
        mgr.add_page("t.tbl", page(0));
        mgr.add_page("t.tbl", page(1));
        mgr.add_page("t.tbl", page(2));
        assert!(mgr.over_capacity());

        // Touch page 0 so page 1 becomes the oldest.
        mgr.get_page("t.tbl", 0);

        let (key, _) = mgr.pop_victim().unwrap();
        assert_eq!(key, ("t.tbl".to_string(), 1));
    }

    #[test]
    fn test_pinned_pages_are_not_evicted() {
        let mut mgr = BufferManager::new(512);
        let handle = mgr.add_page("t.tbl", page(0));
        handle.borrow_mut().pin();
        drop(handle);

        assert!(mgr.pop_victim().is_none());

        let handle = mgr.get_page("t.tbl", 0).unwrap();
        handle.borrow_mut().unpin().unwrap();
        drop(handle);
        assert!(mgr.pop_victim().is_some());
    }

    #[test]
    fn test_outstanding_handles_block_eviction() {
        let mut mgr = BufferManager::new(512);
        let handle = mgr.add_page("t.tbl", page(0));
        // Unpinned, but the handle is still live outside the cache.
        assert!(mgr.pop_victim().is_none());
        drop(handle);
        assert!(mgr.pop_victim().is_some());
    }

    #[test]
    fn test_remove_file_pages() {
        let mut mgr = BufferManager::new(DEFAULT_PAGECACHE_SIZE);
        mgr.add_page("t.tbl", page(0));
        mgr.add_page("t.tbl", page(1));
        mgr.add_page("u.tbl", page(0));

        let removed = mgr.remove_file_pages("t.tbl");
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].0 .1, 0);
        assert_eq!(removed[1].0 .1, 1);
        assert_eq!(mgr.num_cached_pages(), 1);
        assert!(mgr.get_page("u.tbl", 0).is_some());
    }
}
