//! The buffer pool: a bounded page cache with NO STEAL / FORCE semantics.
//!
//! Every page access goes through [`BufferPool::get_page`], which first
//! acquires the page lock (possibly blocking, possibly aborting on
//! deadlock) and then serves the page from cache or disk. Mutations mark
//! pages dirty per transaction; commit flushes the transaction's dirty
//! pages (FORCE), abort restores their before-images, and eviction never
//! touches a dirty page (NO STEAL), so uncommitted bytes never reach disk.

pub mod lru;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use crate::access::tuple::Tuple;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::{LockManager, LockMode};
use crate::error::{DbError, DbResult};
use crate::storage::buffer::lru::LruList;
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::id::TransactionId;

struct PageCache {
    pages: HashMap<PageId, Arc<RwLock<HeapPage>>>,
    lru: LruList,
}

pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    /// Cache state, guarded separately from the lock manager's mutex.
    cache: Mutex<PageCache>,
}

impl BufferPool {
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Self {
        Self {
            capacity,
            catalog,
            lock_manager: LockManager::new(),
            cache: Mutex::new(PageCache {
                pages: HashMap::with_capacity(capacity),
                lru: LruList::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.lock().pages.len()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Retrieves the page under the given lock mode, blocking while a
    /// conflicting transaction holds it. On a cache miss the page is read
    /// through the catalog's heap file, evicting a clean page if the pool
    /// is full. If the miss path fails, a lock freshly acquired by this
    /// call is released again so the transaction is free to retry.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> DbResult<Arc<RwLock<HeapPage>>> {
        let held_before = self.lock_manager.holds_any_lock(tid, pid);
        self.lock_manager.acquire_lock(tid, pid, mode)?;

        let mut cache = self.cache.lock();
        if let Some(page) = cache.pages.get(&pid) {
            let page = page.clone();
            cache.lru.touch(pid);
            return Ok(page);
        }

        match self.load_page(&mut cache, pid) {
            Ok(page) => Ok(page),
            Err(e) => {
                drop(cache);
                if !held_before {
                    self.lock_manager.release_lock(tid, pid);
                }
                Err(e)
            }
        }
    }

    fn load_page(
        &self,
        cache: &mut PageCache,
        pid: PageId,
    ) -> DbResult<Arc<RwLock<HeapPage>>> {
        let file = self.catalog.file(pid.table)?;
        let page = Arc::new(RwLock::new(file.read_page(pid)?));
        if cache.pages.len() >= self.capacity {
            Self::evict_one(cache)?;
        }
        cache.pages.insert(pid, page.clone());
        cache.lru.touch(pid);
        trace!("cached {} ({}/{} frames)", pid, cache.pages.len(), self.capacity);
        Ok(page)
    }

    /// Evicts the least recently used clean page. Dirty pages are pinned
    /// by NO STEAL; when nothing is clean the caller's operation fails.
    fn evict_one(cache: &mut PageCache) -> DbResult<()> {
        let victim = cache.lru.iter().copied().find(|pid| {
            cache
                .pages
                .get(pid)
                .map_or(false, |page| page.read().dirty_by().is_none())
        });
        match victim {
            Some(pid) => {
                cache.pages.remove(&pid);
                cache.lru.remove(pid);
                debug!("evicted {}", pid);
                Ok(())
            }
            None => Err(DbError::NoCleanPage),
        }
    }

    /// Inserts a tuple into the table, locking EXCLUSIVE whatever page
    /// ends up holding it and marking that page dirty.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table: TableId,
        tuple: &mut Tuple,
    ) -> DbResult<()> {
        let file = self.catalog.file(table)?;
        let page = file.insert_tuple(self, tid, tuple)?;
        self.finish_mutation(tid, page)
    }

    /// Deletes a tuple through its stamped record id.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.file(rid.pid.table)?;
        let page = file.delete_tuple(self, tid, tuple)?;
        self.finish_mutation(tid, page)
    }

    /// Marks a page returned by a heap-file mutation dirty and makes sure
    /// it sits in the cache. The transaction already holds EXCLUSIVE on
    /// it, so no other transaction can race us here.
    fn finish_mutation(
        &self,
        tid: TransactionId,
        page: Arc<RwLock<HeapPage>>,
    ) -> DbResult<()> {
        let pid = {
            let mut guard = page.write();
            guard.mark_dirty(tid);
            guard.pid()
        };
        let mut cache = self.cache.lock();
        if !cache.pages.contains_key(&pid) {
            if cache.pages.len() >= self.capacity {
                Self::evict_one(&mut cache)?;
            }
            cache.pages.insert(pid, page);
        }
        cache.lru.touch(pid);
        Ok(())
    }

    /// Writes the page to disk and clears its dirty mark. Idempotent on
    /// clean or uncached pages.
    pub fn flush_page(&self, pid: PageId) -> DbResult<()> {
        let page = self.cache.lock().pages.get(&pid).cloned();
        if let Some(page) = page {
            let mut guard = page.write();
            if guard.dirty_by().is_some() {
                self.catalog.file(pid.table)?.write_page(&guard)?;
                guard.mark_clean();
                trace!("flushed {}", pid);
            }
        }
        Ok(())
    }

    /// Flushes every cached page, including pages dirtied by live
    /// transactions. That breaks the NO STEAL guarantee, so this exists
    /// for tests and administration only.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let pids: Vec<PageId> = self.cache.lock().pages.keys().copied().collect();
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Flushes every page dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        let pids: Vec<PageId> = {
            let cache = self.cache.lock();
            cache
                .pages
                .iter()
                .filter(|(_, page)| page.read().dirty_by() == Some(tid))
                .map(|(pid, _)| *pid)
                .collect()
        };
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Commits or aborts `tid`'s page-level effects, then releases all of
    /// its locks. On commit the dirty pages are forced to disk and become
    /// the new clean state; on abort they are restored from their
    /// before-images without touching disk.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let result = if commit {
            self.flush_pages(tid)
        } else {
            self.rollback(tid);
            Ok(())
        };
        // Locks fall even when a commit-time flush failed; the transaction
        // is finished either way.
        self.lock_manager.release_all_locks(tid);
        result
    }

    fn rollback(&self, tid: TransactionId) {
        let pages: Vec<Arc<RwLock<HeapPage>>> =
            self.cache.lock().pages.values().cloned().collect();
        let mut restored = 0;
        for page in pages {
            let mut guard = page.write();
            if guard.dirty_by() == Some(tid) {
                guard.restore_before_image();
                restored += 1;
            }
        }
        debug!("{} rolled back {} pages", tid, restored);
    }

    /// Drops the page from the cache without flushing.
    pub fn discard_page(&self, pid: PageId) {
        let mut cache = self.cache.lock();
        cache.pages.remove(&pid);
        cache.lru.remove(pid);
    }

    /// True iff `tid` holds any lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_any_lock(tid, pid)
    }

    /// Releases `tid`'s lock on one page before the transaction ends.
    /// Only safe on pages the transaction has not modified and will not
    /// rely on rereading; the heap file uses it after peeking at a full
    /// page.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release_lock(tid, pid);
    }
}
