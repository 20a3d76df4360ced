//! Heap files: unordered tuple storage over a paged backing file.
//!
//! Page `n` occupies bytes `[n * page_size, (n + 1) * page_size)`; there
//! is no file header, so the file length is always a multiple of the page
//! size. Tuple-level operations go through the buffer pool, which owns
//! locking and caching; only raw page I/O touches the file directly.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::access::tuple::{Tuple, TupleDesc};
use crate::catalog::TableId;
use crate::concurrency::lock::LockMode;
use crate::error::{DbError, DbResult};
use crate::storage::buffer::BufferPool;
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::id::TransactionId;

pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    table_id: TableId,
    desc: Arc<TupleDesc>,
    page_size: usize,
}

impl HeapFile {
    /// Opens (creating if absent) the heap file at `path`. The table id is
    /// a crc32 hash of the canonical path, so it is stable across runs.
    pub fn open(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> DbResult<Arc<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let canonical = path.canonicalize()?;
        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(DbError::CorruptHeapFile { path: canonical });
        }
        let table_id = TableId(crc32fast::hash(canonical.to_string_lossy().as_bytes()));
        Ok(Arc::new(Self {
            path: canonical,
            file: Mutex::new(file),
            table_id,
            desc,
            page_size,
        }))
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently on disk.
    pub fn num_pages(&self) -> DbResult<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Reads the page at `pid` from disk. Reading past the end of the file
    /// is an [`DbError::InvalidPage`]; a short read of an existing page
    /// surfaces as an I/O error.
    pub fn read_page(&self, pid: PageId) -> DbResult<HeapPage> {
        debug_assert_eq!(pid.table, self.table_id);
        let mut file = self.file.lock();
        let pages = (file.metadata()?.len() / self.page_size as u64) as u32;
        if pid.page_no >= pages {
            return Err(DbError::InvalidPage { pid, pages });
        }
        file.seek(SeekFrom::Start(pid.page_no as u64 * self.page_size as u64))?;
        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)?;
        HeapPage::parse(pid, self.desc.clone(), &buf)
    }

    /// Writes the page's current image to disk. Writing at `num_pages`
    /// appends; writing further past the end is an error.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let pid = page.pid();
        debug_assert_eq!(pid.table, self.table_id);
        let mut file = self.file.lock();
        let pages = (file.metadata()?.len() / self.page_size as u64) as u32;
        if pid.page_no > pages {
            return Err(DbError::InvalidPage { pid, pages });
        }
        file.seek(SeekFrom::Start(pid.page_no as u64 * self.page_size as u64))?;
        file.write_all(&page.serialize())?;
        file.sync_all()?;
        Ok(())
    }

    /// Appends a fresh, empty page and returns its id.
    fn append_empty_page(&self) -> DbResult<PageId> {
        let mut file = self.file.lock();
        let page_no = (file.metadata()?.len() / self.page_size as u64) as u32;
        file.seek(SeekFrom::End(0))?;
        file.write_all(&vec![0u8; self.page_size])?;
        file.sync_all()?;
        debug!("table {} grew to {} pages", self.table_id, page_no + 1);
        Ok(PageId::new(self.table_id, page_no))
    }

    /// Inserts a tuple into the first page with a free slot, appending a
    /// new page when the file is full. Returns the modified page so the
    /// buffer pool can mark it dirty.
    ///
    /// A full page is locked EXCLUSIVE just to inspect it; keeping that
    /// lock would block every other writer on a page this transaction
    /// never modified, so it is released again unless the transaction
    /// already held a lock on the page from earlier work.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<Arc<RwLock<HeapPage>>> {
        if !tuple.desc().same_types(&self.desc) {
            return Err(DbError::SchemaMismatch);
        }
        loop {
            for page_no in 0..self.num_pages()? {
                let pid = PageId::new(self.table_id, page_no);
                let held_before = pool.holds_lock(tid, pid);
                let page = pool.get_page(tid, pid, LockMode::Exclusive)?;
                let inserted = {
                    let mut guard = page.write();
                    if guard.num_empty_slots() > 0 {
                        guard.insert_tuple(tuple)?;
                        true
                    } else {
                        false
                    }
                };
                if inserted {
                    return Ok(page);
                }
                if !held_before {
                    pool.release_page(tid, pid);
                }
            }

            let pid = self.append_empty_page()?;
            let page = pool.get_page(tid, pid, LockMode::Exclusive)?;
            let inserted = {
                let mut guard = page.write();
                if guard.num_empty_slots() > 0 {
                    guard.insert_tuple(tuple)?;
                    true
                } else {
                    false
                }
            };
            if inserted {
                return Ok(page);
            }
            // Another transaction filled the fresh page before we locked
            // it; rescan from the top.
            pool.release_page(tid, pid);
        }
    }

    /// Deletes the tuple at its stamped record id. Returns the modified
    /// page so the buffer pool can mark it dirty.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<Arc<RwLock<HeapPage>>> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if rid.pid.table != self.table_id {
            return Err(DbError::TupleNotFound { rid });
        }
        let page = pool.get_page(tid, rid.pid, LockMode::Exclusive)?;
        page.write().delete_tuple(tuple)?;
        Ok(page)
    }

    /// Opens a rewindable cursor over every tuple in the file, in page
    /// then slot order.
    pub fn scan(self: Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapScan {
        HeapScan {
            file: self,
            pool,
            tid,
            next_page: 0,
            current: Vec::new().into_iter(),
        }
    }
}

/// Cursor over a heap file's tuples.
///
/// Takes SHARED on each page as it advances and never releases it; the
/// locks fall with the owning transaction's commit or abort (strict
/// two-phase locking).
pub struct HeapScan {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    next_page: u32,
    current: std::vec::IntoIter<Tuple>,
}

impl HeapScan {
    pub fn next(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Ok(Some(tuple));
            }
            if self.next_page >= self.file.num_pages()? {
                return Ok(None);
            }
            let pid = PageId::new(self.file.table_id(), self.next_page);
            self.next_page += 1;
            let page = self.pool.get_page(self.tid, pid, LockMode::Shared)?;
            let tuples: Vec<Tuple> = page.read().iter().collect();
            self.current = tuples.into_iter();
        }
    }

    /// Restarts the cursor at the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = Vec::new().into_iter();
    }
}
