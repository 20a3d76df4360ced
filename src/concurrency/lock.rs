//! Page lock management.
//!
//! Transactions take shared or exclusive locks on pages and hold them
//! until commit or abort (strict two-phase locking). Requests that cannot
//! be granted queue FIFO per page and block on a per-page condition
//! variable; a wait-for graph is maintained so that a blocked requester
//! that closes a cycle aborts itself instead of waiting forever.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use crate::transaction::id::TransactionId;

/// Bounded wait per sleep slice; waiters re-check grantability and cycle
/// presence on every wakeup even if no notification arrived.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Lock modes supported on pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for reads.
    Shared,
    /// Exclusive lock for writes.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// True when holding `self` satisfies a request for `other`
    /// (exclusive implies shared).
    pub fn covers(&self, other: &LockMode) -> bool {
        self == other || *self == LockMode::Exclusive
    }
}

/// A pending request in a page's waiter queue.
#[derive(Debug)]
struct LockRequest {
    tid: TransactionId,
    mode: LockMode,
    #[allow(dead_code)]
    enqueued_at: Instant,
}

/// Per-page lock state: granted holders, FIFO waiter queue, and the
/// condition variable its waiters sleep on.
struct PageLockState {
    granted: HashMap<TransactionId, LockMode>,
    waiters: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
}

impl PageLockState {
    fn new() -> Self {
        Self {
            granted: HashMap::new(),
            waiters: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
        }
    }

    fn is_unused(&self) -> bool {
        self.granted.is_empty() && self.waiters.is_empty()
    }
}

#[derive(Default)]
struct LockTables {
    pages: HashMap<PageId, PageLockState>,
    /// Pages on which each transaction holds a granted lock.
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// Edge tid -> tids whose granted locks block tid's pending request.
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTables {
    fn holds(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        self.pages
            .get(&pid)
            .and_then(|p| p.granted.get(&tid))
            .is_some_and(|held| held.covers(&mode))
    }

    fn holds_any(&self, tid: TransactionId, pid: PageId) -> bool {
        self.pages
            .get(&pid)
            .is_some_and(|p| p.granted.contains_key(&tid))
    }

    /// True when `tid` holds shared on `pid` and is asking for exclusive.
    fn is_upgrade(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        mode == LockMode::Exclusive
            && self
                .pages
                .get(&pid)
                .and_then(|p| p.granted.get(&tid))
                .is_some_and(|held| *held == LockMode::Shared)
    }

    /// Compatibility against the currently granted holders. A transaction
    /// is always compatible with itself, so an upgrade is grantable
    /// exactly when `tid` is the sole holder.
    fn can_grant(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let Some(page) = self.pages.get(&pid) else {
            return true;
        };
        match mode {
            LockMode::Exclusive => page.granted.keys().all(|holder| *holder == tid),
            LockMode::Shared => page
                .granted
                .iter()
                .all(|(holder, held)| *holder == tid || held.is_compatible_with(&LockMode::Shared)),
        }
    }

    /// A waiting request runs when it is compatible with the holders and
    /// either sits at the head of the queue or is an upgrade (queued
    /// writers cannot run while the upgrader keeps its shared lock, so
    /// ordering the upgrade behind them would wedge the page).
    fn is_runnable(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        if !self.can_grant(tid, pid, mode) {
            return false;
        }
        if self.is_upgrade(tid, pid, mode) {
            return true;
        }
        self.pages
            .get(&pid)
            .and_then(|p| p.waiters.front())
            .is_some_and(|head| head.tid == tid)
    }

    /// Installs a granted lock. An upgrade replaces the shared entry.
    fn install(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) {
        let page = self.pages.entry(pid).or_insert_with(PageLockState::new);
        page.granted.insert(tid, mode);
        self.held.entry(tid).or_default().insert(pid);
    }

    /// Transactions whose granted locks conflict with the given request.
    fn blockers(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> HashSet<TransactionId> {
        let Some(page) = self.pages.get(&pid) else {
            return HashSet::new();
        };
        page.granted
            .iter()
            .filter(|(holder, held)| {
                **holder != tid
                    && match mode {
                        LockMode::Exclusive => true,
                        LockMode::Shared => **held == LockMode::Exclusive,
                    }
            })
            .map(|(holder, _)| *holder)
            .collect()
    }

    /// True when `start` sits on a cycle of the wait-for graph, i.e. it can
    /// reach itself by following edges.
    fn on_cycle(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<TransactionId> = self
            .wait_for
            .get(&start)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        while let Some(tid) = stack.pop() {
            if tid == start {
                return true;
            }
            if visited.insert(tid) {
                if let Some(next) = self.wait_for.get(&tid) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        false
    }

    /// Recomputes the whole wait-for graph from the waiter queues. Called
    /// after releases, which may change who blocks whom.
    fn rebuild_wait_for(&mut self) {
        let mut graph: HashMap<TransactionId, HashSet<TransactionId>> = HashMap::new();
        for (pid, page) in &self.pages {
            for request in &page.waiters {
                let blocking = self.blockers(request.tid, *pid, request.mode);
                if !blocking.is_empty() {
                    graph.entry(request.tid).or_default().extend(blocking);
                }
            }
        }
        self.wait_for = graph;
    }

    fn remove_waiter(&mut self, tid: TransactionId, pid: PageId) {
        if let Some(page) = self.pages.get_mut(&pid) {
            page.waiters.retain(|r| r.tid != tid);
        }
    }

    fn release_one(&mut self, tid: TransactionId, pid: PageId) {
        if let Some(page) = self.pages.get_mut(&pid) {
            page.granted.remove(&tid);
        }
        if let Some(held) = self.held.get_mut(&tid) {
            held.remove(&pid);
            if held.is_empty() {
                self.held.remove(&tid);
            }
        }
    }

    fn drop_page_if_unused(&mut self, pid: PageId) {
        if self.pages.get(&pid).is_some_and(|p| p.is_unused()) {
            self.pages.remove(&pid);
        }
    }
}

/// Page lock manager shared by all transactions of a database instance.
///
/// One mutex guards the whole lock state; waiters sleep on per-page
/// condition variables under that mutex.
pub struct LockManager {
    tables: Mutex<LockTables>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(LockTables::default()),
        }
    }

    /// Acquires (or upgrades to) a lock on `pid` for `tid`, blocking while
    /// conflicting locks are held. Fails with [`DbError::Deadlock`] when the
    /// wait would close a cycle in the wait-for graph; the caller must then
    /// roll the transaction back.
    pub fn acquire_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();

        if tables.holds(tid, pid, mode) {
            return Ok(());
        }

        // Grant immediately only when no one is queued, so that a stream of
        // readers cannot starve a waiting writer. Upgrades are the
        // exception; see `is_runnable`.
        let queue_empty = tables
            .pages
            .get(&pid)
            .map_or(true, |p| p.waiters.is_empty());
        if tables.can_grant(tid, pid, mode)
            && (queue_empty || tables.is_upgrade(tid, pid, mode))
        {
            tables.install(tid, pid, mode);
            return Ok(());
        }

        // Block: record who we wait for and make sure that does not close
        // a cycle before going to sleep.
        let blocking = tables.blockers(tid, pid, mode);
        trace!("{} blocked on {} ({:?}) by {:?}", tid, pid, mode, blocking);
        tables.wait_for.insert(tid, blocking);
        if tables.on_cycle(tid) {
            tables.wait_for.remove(&tid);
            debug!("deadlock: {} aborted requesting {:?} on {}", tid, mode, pid);
            return Err(DbError::Deadlock { tid });
        }

        let cv = {
            let page = tables.pages.entry(pid).or_insert_with(PageLockState::new);
            page.waiters.push_back(LockRequest {
                tid,
                mode,
                enqueued_at: Instant::now(),
            });
            page.cv.clone()
        };

        loop {
            let (guard, _timeout) = cv.wait_timeout(tables, WAIT_SLICE).unwrap();
            tables = guard;

            if tables.is_runnable(tid, pid, mode) {
                tables.remove_waiter(tid, pid);
                tables.wait_for.remove(&tid);
                tables.install(tid, pid, mode);
                trace!("{} granted {:?} on {}", tid, mode, pid);
                // A shared grant may unblock further shared waiters behind
                // us in the queue.
                cv.notify_all();
                return Ok(());
            }

            // Holders may have changed while we slept; refresh our edges
            // and re-run detection.
            let blocking = tables.blockers(tid, pid, mode);
            tables.wait_for.insert(tid, blocking);
            if tables.on_cycle(tid) {
                tables.remove_waiter(tid, pid);
                tables.wait_for.remove(&tid);
                tables.drop_page_if_unused(pid);
                cv.notify_all();
                debug!("deadlock: {} aborted waiting for {:?} on {}", tid, mode, pid);
                return Err(DbError::Deadlock { tid });
            }
        }
    }

    /// Releases whatever lock `tid` holds on `pid` and wakes waiters.
    pub fn release_lock(&self, tid: TransactionId, pid: PageId) {
        let mut tables = self.tables.lock().unwrap();
        tables.release_one(tid, pid);
        tables.rebuild_wait_for();
        if let Some(page) = tables.pages.get(&pid) {
            page.cv.notify_all();
        }
        tables.drop_page_if_unused(pid);
    }

    /// Releases every lock held by `tid`, removes it from all waiter
    /// queues and from the wait-for graph, and wakes waiters.
    pub fn release_all_locks(&self, tid: TransactionId) {
        let mut tables = self.tables.lock().unwrap();
        let pids: Vec<PageId> = tables
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        for pid in &pids {
            tables.release_one(tid, *pid);
        }
        for page in tables.pages.values_mut() {
            page.waiters.retain(|r| r.tid != tid);
        }
        tables.wait_for.remove(&tid);
        tables.rebuild_wait_for();
        for page in tables.pages.values() {
            page.cv.notify_all();
        }
        tables.pages.retain(|_, page| !page.is_unused());
        debug!("{} released {} page locks", tid, pids.len());
    }

    /// True iff `tid` holds an equal-or-stronger lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        self.tables.lock().unwrap().holds(tid, pid, mode)
    }

    /// True iff `tid` holds any lock on `pid`.
    pub fn holds_any_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.tables.lock().unwrap().holds_any(tid, pid)
    }

    /// Pages on which `tid` currently holds a granted lock.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.tables
            .lock()
            .unwrap()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// True while `tid` has a pending request in some waiter queue or an
    /// edge in the wait-for graph.
    pub fn is_waiting(&self, tid: TransactionId) -> bool {
        let tables = self.tables.lock().unwrap();
        tables.wait_for.contains_key(&tid)
            || tables
                .pages
                .values()
                .any(|page| page.waiters.iter().any(|r| r.tid == tid))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
