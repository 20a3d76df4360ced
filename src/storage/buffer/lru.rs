//! Recency list for the buffer pool's eviction policy.

use std::collections::HashMap;

use crate::storage::page::PageId;

#[derive(Debug)]
struct Node {
    pid: PageId,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Tracks page access order, least recently used first.
///
/// A doubly-linked list over an arena of nodes, with a hash index for
/// O(1) touch and removal. Eviction itself is decided by the buffer
/// pool, which walks the order and applies the dirty-page constraint.
#[derive(Debug, Default)]
pub struct LruList {
    nodes: Vec<Node>,
    index: HashMap<PageId, usize>,
    /// Least recently used end.
    head: Option<usize>,
    /// Most recently used end.
    tail: Option<usize>,
    /// Recycled arena slots.
    free: Vec<usize>,
}

impl LruList {
    pub fn new() -> Self {
        Self::default()
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[i].prev = None;
        self.nodes[i].next = None;
    }

    fn push_tail(&mut self, i: usize) {
        self.nodes[i].prev = self.tail;
        self.nodes[i].next = None;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(i),
            None => self.head = Some(i),
        }
        self.tail = Some(i);
    }

    /// Records an access, moving (or adding) the page to the
    /// most-recently-used end.
    pub fn touch(&mut self, pid: PageId) {
        if let Some(&i) = self.index.get(&pid) {
            self.unlink(i);
            self.push_tail(i);
            return;
        }
        let i = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot].pid = pid;
                slot
            }
            None => {
                self.nodes.push(Node {
                    pid,
                    prev: None,
                    next: None,
                });
                self.nodes.len() - 1
            }
        };
        self.index.insert(pid, i);
        self.push_tail(i);
    }

    pub fn remove(&mut self, pid: PageId) {
        if let Some(i) = self.index.remove(&pid) {
            self.unlink(i);
            self.free.push(i);
        }
    }

    /// Pages from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &PageId> {
        std::iter::successors(self.head, move |&i| self.nodes[i].next)
            .map(move |i| &self.nodes[i].pid)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
