//! Slotted heap page.
//!
//! Layout: a header bitmap of `num_slots` bits (bit `i` lives in byte
//! `i / 8`, LSB-first), followed by `num_slots` fixed-size tuple slots.
//! `num_slots = floor(page_size * 8 / (tuple_size * 8 + 1))`; the header
//! occupies `ceil(num_slots / 8)` bytes and the remainder of the page is
//! zero padding. A set bit means the slot holds an encoded tuple; the
//! bytes of an unused slot are unspecified but round-trip through
//! serialization untouched.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::access::tuple::{Tuple, TupleDesc};
use crate::error::{DbError, DbResult};
use crate::storage::page::{PageId, RecordId};
use crate::transaction::id::TransactionId;

pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    data: BytesMut,
    dirty_by: Option<TransactionId>,
    /// Snapshot of the last clean state; rollback target for
    /// modifications made by an uncommitted transaction.
    before_image: Bytes,
}

impl HeapPage {
    /// Number of slots a page of `page_size` bytes can hold for tuples of
    /// `tuple_size` bytes, accounting for one header bit per slot.
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    /// Header length in bytes for a page with `num_slots` slots.
    pub fn header_len(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Parses a page from `page_size` raw bytes.
    pub fn parse(pid: PageId, desc: Arc<TupleDesc>, data: &[u8]) -> DbResult<Self> {
        let data = BytesMut::from(data);
        let before_image = Bytes::copy_from_slice(&data);
        Ok(Self {
            pid,
            desc,
            data,
            dirty_by: None,
            before_image,
        })
    }

    /// Builds an empty page (all header bits clear).
    pub fn empty(pid: PageId, desc: Arc<TupleDesc>, page_size: usize) -> Self {
        let data = BytesMut::zeroed(page_size);
        let before_image = Bytes::copy_from_slice(&data);
        Self {
            pid,
            desc,
            data,
            dirty_by: None,
            before_image,
        }
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn num_slots(&self) -> usize {
        Self::slots_per_page(self.data.len(), self.desc.tuple_size())
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        debug_assert!(slot < self.num_slots());
        self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        debug_assert!(slot < self.num_slots());
        if used {
            self.data[slot / 8] |= 1 << (slot % 8);
        } else {
            self.data[slot / 8] &= !(1 << (slot % 8));
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots()).filter(|&i| !self.is_slot_used(i)).count()
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let tuple_size = self.desc.tuple_size();
        let start = Self::header_len(self.num_slots()) + slot * tuple_size;
        start..start + tuple_size
    }

    /// Writes the tuple into the lowest unused slot, sets the header bit,
    /// and stamps the tuple's record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> DbResult<u16> {
        if !tuple.desc().same_types(&self.desc) {
            return Err(DbError::SchemaMismatch);
        }
        let slot = (0..self.num_slots())
            .find(|&i| !self.is_slot_used(i))
            .ok_or(DbError::PageFull { pid: self.pid })?;
        let range = self.slot_range(slot);
        self.data[range].copy_from_slice(&tuple.encode());
        self.set_slot_used(slot, true);
        tuple.set_record_id(Some(RecordId::new(self.pid, slot as u16)));
        Ok(slot as u16)
    }

    /// Clears the header bit for the tuple's slot. The slot bytes are left
    /// in place.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let slot = rid.slot as usize;
        if rid.pid != self.pid || slot >= self.num_slots() || !self.is_slot_used(slot) {
            return Err(DbError::TupleNotFound { rid });
        }
        self.set_slot_used(slot, false);
        Ok(())
    }

    /// Decodes the tuple in `slot`, which must be occupied.
    pub fn tuple_at(&self, slot: usize) -> DbResult<Tuple> {
        if slot >= self.num_slots() || !self.is_slot_used(slot) {
            return Err(DbError::TupleNotFound {
                rid: RecordId::new(self.pid, slot as u16),
            });
        }
        let mut tuple = Tuple::decode(self.desc.clone(), &self.data[self.slot_range(slot)])?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot as u16)));
        Ok(tuple)
    }

    /// Iterates the occupied slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Tuple> + '_ {
        (0..self.num_slots()).filter(|&i| self.is_slot_used(i)).map(move |i| {
            self.tuple_at(i)
                .expect("occupied slot holds a valid encoded tuple")
        })
    }

    /// Produces the page's exact on-disk image (`page_size` bytes).
    pub fn serialize(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    /// Marks the page dirty on behalf of `tid`. The before-image snapshotted
    /// at the last clean point (construction or [`mark_clean`](Self::mark_clean))
    /// becomes the rollback target.
    pub fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirty_by = Some(tid);
    }

    /// Clears the dirty mark and re-snapshots the before-image; the current
    /// bytes have just been written to disk and are the new clean state.
    pub fn mark_clean(&mut self) {
        self.dirty_by = None;
        self.before_image = self.serialize();
    }

    pub fn dirty_by(&self) -> Option<TransactionId> {
        self.dirty_by
    }

    /// Rolls the in-memory state back to the before-image and clears the
    /// dirty mark.
    pub fn restore_before_image(&mut self) {
        self.data = BytesMut::from(&self.before_image[..]);
        self.dirty_by = None;
    }
}
