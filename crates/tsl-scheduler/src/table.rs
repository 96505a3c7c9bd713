use std::collections::BTreeMap;

use crate::thread::{ThreadControlBlock, Tid};

/// Fixed-capacity arena of thread control blocks.
///
/// Slot indices are stable for the lifetime of a thread; a slot goes back on
/// the free-list only when its thread is removed (joined). TCBs are boxed so
/// that their execution contexts never move while a switch is in flight.
pub struct ThreadTable {
    slots: Vec<Option<Box<ThreadControlBlock>>>,
    free: Vec<usize>,
    by_tid: BTreeMap<Tid, usize>,
}

impl ThreadTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            // Popped from the back, so slot 0 is handed out first.
            free: (0..capacity).rev().collect(),
            by_tid: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.by_tid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tid.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Store `tcb` in a free slot. Gives the block back if the table is full.
    pub fn insert(
        &mut self,
        tcb: Box<ThreadControlBlock>,
    ) -> Result<usize, Box<ThreadControlBlock>> {
        let Some(slot) = self.free.pop() else {
            return Err(tcb);
        };
        self.by_tid.insert(tcb.tid, slot);
        self.slots[slot] = Some(tcb);
        Ok(slot)
    }

    pub fn remove(&mut self, slot: usize) -> Option<Box<ThreadControlBlock>> {
        let tcb = self.slots.get_mut(slot)?.take()?;
        self.by_tid.remove(&tcb.tid);
        self.free.push(slot);
        Some(tcb)
    }

    pub fn get(&self, slot: usize) -> Option<&ThreadControlBlock> {
        self.slots.get(slot)?.as_deref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut ThreadControlBlock> {
        self.slots.get_mut(slot)?.as_deref_mut()
    }

    pub fn slot_of(&self, tid: Tid) -> Option<usize> {
        self.by_tid.get(&tid).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ThreadControlBlock)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, tcb)| tcb.as_deref().map(|tcb| (slot, tcb)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut ThreadControlBlock)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, tcb)| tcb.as_deref_mut().map(|tcb| (slot, tcb)))
    }

    pub fn is_ready(&self, slot: usize) -> bool {
        self.get(slot).is_some_and(ThreadControlBlock::is_ready)
    }
}
