use std::collections::VecDeque;

use super::Policy;
use crate::table::ThreadTable;

/// First come, first served: threads run in the order they became ready.
#[derive(Debug, Default)]
pub struct Fcfs {
    queue: VecDeque<usize>,
}

impl Fcfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Policy for Fcfs {
    fn name(&self) -> &str {
        "fcfs"
    }

    fn thread_ready(&mut self, slot: usize) {
        if !self.queue.contains(&slot) {
            self.queue.push_back(slot);
        }
    }

    fn thread_removed(&mut self, slot: usize) {
        self.queue.retain(|&s| s != slot);
    }

    fn pick_next(&mut self, current: usize, table: &ThreadTable) -> Option<usize> {
        while let Some(slot) = self.queue.pop_front() {
            if slot != current && table.is_ready(slot) {
                return Some(slot);
            }
            log::trace!("fcfs: dropping stale queue entry for slot {slot}");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tests::table_with;
    use crate::thread::ThreadState::{Ready, Running, Terminated};

    #[test]
    fn test_queue_order() {
        let table = table_with(&[Running, Ready, Ready, Ready]);
        let mut fcfs = Fcfs::new();
        fcfs.thread_ready(2);
        fcfs.thread_ready(1);
        fcfs.thread_ready(3);
        assert_eq!(fcfs.pick_next(0, &table), Some(2));
        assert_eq!(fcfs.pick_next(0, &table), Some(1));
        assert_eq!(fcfs.pick_next(0, &table), Some(3));
        assert_eq!(fcfs.pick_next(0, &table), None);
    }

    #[test]
    fn test_removed_and_stale_entries() {
        let table = table_with(&[Running, Ready, Terminated, Ready]);
        let mut fcfs = Fcfs::new();
        fcfs.thread_ready(1);
        fcfs.thread_ready(2);
        fcfs.thread_ready(3);
        fcfs.thread_ready(1);
        assert_eq!(fcfs.len(), 3);
        fcfs.thread_removed(1);
        assert_eq!(fcfs.pick_next(0, &table), Some(3));
        assert!(fcfs.is_empty());
    }
}
