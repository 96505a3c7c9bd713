use super::Policy;
use crate::table::ThreadTable;

/// Cyclic scan of the thread table by slot index, starting after the
/// current slot. Slot 0 (the main thread) takes its turn like any other.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_next_ready(table: &ThreadTable, start: usize, skip: usize) -> Option<usize> {
        let capacity = table.capacity();
        (0..capacity)
            .map(|offset| (start + offset) % capacity)
            .find(|&slot| slot != skip && table.is_ready(slot))
    }
}

impl Policy for RoundRobin {
    fn name(&self) -> &str {
        "round-robin"
    }

    fn thread_ready(&mut self, _slot: usize) {}

    fn thread_removed(&mut self, _slot: usize) {}

    fn pick_next(&mut self, current: usize, table: &ThreadTable) -> Option<usize> {
        if table.capacity() == 0 {
            return None;
        }
        Self::find_next_ready(table, current + 1, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tests::table_with;
    use crate::thread::ThreadState::{Ready, Running, Terminated};

    #[test]
    fn test_cyclic_scan() {
        let table = table_with(&[Ready, Ready, Running, Ready]);
        let mut rr = RoundRobin::new();
        assert_eq!(rr.pick_next(2, &table), Some(3));
        assert_eq!(rr.pick_next(3, &table), Some(0));
        assert_eq!(rr.pick_next(0, &table), Some(1));
        assert_eq!(rr.pick_next(1, &table), Some(3));
    }

    #[test]
    fn test_skips_terminated_and_self() {
        let table = table_with(&[Running, Terminated, Terminated]);
        let mut rr = RoundRobin::new();
        assert_eq!(rr.pick_next(0, &table), None);

        let table = table_with(&[Ready, Running]);
        assert_eq!(rr.pick_next(1, &table), Some(0));
    }
}
