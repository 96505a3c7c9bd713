//! Ordering policies for ready threads.

mod fcfs;
mod random;
mod round_robin;

pub use fcfs::Fcfs;
pub use random::Random;
pub use round_robin::RoundRobin;

use crate::config::{SchedulerConfig, SchedulingPolicy};
use crate::table::ThreadTable;

/// Decides which ready thread runs next.
///
/// The scheduler reports every thread that becomes ready through
/// [`Policy::thread_ready`] and every ready thread that leaves the ready set
/// without being picked (cancelled, or resumed by a directed yield) through
/// [`Policy::thread_removed`]. Slots are thread table indices.
pub trait Policy {
    fn name(&self) -> &str;

    fn thread_ready(&mut self, slot: usize);

    fn thread_removed(&mut self, slot: usize);

    /// Pick the next slot to run instead of `current`.
    ///
    /// The returned slot must be ready in `table` and differ from `current`.
    /// `None` means no other thread can run. The picked slot counts as
    /// removed from the ready set.
    fn pick_next(&mut self, current: usize, table: &ThreadTable) -> Option<usize>;
}

pub fn build(config: &SchedulerConfig) -> Box<dyn Policy> {
    match config.policy {
        SchedulingPolicy::Fcfs => Box::new(Fcfs::new()),
        SchedulingPolicy::RoundRobin => Box::new(RoundRobin::new()),
        SchedulingPolicy::Random => Box::new(Random::new(config.random_seed)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::thread::{ThreadControlBlock, ThreadState, Tid};

    /// Table whose slot `i` holds tid `i` in the given state.
    pub(crate) fn table_with(states: &[ThreadState]) -> ThreadTable {
        let mut table = ThreadTable::with_capacity(states.len() + 2);
        for (tid, state) in states.iter().enumerate() {
            let mut tcb = Box::new(ThreadControlBlock::main(tid as Tid));
            tcb.state = *state;
            table.insert(tcb).unwrap();
        }
        table
    }

    #[test]
    fn test_build_names() {
        let mut config = SchedulerConfig::default();
        assert_eq!(build(&config).name(), "fcfs");
        config.policy = SchedulingPolicy::RoundRobin;
        assert_eq!(build(&config).name(), "round-robin");
        config.policy = SchedulingPolicy::Random;
        assert_eq!(build(&config).name(), "random");
    }
}
