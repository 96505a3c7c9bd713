use core::fmt;
use core::ptr::NonNull;

use context::{EntryFn, ExecutionContext, Stack};

use crate::config::SchedulerConfig;
use crate::error::{TslError, TslResult};
use crate::policy::Policy;
use crate::table::ThreadTable;
use crate::thread::{ThreadControlBlock, ThreadEntry, ThreadState, Tid, YieldTarget};

/// Slot the main thread occupies for the scheduler's whole life.
pub const MAIN_SLOT: usize = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub context_switches: u64,
    pub threads_created: u64,
    pub threads_reaped: u64,
    /// Threads that have not terminated, main included.
    pub live_threads: usize,
    pub ready_threads: usize,
}

/// A context switch decided by the scheduler but not yet performed.
///
/// Both pointers target contexts inside boxed TCBs, so they stay valid after
/// the scheduler borrow that produced them ends.
#[derive(Debug)]
pub struct SwitchPlan {
    pub from: NonNull<ExecutionContext>,
    pub to: NonNull<ExecutionContext>,
    pub from_tid: Tid,
    pub to_tid: Tid,
}

/// A `create` that registered nothing.
pub struct CreateRejected {
    pub error: TslError,
    /// The start function that was handed in.
    pub entry: Option<ThreadEntry>,
}

impl fmt::Debug for CreateRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateRejected")
            .field("error", &self.error)
            .field("entry", &self.entry.as_ref().map(|_| "<closure>"))
            .finish()
    }
}

impl From<CreateRejected> for TslError {
    fn from(rejected: CreateRejected) -> Self {
        rejected.error
    }
}

pub enum JoinStatus {
    /// The thread had terminated and its slot has been released.
    Reaped(Box<ThreadControlBlock>),
    Pending,
}

/// Thread table, ready ordering and lifecycle bookkeeping of one OS thread.
///
/// Every operation here only updates bookkeeping. Operations that hand the
/// processor to another thread return a [`SwitchPlan`] for the caller to carry
/// out once it no longer borrows the scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    table: ThreadTable,
    policy: Box<dyn Policy>,
    current: usize,
    next_tid: Tid,
    /// Stacks of exited threads, released by whichever thread runs next.
    retired: Vec<Stack>,
    trampoline: EntryFn,
    context_switches: u64,
    threads_created: u64,
    threads_reaped: u64,
}

impl Scheduler {
    /// Build a scheduler with the calling computation registered as the
    /// running main thread. New threads start in `trampoline(tid)`.
    pub fn new(
        config: SchedulerConfig,
        policy: Box<dyn Policy>,
        trampoline: EntryFn,
    ) -> TslResult<Self> {
        config.validate()?;

        let mut table = ThreadTable::with_capacity(config.max_threads);
        let main = Box::new(ThreadControlBlock::main(config.main_tid));
        let slot = table.insert(main).map_err(|_| TslError::TableFull)?;
        debug_assert_eq!(slot, MAIN_SLOT);

        Ok(Self {
            next_tid: config.main_tid + 1,
            config,
            table,
            policy,
            current: slot,
            retired: Vec::new(),
            trampoline,
            context_switches: 0,
            threads_created: 0,
            threads_reaped: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn current_tid(&self) -> Tid {
        self.tcb(self.current).map_or(self.config.main_tid, |tcb| tcb.tid)
    }

    /// Occupied slots, main and terminated-but-unjoined threads included.
    pub fn thread_count(&self) -> usize {
        self.table.len()
    }

    pub fn state_of(&self, tid: Tid) -> TslResult<ThreadState> {
        let slot = self.resolve(tid)?;
        Ok(self.tcb(slot)?.state)
    }

    pub fn stats(&self) -> SchedulerStats {
        let (live, ready) = self.table.iter().fold((0, 0), |(live, ready), (_, tcb)| {
            (
                live + usize::from(!tcb.is_terminated()),
                ready + usize::from(tcb.is_ready()),
            )
        });
        SchedulerStats {
            context_switches: self.context_switches,
            threads_created: self.threads_created,
            threads_reaped: self.threads_reaped,
            live_threads: live,
            ready_threads: ready,
        }
    }

    /// Register a new ready thread that will run `entry`. Never switches.
    ///
    /// On failure nothing is registered and `entry` comes back inside the
    /// [`CreateRejected`], so the caller decides where it is dropped.
    pub fn create(&mut self, entry: ThreadEntry) -> Result<Tid, CreateRejected> {
        let (tid, context, stack) = match self.allocate_thread() {
            Ok(parts) => parts,
            Err(error) => {
                return Err(CreateRejected {
                    error,
                    entry: Some(entry),
                })
            }
        };

        let tcb = Box::new(ThreadControlBlock::new(tid, context, stack, entry));
        let slot = match self.table.insert(tcb) {
            Ok(slot) => slot,
            Err(mut tcb) => {
                return Err(CreateRejected {
                    error: TslError::TableFull,
                    entry: tcb.entry.take(),
                })
            }
        };
        self.policy.thread_ready(slot);
        self.next_tid = tid + 1;
        self.threads_created += 1;

        log::debug!("created thread {tid} in slot {slot}");
        Ok(tid)
    }

    fn allocate_thread(&self) -> TslResult<(Tid, ExecutionContext, Stack)> {
        if self.table.is_full() {
            return Err(TslError::TableFull);
        }
        let tid = self.next_tid;
        tid.checked_add(1).ok_or(TslError::TableFull)?;

        let stack = Stack::new(self.config.stack_size)?;
        let mut context = ExecutionContext::new();
        context.bind(&stack, self.trampoline, tid)?;
        Ok((tid, context, stack))
    }

    /// Give up the processor. The caller becomes ready again.
    pub fn prepare_yield(&mut self, target: YieldTarget) -> TslResult<SwitchPlan> {
        let current = self.current;
        let next = match target {
            YieldTarget::Any => self
                .policy
                .pick_next(current, &self.table)
                .ok_or(TslError::NoRunnableThread)?,
            YieldTarget::Thread(tid) => {
                let slot = self
                    .table
                    .slot_of(tid)
                    .filter(|&slot| slot != current && self.table.is_ready(slot))
                    .ok_or(TslError::InvalidTarget(tid))?;
                self.policy.thread_removed(slot);
                slot
            }
        };

        self.tcb_mut(current)?.state = ThreadState::Ready;
        self.policy.thread_ready(current);
        self.switch_to(next)
    }

    /// Terminate the calling thread and hand the processor to the next ready
    /// thread. Fails with [`TslError::NoRunnableThread`] if there is none; the
    /// caller is terminated either way.
    pub fn prepare_exit(&mut self) -> TslResult<SwitchPlan> {
        let current = self.current;
        let next = self.policy.pick_next(current, &self.table);

        let tcb = self
            .table
            .get_mut(current)
            .ok_or(TslError::NotInitialized)?;
        tcb.state = ThreadState::Terminated;
        let tid = tcb.tid;
        self.retired.extend(tcb.stack.take());
        self.policy.thread_removed(current);
        log::debug!("thread {tid} exited");

        match next {
            Some(next) => self.switch_to(next),
            None => Err(TslError::NoRunnableThread),
        }
    }

    /// Reap `tid` if it has terminated.
    pub fn join_status(&mut self, tid: Tid) -> TslResult<JoinStatus> {
        if tid == self.current_tid() {
            return Err(TslError::SelfJoinRejected);
        }
        let slot = self.resolve(tid)?;
        if !self.tcb(slot)?.is_terminated() {
            return Ok(JoinStatus::Pending);
        }

        self.policy.thread_removed(slot);
        let tcb = self.table.remove(slot).ok_or(TslError::UnknownThread(tid))?;
        self.threads_reaped += 1;
        log::debug!("joined thread {tid}, slot {slot} released");
        Ok(JoinStatus::Reaped(tcb))
    }

    /// Terminate a ready thread without running any more of its code.
    pub fn cancel(&mut self, tid: Tid) -> TslResult<()> {
        if tid == self.current_tid() {
            return Err(TslError::SelfCancelRejected);
        }
        let slot = self.resolve(tid)?;
        let tcb = self.tcb_mut(slot)?;
        if tcb.is_terminated() {
            return Err(TslError::AlreadyTerminated(tid));
        }
        let started = tcb.has_started();
        tcb.state = ThreadState::Terminated;
        self.policy.thread_removed(slot);
        log::debug!("cancelled thread {tid} (started: {started})");
        Ok(())
    }

    /// Detach the stacks of terminated threads that have not been joined yet.
    /// Their slots stay allocated until `join`.
    pub fn reclaim(&mut self) -> Vec<Stack> {
        let current = self.current;
        let stacks: Vec<Stack> = self
            .table
            .iter_mut()
            .filter(|(slot, tcb)| *slot != current && tcb.is_terminated())
            .filter_map(|(_, tcb)| tcb.stack.take())
            .collect();
        if !stacks.is_empty() {
            log::debug!("reclaimed {} stacks", stacks.len());
        }
        stacks
    }

    /// Stacks retired by exited threads. Only call once execution has left
    /// every one of them, that is, right after a switch.
    pub fn drain_retired(&mut self) -> Vec<Stack> {
        core::mem::take(&mut self.retired)
    }

    /// Hand out the start function of `tid`, once.
    pub fn take_entry(&mut self, tid: Tid) -> Option<ThreadEntry> {
        let slot = self.table.slot_of(tid)?;
        self.table.get_mut(slot)?.entry.take()
    }

    fn switch_to(&mut self, next: usize) -> TslResult<SwitchPlan> {
        let current = self.current;
        let from_tcb = self.tcb_mut(current)?;
        let from_tid = from_tcb.tid;
        let from = NonNull::from(&mut from_tcb.context);

        let to_tcb = self.tcb_mut(next)?;
        to_tcb.state = ThreadState::Running;
        let to_tid = to_tcb.tid;
        let to = NonNull::from(&mut to_tcb.context);

        self.current = next;
        self.context_switches += 1;
        Ok(SwitchPlan {
            from,
            to,
            from_tid,
            to_tid,
        })
    }

    /// Undo the bookkeeping of a plan whose switch was refused. The target
    /// goes back to the ready set and the caller is running again. An exiting
    /// caller stays terminated but gets its stack back, since it is still
    /// executing on it.
    pub fn abort_switch(&mut self, plan: &SwitchPlan) {
        let (Some(from), Some(to)) = (
            self.table.slot_of(plan.from_tid),
            self.table.slot_of(plan.to_tid),
        ) else {
            return;
        };

        if let Some(tcb) = self.table.get_mut(to) {
            tcb.state = ThreadState::Ready;
        }
        self.policy.thread_ready(to);

        if let Some(tcb) = self.table.get_mut(from) {
            if !tcb.is_terminated() {
                tcb.state = ThreadState::Running;
            } else if tcb.stack.is_none() {
                tcb.stack = self.retired.pop();
            }
        }
        self.policy.thread_removed(from);
        self.current = from;
        self.context_switches = self.context_switches.saturating_sub(1);
        log::warn!(
            "switch from thread {} to thread {} refused",
            plan.from_tid,
            plan.to_tid
        );
    }

    /// Slot of a thread that is still in the table.
    fn resolve(&self, tid: Tid) -> TslResult<usize> {
        match self.table.slot_of(tid) {
            Some(slot) => Ok(slot),
            None if self.was_assigned(tid) => Err(TslError::UnknownThread(tid)),
            None => Err(TslError::InvalidThreadId(tid)),
        }
    }

    fn was_assigned(&self, tid: Tid) -> bool {
        tid == self.config.main_tid || (tid > self.config.main_tid && tid < self.next_tid)
    }

    fn tcb(&self, slot: usize) -> TslResult<&ThreadControlBlock> {
        self.table.get(slot).ok_or(TslError::NotInitialized)
    }

    fn tcb_mut(&mut self, slot: usize) -> TslResult<&mut ThreadControlBlock> {
        self.table.get_mut(slot).ok_or(TslError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingPolicy;
    use crate::policy;
    use context::ContextStatus;

    extern "C" fn never(_: usize) -> ! {
        unreachable!("scheduler unit tests never switch")
    }

    fn scheduler(policy: SchedulingPolicy, max_threads: usize) -> Scheduler {
        let config = SchedulerConfig {
            policy,
            max_threads,
            stack_size: context::MIN_STACK_SIZE,
            ..SchedulerConfig::default()
        };
        let policy = policy::build(&config);
        Scheduler::new(config, policy, never).unwrap()
    }

    fn noop() -> ThreadEntry {
        Box::new(|| {})
    }

    #[test]
    fn test_new_registers_main() {
        let s = scheduler(SchedulingPolicy::Fcfs, 4);
        assert_eq!(s.current_tid(), 0);
        assert_eq!(s.state_of(0).unwrap(), ThreadState::Running);
        assert_eq!(s.thread_count(), 1);
        assert_eq!(s.policy_name(), "fcfs");
    }

    #[test]
    fn test_custom_main_tid() {
        let config = SchedulerConfig {
            main_tid: 100,
            ..SchedulerConfig::default()
        };
        let policy = policy::build(&config);
        let mut s = Scheduler::new(config, policy, never).unwrap();
        assert_eq!(s.current_tid(), 100);
        assert_eq!(s.create(noop()).unwrap(), 101);
        assert_eq!(s.state_of(50), Err(TslError::InvalidThreadId(50)));
    }

    #[test]
    fn test_create_until_full() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let tids: Vec<Tid> = (0..3).map(|_| s.create(noop()).unwrap()).collect();
        assert_eq!(tids, [1, 2, 3]);
        assert_eq!(s.create(noop()).map_err(TslError::from), Err(TslError::TableFull));
        assert_eq!(s.stats().ready_threads, 3);
        assert_eq!(s.stats().threads_created, 3);
        assert!(tids.iter().all(|&t| s.state_of(t) == Ok(ThreadState::Ready)));
    }

    #[test]
    fn test_fcfs_yield_order() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 8);
        for _ in 0..3 {
            s.create(noop()).unwrap();
        }
        let mut visited = Vec::new();
        for _ in 0..4 {
            let plan = s.prepare_yield(YieldTarget::Any).unwrap();
            assert_eq!(plan.from_tid, visited.last().copied().unwrap_or(0));
            visited.push(plan.to_tid);
        }
        assert_eq!(visited, [1, 2, 3, 0]);
        assert_eq!(s.stats().context_switches, 4);
    }

    #[test]
    fn test_round_robin_order() {
        let mut s = scheduler(SchedulingPolicy::RoundRobin, 8);
        for _ in 0..3 {
            s.create(noop()).unwrap();
        }
        let visited: Vec<Tid> = (0..6)
            .map(|_| s.prepare_yield(YieldTarget::Any).unwrap().to_tid)
            .collect();
        assert_eq!(visited, [1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn test_yield_alone_is_no_runnable() {
        let mut s = scheduler(SchedulingPolicy::RoundRobin, 4);
        assert!(matches!(
            s.prepare_yield(YieldTarget::Any),
            Err(TslError::NoRunnableThread)
        ));
        assert_eq!(s.state_of(0).unwrap(), ThreadState::Running);
        assert_eq!(s.stats().context_switches, 0);
    }

    #[test]
    fn test_directed_yield() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 8);
        let t1 = s.create(noop()).unwrap();
        let t2 = s.create(noop()).unwrap();

        assert!(matches!(
            s.prepare_yield(YieldTarget::Thread(0)),
            Err(TslError::InvalidTarget(0))
        ));
        assert!(matches!(
            s.prepare_yield(YieldTarget::Thread(42)),
            Err(TslError::InvalidTarget(42))
        ));

        let plan = s.prepare_yield(YieldTarget::Thread(t2)).unwrap();
        assert_eq!(plan.to_tid, t2);
        assert_eq!(s.current_tid(), t2);
        // t2 left the queue; main went to its tail behind t1.
        let plan = s.prepare_yield(YieldTarget::Any).unwrap();
        assert_eq!(plan.to_tid, t1);
        let plan = s.prepare_yield(YieldTarget::Any).unwrap();
        assert_eq!(plan.to_tid, 0);
    }

    #[test]
    fn test_plan_points_at_contexts() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        s.create(noop()).unwrap();
        let plan = s.prepare_yield(YieldTarget::Any).unwrap();
        let to = unsafe { plan.to.as_ref() };
        assert_eq!(to.status(), ContextStatus::Bound);
        let from = unsafe { plan.from.as_ref() };
        assert_eq!(from.status(), ContextStatus::Live);
    }

    #[test]
    fn test_exit_and_join() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let t1 = s.create(noop()).unwrap();
        s.prepare_yield(YieldTarget::Any).unwrap();
        assert_eq!(s.take_entry(t1).map(|_| ()), Some(()));
        assert!(s.take_entry(t1).is_none());

        let plan = s.prepare_exit().unwrap();
        assert_eq!((plan.from_tid, plan.to_tid), (t1, 0));
        assert_eq!(s.state_of(t1).unwrap(), ThreadState::Terminated);
        assert_eq!(s.drain_retired().len(), 1);
        assert!(s.drain_retired().is_empty());

        assert!(matches!(s.join_status(t1), Ok(JoinStatus::Reaped(tcb)) if tcb.tid == t1));
        assert!(matches!(s.join_status(t1), Err(TslError::UnknownThread(1))));
        assert!(matches!(s.join_status(9), Err(TslError::InvalidThreadId(9))));
        assert!(matches!(s.join_status(0), Err(TslError::SelfJoinRejected)));
        assert_eq!(s.stats().threads_reaped, 1);
        assert_eq!(s.thread_count(), 1);
    }

    #[test]
    fn test_abort_switch_restores_bookkeeping() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let t1 = s.create(noop()).unwrap();
        let plan = s.prepare_yield(YieldTarget::Any).unwrap();
        s.abort_switch(&plan);

        assert_eq!(s.current_tid(), 0);
        assert_eq!(s.state_of(0).unwrap(), ThreadState::Running);
        assert_eq!(s.state_of(t1).unwrap(), ThreadState::Ready);
        assert_eq!(s.stats().context_switches, 0);
        // Main is not queued behind t1, so t1 is still the only candidate.
        let plan = s.prepare_yield(YieldTarget::Any).unwrap();
        assert_eq!(plan.to_tid, t1);
    }

    #[test]
    fn test_rejected_create_hands_entry_back() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 1);
        let rejected = s.create(noop()).unwrap_err();
        assert_eq!(rejected.error, TslError::TableFull);
        assert!(rejected.entry.is_some());
        assert_eq!(s.thread_count(), 1);
        assert_eq!(s.stats().threads_created, 0);
    }

    #[test]
    fn test_rejected_create_does_not_consume_tid() {
        let config = SchedulerConfig {
            stack_size: 1 << 50,
            ..SchedulerConfig::default()
        };
        let policy = policy::build(&config);
        let mut s = Scheduler::new(config, policy, never).unwrap();
        let rejected = s.create(noop()).unwrap_err();
        assert_eq!(rejected.error, TslError::OutOfMemory);
        assert!(rejected.entry.is_some());
        assert_eq!(s.thread_count(), 1);
        assert_eq!(s.state_of(1), Err(TslError::InvalidThreadId(1)));
    }

    #[test]
    fn test_abort_exit_returns_stack_to_thread() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let t1 = s.create(noop()).unwrap();
        s.create(noop()).unwrap();
        s.prepare_yield(YieldTarget::Any).unwrap();
        assert_eq!(s.current_tid(), t1);

        let plan = s.prepare_exit().unwrap();
        s.abort_switch(&plan);
        assert_eq!(s.current_tid(), t1);
        assert_eq!(s.state_of(t1).unwrap(), ThreadState::Terminated);
        assert!(s.drain_retired().is_empty());
        // Still on that stack, so reclaim must leave it alone.
        assert!(s.reclaim().is_empty());
    }

    #[test]
    fn test_join_pending() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let t1 = s.create(noop()).unwrap();
        assert!(matches!(s.join_status(t1), Ok(JoinStatus::Pending)));
    }

    #[test]
    fn test_last_exit_reports_no_runnable() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        assert!(matches!(s.prepare_exit(), Err(TslError::NoRunnableThread)));
        assert_eq!(s.state_of(0).unwrap(), ThreadState::Terminated);
    }

    #[test]
    fn test_cancel() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let t1 = s.create(noop()).unwrap();
        let t2 = s.create(noop()).unwrap();

        assert_eq!(s.cancel(0), Err(TslError::SelfCancelRejected));
        assert_eq!(s.cancel(77), Err(TslError::InvalidThreadId(77)));
        s.cancel(t1).unwrap();
        assert_eq!(s.cancel(t1), Err(TslError::AlreadyTerminated(t1)));

        // The cancelled thread is never picked.
        let plan = s.prepare_yield(YieldTarget::Any).unwrap();
        assert_eq!(plan.to_tid, t2);
    }

    #[test]
    fn test_reclaim_keeps_slots() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 4);
        let t1 = s.create(noop()).unwrap();
        let t2 = s.create(noop()).unwrap();
        s.cancel(t1).unwrap();
        s.cancel(t2).unwrap();
        assert_eq!(s.reclaim().len(), 2);
        assert!(s.reclaim().is_empty());
        assert_eq!(s.thread_count(), 3);
        assert!(matches!(s.join_status(t1), Ok(JoinStatus::Reaped(_))));
    }

    #[test]
    fn test_slot_reuse_keeps_tids_unique() {
        let mut s = scheduler(SchedulingPolicy::Fcfs, 2);
        let t1 = s.create(noop()).unwrap();
        assert_eq!(s.create(noop()).map_err(TslError::from), Err(TslError::TableFull));
        s.cancel(t1).unwrap();
        assert!(matches!(s.join_status(t1), Ok(JoinStatus::Reaped(_))));
        let t2 = s.create(noop()).unwrap();
        assert_eq!(t2, 2);
        assert!(matches!(s.state_of(t1), Err(TslError::UnknownThread(1))));
    }
}
