use core::marker::PhantomData;

use crate::config::{SchedulerConfig, SchedulingPolicy};
use crate::error::{TslError, TslResult};
use crate::policy::{self, Policy};
use crate::runtime::{self, thread_trampoline};
use crate::scheduler::{JoinStatus, Scheduler, SchedulerStats};
use crate::thread::{ThreadState, Tid, YieldTarget};

/// Initialize the scheduler of the calling OS thread with default settings and
/// the given policy. The caller becomes the main thread.
pub fn init(policy: SchedulingPolicy) -> TslResult<Handle> {
    init_with_config(SchedulerConfig {
        policy,
        ..SchedulerConfig::default()
    })
}

pub fn init_with_config(config: SchedulerConfig) -> TslResult<Handle> {
    config.validate()?;
    let policy = policy::build(&config);
    init_with_policy(config, policy)
}

/// Initialize with a caller-supplied ordering policy. `config.policy` is
/// ignored.
pub fn init_with_policy(config: SchedulerConfig, policy: Box<dyn Policy>) -> TslResult<Handle> {
    if Scheduler::is_installed() {
        return Err(TslError::AlreadyInitialized);
    }
    let scheduler = Scheduler::new(config, policy, thread_trampoline)?;
    let (policy_name, max_threads, main_tid) = (
        scheduler.policy_name().to_string(),
        scheduler.config().max_threads,
        scheduler.config().main_tid,
    );
    Scheduler::install(scheduler)?;
    log::info!(
        "scheduler initialized: policy={policy_name} max_threads={max_threads} main_tid={main_tid}"
    );
    Ok(Handle::new(main_tid))
}

/// Handle of an already initialized scheduler on this OS thread.
pub fn handle() -> TslResult<Handle> {
    Scheduler::with_mut(|s| Handle::new(s.config().main_tid))
}

/// Access to the scheduler of the OS thread that created the handle.
///
/// Handles are cheap to copy and cannot leave their OS thread.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    main_tid: Tid,
    _not_send: PhantomData<*const ()>,
}

impl Handle {
    fn new(main_tid: Tid) -> Self {
        Self {
            main_tid,
            _not_send: PhantomData,
        }
    }

    /// Create a ready thread running `f`. It first runs when the scheduler
    /// picks it; this call never switches.
    pub fn create<F>(&self, f: F) -> TslResult<Tid>
    where
        F: FnOnce() + 'static,
    {
        // A rejected closure is dropped here, after the scheduler borrow ends,
        // so its destructor may call back into the library.
        Scheduler::with_mut(|s| s.create(Box::new(f)))?.map_err(TslError::from)
    }

    /// Let another thread run. Returns when the caller is scheduled again, or
    /// at once if nothing else is ready and `target` is [`YieldTarget::Any`].
    pub fn yield_now(&self, target: YieldTarget) -> TslResult<()> {
        match Scheduler::try_with_mut(|s| s.prepare_yield(target)) {
            Ok(plan) => runtime::switch(plan),
            Err(TslError::NoRunnableThread) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn yield_any(&self) -> TslResult<()> {
        self.yield_now(YieldTarget::Any)
    }

    /// Yield until `tid` has terminated, then release it.
    pub fn join(&self, tid: Tid) -> TslResult<()> {
        loop {
            match Scheduler::try_with_mut(|s| s.join_status(tid))? {
                JoinStatus::Reaped(tcb) => {
                    drop(tcb);
                    return Ok(());
                }
                JoinStatus::Pending => self.yield_any()?,
            }
        }
    }

    /// Terminate the calling thread. When no other thread is ready the
    /// process exits with the configured status.
    ///
    /// Only returns on failure.
    pub fn exit(&self) -> TslError {
        runtime::exit_current()
    }

    pub fn cancel(&self, tid: Tid) -> TslResult<()> {
        Scheduler::try_with_mut(|s| s.cancel(tid))
    }

    /// Falls back to the main thread's id if the scheduler is out of reach.
    pub fn current_id(&self) -> Tid {
        Scheduler::with_mut(|s| s.current_tid()).unwrap_or(self.main_tid)
    }

    pub fn state(&self, tid: Tid) -> TslResult<ThreadState> {
        Scheduler::try_with_mut(|s| s.state_of(tid))
    }

    pub fn thread_count(&self) -> usize {
        Scheduler::with_mut(|s| s.thread_count()).unwrap_or_default()
    }

    pub fn stats(&self) -> SchedulerStats {
        Scheduler::with_mut(|s| s.stats()).unwrap_or_default()
    }

    pub fn policy_name(&self) -> String {
        Scheduler::with_mut(|s| s.policy_name().to_string()).unwrap_or_default()
    }

    pub fn config(&self) -> TslResult<SchedulerConfig> {
        Scheduler::with_mut(|s| s.config().clone())
    }

    /// Release the stacks of terminated threads nobody has joined yet.
    /// Returns how many were released.
    pub fn reclaim(&self) -> TslResult<usize> {
        let stacks = Scheduler::with_mut(|s| s.reclaim())?;
        let count = stacks.len();
        drop(stacks);
        Ok(count)
    }
}
