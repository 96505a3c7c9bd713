//! Per-OS-thread scheduler instance and the code that actually switches.
//!
//! The scheduler is only ever borrowed for the duration of a bookkeeping
//! call. Switches, thread bodies and the destructors of reaped threads all run
//! with the borrow released.

use core::cell::RefCell;
use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use context::ExecutionContext;

use crate::error::{TslError, TslResult};
use crate::scheduler::{Scheduler, SwitchPlan};

thread_local! {
    static SCHEDULER: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

impl Scheduler {
    pub(crate) fn install(scheduler: Scheduler) -> TslResult<()> {
        SCHEDULER.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_some() {
                return Err(TslError::AlreadyInitialized);
            }
            *slot = Some(scheduler);
            Ok(())
        })
    }

    pub(crate) fn is_installed() -> bool {
        SCHEDULER.with(|cell| cell.borrow().is_some())
    }

    #[inline(always)]
    pub(crate) fn with_mut<R>(f: impl FnOnce(&mut Scheduler) -> R) -> TslResult<R> {
        SCHEDULER.with(|cell| {
            let mut slot = cell.borrow_mut();
            slot.as_mut().map(f).ok_or(TslError::NotInitialized)
        })
    }

    #[inline(always)]
    pub(crate) fn try_with_mut<R>(f: impl FnOnce(&mut Scheduler) -> TslResult<R>) -> TslResult<R> {
        Self::with_mut(f)?
    }
}

/// Carry out `plan`. Returns once the calling thread is scheduled again.
pub(crate) fn switch(plan: SwitchPlan) -> TslResult<()> {
    log::trace!("switch {} -> {}", plan.from_tid, plan.to_tid);
    // SAFETY: the plan was produced for the running thread, and both contexts
    // live in boxed TCBs that stay in the table until joined. A thread cannot
    // be joined while it is the switch source or target.
    let result = unsafe { ExecutionContext::switch(plan.from.as_ptr(), plan.to.as_ptr()) };
    if let Err(e) = result {
        let _ = Scheduler::with_mut(|s| s.abort_switch(&plan));
        return Err(e.into());
    }
    finish_switch();
    Ok(())
}

/// First thing every resumed thread does: release the stacks of threads that
/// exited since, now that execution has left them.
pub(crate) fn finish_switch() {
    let retired = Scheduler::with_mut(|s| s.drain_retired()).unwrap_or_default();
    drop(retired);
}

/// Terminate the calling thread. Only returns when the scheduler could not be
/// reached; once the thread is marked terminated there is no way back into it.
pub(crate) fn exit_current() -> TslError {
    match Scheduler::try_with_mut(|s| s.prepare_exit()) {
        Ok(plan) => {
            let (from, to) = (plan.from_tid, plan.to_tid);
            match switch(plan) {
                Ok(()) => log::error!("terminated thread {from} was resumed"),
                Err(e) => log::error!("thread {from} could not hand over to thread {to}: {e}"),
            }
            std::process::abort()
        }
        Err(TslError::NoRunnableThread) => terminate_process(),
        Err(e) => e,
    }
}

fn terminate_process() -> ! {
    let code = Scheduler::with_mut(|s| s.config().exit_code).unwrap_or(0);
    log::info!("no runnable threads left, exiting with status {code}");
    let _ = std::io::stdout().flush();
    std::process::exit(code)
}

/// Entry point of every created thread.
pub(crate) extern "C" fn thread_trampoline(tid: usize) -> ! {
    finish_switch();

    let entry = Scheduler::with_mut(|s| s.take_entry(tid))
        .ok()
        .flatten();
    if let Some(entry) = entry {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
            log::error!("thread {tid} panicked: {}", panic_message(&*payload));
        }
    }

    let err = exit_current();
    log::error!("thread {tid} failed to exit: {err}");
    std::process::abort()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
