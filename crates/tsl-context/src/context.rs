use core::fmt;

use crate::arch::{self, Registers};
use crate::stack::{Stack, MIN_STACK_SIZE};

/// Function a freshly bound context starts in. It receives the argument given
/// to [`ExecutionContext::bind`] and must never return.
pub type EntryFn = extern "C" fn(usize) -> !;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// Never bound and never saved.
    Empty,
    /// Bound to a stack and entry function, not yet started.
    Bound,
    /// Suspended by a switch away from it.
    Saved,
    /// The computation currently running on this OS thread.
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// Switch target was never bound or saved, or is already running.
    NotResumable(ContextStatus),
    StackTooSmall { size: usize, required: usize },
    /// Tried to rebind the context that is currently running.
    InUse,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotResumable(status) => {
                write!(f, "execution context is not resumable (status: {status:?})")
            }
            Self::StackTooSmall { size, required } => write!(
                f,
                "stack of {size} bytes is too small (need at least {required})"
            ),
            Self::InUse => write!(f, "execution context is currently running"),
        }
    }
}

impl std::error::Error for ContextError {}

/// A saved continuation: the callee-saved registers of a suspended
/// computation, or an initial frame that starts an entry function.
pub struct ExecutionContext {
    regs: Registers,
    status: ContextStatus,
}

impl ExecutionContext {
    pub const fn new() -> Self {
        Self {
            regs: Registers::ZERO,
            status: ContextStatus::Empty,
        }
    }

    /// Slot for the computation running right now. Its registers are filled
    /// in by the first switch away from it.
    pub const fn for_current() -> Self {
        Self {
            regs: Registers::ZERO,
            status: ContextStatus::Live,
        }
    }

    /// Prepare this context so that resuming it runs `entry(arg)` on `stack`.
    ///
    /// The stack is not owned by the context; the caller keeps it alive (and
    /// unmoved in memory) for as long as the context may run.
    pub fn bind(&mut self, stack: &Stack, entry: EntryFn, arg: usize) -> Result<(), ContextError> {
        if self.status == ContextStatus::Live {
            return Err(ContextError::InUse);
        }
        if stack.usable_size() < MIN_STACK_SIZE {
            return Err(ContextError::StackTooSmall {
                size: stack.usable_size(),
                required: MIN_STACK_SIZE,
            });
        }
        // SAFETY: `top` is the upper end of a live, writable mapping of at
        // least MIN_STACK_SIZE bytes.
        self.regs = unsafe { Registers::fresh(stack.top(), entry, arg) };
        self.status = ContextStatus::Bound;
        Ok(())
    }

    pub fn status(&self) -> ContextStatus {
        self.status
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self.status, ContextStatus::Bound | ContextStatus::Saved)
    }

    /// Save the running computation into `from` and resume `to`.
    ///
    /// Returns once some later switch resumes `from`. Switching a context to
    /// itself is a no-op.
    ///
    /// # Safety
    /// - `from` must be the context of the computation calling this function.
    /// - Both pointers must be valid, and must stay valid and unmoved until
    ///   `from` is resumed.
    /// - The stack `to` was bound to (if any) must still be mapped.
    pub unsafe fn switch(
        from: *mut ExecutionContext,
        to: *mut ExecutionContext,
    ) -> Result<(), ContextError> {
        if core::ptr::eq(from, to) {
            return Ok(());
        }
        let (from, to) = unsafe { (&mut *from, &mut *to) };
        if !to.is_resumable() {
            return Err(ContextError::NotResumable(to.status));
        }

        from.status = ContextStatus::Saved;
        to.status = ContextStatus::Live;
        unsafe { arch::switch_context(&mut from.regs, &to.regs) };
        Ok(())
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("status", &self.status)
            .field("sp", &format_args!("{:#x}", self.regs.sp()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PingPong {
        main: ExecutionContext,
        child: ExecutionContext,
        trail: Vec<&'static str>,
    }

    extern "C" fn child_entry(arg: usize) -> ! {
        let pp = arg as *mut PingPong;
        unsafe {
            (*pp).trail.push("child:1");
            ExecutionContext::switch(&raw mut (*pp).child, &raw mut (*pp).main).unwrap();
            (*pp).trail.push("child:2");
            let x = core::hint::black_box(1.5f64) * 2.0;
            (*pp).trail.push(if x == 3.0 { "child:fp" } else { "child:bad-fp" });
            ExecutionContext::switch(&raw mut (*pp).child, &raw mut (*pp).main).unwrap();
        }
        unreachable!("child resumed after its final switch")
    }

    #[test]
    fn test_ping_pong() {
        let stack = Stack::new(64 * 1024).unwrap();
        let mut pp = Box::new(PingPong {
            main: ExecutionContext::for_current(),
            child: ExecutionContext::new(),
            trail: Vec::new(),
        });
        let raw: *mut PingPong = &mut *pp;
        pp.child.bind(&stack, child_entry, raw as usize).unwrap();
        assert_eq!(pp.child.status(), ContextStatus::Bound);

        unsafe {
            (*raw).trail.push("main:1");
            ExecutionContext::switch(&raw mut (*raw).main, &raw mut (*raw).child).unwrap();
            (*raw).trail.push("main:2");
            ExecutionContext::switch(&raw mut (*raw).main, &raw mut (*raw).child).unwrap();
            (*raw).trail.push("main:3");
        }

        assert_eq!(
            pp.trail,
            ["main:1", "child:1", "main:2", "child:2", "child:fp", "main:3"]
        );
        assert_eq!(pp.main.status(), ContextStatus::Live);
        assert_eq!(pp.child.status(), ContextStatus::Saved);
        assert!(stack.contains(pp.child.regs.sp()));
    }

    #[test]
    fn test_switch_to_empty_fails() {
        let mut main = ExecutionContext::for_current();
        let mut empty = ExecutionContext::new();
        let err = unsafe { ExecutionContext::switch(&mut main, &mut empty) }.unwrap_err();
        assert_eq!(err, ContextError::NotResumable(ContextStatus::Empty));
        assert_eq!(main.status(), ContextStatus::Live);
    }

    #[test]
    fn test_switch_to_live_fails() {
        let mut main = ExecutionContext::for_current();
        let mut other = ExecutionContext::for_current();
        let err = unsafe { ExecutionContext::switch(&mut main, &mut other) }.unwrap_err();
        assert_eq!(err, ContextError::NotResumable(ContextStatus::Live));
    }

    #[test]
    fn test_switch_to_self_is_noop() {
        let mut main = ExecutionContext::for_current();
        let p: *mut ExecutionContext = &mut main;
        unsafe { ExecutionContext::switch(p, p) }.unwrap();
        assert_eq!(main.status(), ContextStatus::Live);
    }

    #[test]
    fn test_bind_live_rejected() {
        extern "C" fn never(_: usize) -> ! {
            unreachable!()
        }
        let stack = Stack::new(MIN_STACK_SIZE).unwrap();
        let mut main = ExecutionContext::for_current();
        assert_eq!(main.bind(&stack, never, 0), Err(ContextError::InUse));

        let mut fresh = ExecutionContext::default();
        assert!(!fresh.is_resumable());
        fresh.bind(&stack, never, 0).unwrap();
        assert!(fresh.is_resumable());
    }
}
