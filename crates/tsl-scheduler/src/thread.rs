use core::fmt;

use context::{ExecutionContext, Stack};

pub type Tid = usize;

/// Start function of a thread, with its argument captured.
pub type ThreadEntry = Box<dyn FnOnce() + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Who a yielding thread hands the processor to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldTarget {
    /// Whichever ready thread the policy picks next.
    #[default]
    Any,
    Thread(Tid),
}

pub struct ThreadControlBlock {
    pub tid: Tid,
    pub state: ThreadState,
    pub context: ExecutionContext,
    /// `None` for the main thread, whose stack belongs to the OS, and once the
    /// stack has been released.
    pub stack: Option<Stack>,
    /// Taken by the trampoline when the thread first runs.
    pub entry: Option<ThreadEntry>,
}

impl ThreadControlBlock {
    pub(crate) fn main(tid: Tid) -> Self {
        Self {
            tid,
            state: ThreadState::Running,
            context: ExecutionContext::for_current(),
            stack: None,
            entry: None,
        }
    }

    /// A ready thread whose `context` is already bound to `stack`.
    pub(crate) fn new(tid: Tid, context: ExecutionContext, stack: Stack, entry: ThreadEntry) -> Self {
        Self {
            tid,
            state: ThreadState::Ready,
            context,
            stack: Some(stack),
            entry: Some(entry),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ThreadState::Ready
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    /// Whether the thread body has begun executing.
    pub fn has_started(&self) -> bool {
        self.entry.is_none()
    }
}

impl fmt::Debug for ThreadControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadControlBlock")
            .field("tid", &self.tid)
            .field("state", &self.state)
            .field("context", &self.context)
            .field("stack", &self.stack)
            .field("started", &self.has_started())
            .finish()
    }
}
