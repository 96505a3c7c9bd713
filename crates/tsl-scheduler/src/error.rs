use core::fmt;

use context::{ContextError, StackError};

use crate::thread::Tid;

pub type TslResult<T> = Result<T, TslError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TslError {
    AlreadyInitialized,
    NotInitialized,
    /// Every thread slot is occupied.
    TableFull,
    /// A thread stack could not be mapped.
    OutOfMemory,
    /// The id was never handed out by this scheduler.
    InvalidThreadId(Tid),
    /// A directed yield named a thread that is not ready to run.
    InvalidTarget(Tid),
    NoRunnableThread,
    /// The thread existed but has already been joined.
    UnknownThread(Tid),
    AlreadyTerminated(Tid),
    SelfCancelRejected,
    SelfJoinRejected,
    Context(ContextError),
    InvalidConfig(ConfigError),
}

impl fmt::Display for TslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "scheduler already initialized on this thread"),
            Self::NotInitialized => write!(f, "scheduler not initialized on this thread"),
            Self::TableFull => write!(f, "thread table is full"),
            Self::OutOfMemory => write!(f, "out of memory allocating a thread stack"),
            Self::InvalidThreadId(tid) => write!(f, "invalid thread id {tid}"),
            Self::InvalidTarget(tid) => write!(f, "thread {tid} is not ready to run"),
            Self::NoRunnableThread => write!(f, "no runnable thread"),
            Self::UnknownThread(tid) => write!(f, "thread {tid} has already been joined"),
            Self::AlreadyTerminated(tid) => write!(f, "thread {tid} has already terminated"),
            Self::SelfCancelRejected => write!(f, "a thread cannot cancel itself"),
            Self::SelfJoinRejected => write!(f, "a thread cannot join itself"),
            Self::Context(e) => write!(f, "context error: {e}"),
            Self::InvalidConfig(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for TslError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context(e) => Some(e),
            Self::InvalidConfig(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ContextError> for TslError {
    fn from(e: ContextError) -> Self {
        Self::Context(e)
    }
}

impl From<StackError> for TslError {
    fn from(e: StackError) -> Self {
        match e {
            StackError::OutOfMemory { .. } => Self::OutOfMemory,
            StackError::InvalidSize(size) => Self::InvalidConfig(ConfigError::StackTooSmall(size)),
        }
    }
}

impl From<ConfigError> for TslError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroThreads,
    StackTooSmall(usize),
    /// `main_tid + max_threads` does not fit in a thread id.
    TidOverflow,
    UnknownPolicy(String),
    Env { var: &'static str, message: String },
    Parse(String),
    Io(String),
    Builder(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroThreads => write!(f, "max_threads must be at least 1"),
            Self::StackTooSmall(size) => write!(
                f,
                "stack_size {size} is below the minimum of {} bytes",
                context::MIN_STACK_SIZE
            ),
            Self::TidOverflow => write!(f, "main_tid leaves no room for thread ids"),
            Self::UnknownPolicy(name) => write!(
                f,
                "unknown scheduling policy '{name}' (expected fcfs, rr or random)"
            ),
            Self::Env { var, message } => write!(f, "{var}: {message}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Io(msg) => write!(f, "io error: {msg}"),
            Self::Builder(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
