//! Execution contexts for cooperative user-level threads.
//!
//! An [`ExecutionContext`] holds the callee-saved machine state of a suspended
//! computation. A context is either bound to a [`Stack`] and an entry function
//! (so that resuming it starts that function), or filled in by switching away
//! from a running computation. [`ExecutionContext::switch`] saves the caller
//! and resumes the target in a single assembly routine.

mod arch;
pub mod context;
pub mod stack;

pub use context::{ContextError, ContextStatus, EntryFn, ExecutionContext};
pub use stack::{Stack, StackError, MIN_STACK_SIZE};
