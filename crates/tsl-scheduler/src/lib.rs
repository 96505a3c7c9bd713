//! Cooperative user-level threads multiplexed onto one OS thread.
//!
//! ```no_run
//! use tsl_scheduler::{SchedulingPolicy, YieldTarget};
//!
//! let tsl = tsl_scheduler::init(SchedulingPolicy::Fcfs).unwrap();
//! let worker = tsl
//!     .create(move || {
//!         for i in 0..3 {
//!             println!("worker step {i}");
//!             tsl.yield_now(YieldTarget::Any).unwrap();
//!         }
//!     })
//!     .unwrap();
//! tsl.join(worker).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod ops;
pub mod policy;
mod runtime;
pub mod scheduler;
pub mod table;
pub mod thread;


pub use config::{SchedulerConfig, SchedulerConfigBuilder, SchedulingPolicy};
pub use context::{ContextError, StackError, MIN_STACK_SIZE};
pub use error::{ConfigError, TslError, TslResult};
pub use ops::{handle, init, init_with_config, init_with_policy, Handle};
pub use policy::Policy;
pub use scheduler::{SchedulerStats, MAIN_SLOT};
pub use table::ThreadTable;
pub use thread::{ThreadState, Tid, YieldTarget};
