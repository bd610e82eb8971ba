//! Task lifecycle tracking for capability invocations.
//!
//! One state machine per task id: pending → in_progress → {completed |
//! failed}, with cancelled reachable from any non-terminal state. Terminal
//! statuses are permanent.

pub mod executor;

pub use executor::TaskExecutor;
