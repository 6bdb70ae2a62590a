//! The dispatch half of the pipeline: takes a `CompiledScript` the core has
//! already validated and runs it to completion, one step at a time, against
//! either a whitelisted subprocess or one of the built-in in-memory verbs.
//! Everything here assumes compile-time validation already happened; this
//! crate never re-checks a sandbox path or a process whitelist, it only
//! enforces the things that can only be known at run time: timeouts, retries,
//! `$PREV`/capture substitution, and `If` guards.

mod audit;
mod dispatch;
mod error;
mod executor;
mod in_memory;
mod math;
mod state;
mod tail_buffer;

pub use audit::build_audit_entries;
pub use dispatch::run_process;
pub use dispatch::ProcessOutcome;
pub use error::ExecError;
pub use executor::execute;
pub use state::ExecutionState;
