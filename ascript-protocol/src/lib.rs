//! Wire and in-memory data model shared by every stage of the agent command
//! language pipeline: `Script → Expand → Validate → Resolve → Compile →
//! Execute → Audit`. This crate defines the shapes; it contains no
//! validation or execution logic of its own.

mod audit;
mod compiled;
mod error;
mod operation;
mod options;
mod result;
mod script;
mod verb;
mod workspace;

pub use audit::AuditEntry;
pub use compiled::CommandKind;
pub use compiled::CompiledCommand;
pub use compiled::CompiledScript;
pub use compiled::CompiledStep;
pub use error::CompileError;
pub use error::CompileErrorKind;
pub use operation::ForEachSpec;
pub use operation::IfSpec;
pub use operation::OnFailure;
pub use operation::Operation;
pub use operation::PatchSpec;
pub use operation::Predicate;
pub use operation::TemplateSpec;
pub use options::ExecutionOptions;
pub use options::FailureMode;
pub use result::ScriptResult;
pub use result::StepResult;
pub use script::Script;
pub use verb::Verb;
pub use workspace::RESERVED_VARIABLE_NAMES;
pub use workspace::WorkspaceContext;
