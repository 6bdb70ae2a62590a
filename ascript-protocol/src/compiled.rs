use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::operation::OnFailure;
use crate::operation::Predicate;
use crate::options::ExecutionOptions;
use crate::verb::Verb;
use crate::workspace::WorkspaceContext;

/// Whether a compiled command dispatches to an in-process handler or spawns a
/// child process (§3). `InMemory`'s `executable` field is a marker string
/// (conventionally the verb's snake_case name) the executor uses to pick a
/// handler; it never reaches a shell or syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    InMemory,
    Process,
}

/// Post-validation, ready-to-dispatch unit (§3). By the time a
/// `CompiledCommand` exists, every argument it carries has already passed
/// variable resolution, path/URL sanitization, whitelist matching, and the
/// gigablacklist; the executor never re-validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledCommand {
    pub kind: CommandKind,
    pub executable: String,
    pub arguments: Vec<String>,
}

/// One compiled step, carrying both the dispatch-ready command and the
/// execution metadata (`§4.10`) the executor needs that isn't part of the
/// command shape itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledStep {
    pub step_index: usize,
    pub verb: Verb,
    pub command: CompiledCommand,
    pub max_retries: u32,
    pub step_timeout_ms: u64,
    pub capture_as: Option<String>,
    pub on_failure: Option<OnFailure>,
    /// The operation's resolved arguments prior to sandbox/whitelist
    /// validation wrapping them into `command`, kept for audit-entry
    /// emission (§6) so the audit trail can show requested vs. compiled.
    pub requested_args: Vec<String>,
    /// Left by the expander when this step originated from an `If` body.
    /// The executor evaluates it immediately before dispatch using the
    /// variable state at that point in the run and skips the step (recorded
    /// as a trivial success, zero attempts) when it is false. Nothing
    /// upstream of execution ever evaluates a predicate; `$PREV` and live
    /// filesystem state both only exist once steps have actually run.
    pub guard: Option<Predicate>,
}

/// Output of a successful `compile` call (§3). Pure and referentially
/// transparent with respect to the input `Script` and the configuration it
/// was built against; compiling the same script twice against the same
/// workspace and registries yields an identical `CompiledScript`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledScript {
    pub steps: Vec<CompiledStep>,
    pub cleanup_steps: Vec<CompiledStep>,
    pub effective_options: ExecutionOptions,
    pub workspace: WorkspaceContext,
    pub label_index: BTreeMap<String, usize>,
}

impl CompiledScript {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

// `WorkspaceContext` does not derive Serialize/Deserialize (it holds
// filesystem paths assembled by the host, not a wire type), so provide a
// manual impl restricted to the fields this crate actually needs to ship
// across a process boundary (used only by `ascript-cli`'s JSON harness).
impl Serialize for WorkspaceContext {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("WorkspaceContext", 4)?;
        s.serialize_field("sandbox_root", &self.sandbox_root)?;
        s.serialize_field("working_directory", &self.working_directory)?;
        s.serialize_field("run_as_user", &self.run_as_user)?;
        s.serialize_field("variables", &self.variables)?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for WorkspaceContext {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            sandbox_root: std::path::PathBuf,
            working_directory: std::path::PathBuf,
            run_as_user: Option<String>,
            variables: std::collections::BTreeMap<String, String>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(WorkspaceContext {
            sandbox_root: raw.sandbox_root,
            working_directory: raw.working_directory,
            run_as_user: raw.run_as_user,
            variables: raw.variables,
        })
    }
}
