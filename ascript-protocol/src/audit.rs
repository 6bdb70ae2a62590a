use serde::Deserialize;
use serde::Serialize;

use crate::verb::Verb;

/// One audit record per executed step (§6), a pure projection of (requested
/// operation, compiled command, step result); the executor never needs a
/// handler hook to produce these (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub job_id: String,
    pub step_index: usize,
    pub requested_verb: Verb,
    pub requested_args: Vec<String>,
    pub compiled_executable: String,
    pub compiled_args: Vec<String>,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub started_at_unix_ms: u64,
    pub completed_at_unix_ms: u64,
    pub attempts: u32,
    pub sandbox_root: String,
}
