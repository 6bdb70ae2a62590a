use serde::Deserialize;
use serde::Serialize;

use crate::verb::Verb;

/// Outcome of one compiled step (§6). `output`/`error` are mutually
/// exclusive in practice but both `Option` to keep the shape simple for
/// serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub verb: Verb,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Result of `execute` (§6). `all_succeeded` aggregates across main steps
/// only; cleanup failures never flip it (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResult {
    pub all_succeeded: bool,
    pub steps: Vec<StepResult>,
    pub cleanup_steps: Vec<StepResult>,
    pub total_duration_ms: u64,
}
