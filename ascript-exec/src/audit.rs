use ascript_protocol::AuditEntry;
use ascript_protocol::CompiledScript;
use ascript_protocol::CompiledStep;
use ascript_protocol::ScriptResult;
use ascript_protocol::StepResult;

/// Projects a finished `ScriptResult` back onto the `CompiledScript` that
/// produced it into one `AuditEntry` per step (§6/§7). This is a pure
/// function over data the executor already has lying around; `execute`
/// never needs a separate handler hook to produce an audit trail.
///
/// `StepResult` only carries a relative `duration_ms`, not an absolute
/// timestamp, so entries are stamped by walking forward from
/// `overall_started_at_unix_ms`, one step's `duration_ms` at a time. This is
/// an approximation: it assumes steps ran back-to-back with no gap, which is
/// true for everything except the time spent evaluating a skipped guard.
pub fn build_audit_entries(
    job_id: &str,
    overall_started_at_unix_ms: u64,
    compiled: &CompiledScript,
    result: &ScriptResult,
) -> Vec<AuditEntry> {
    let sandbox_root = compiled.workspace.sandbox_root.to_string_lossy().into_owned();
    let mut entries = Vec::with_capacity(result.steps.len() + result.cleanup_steps.len());
    let clock = project(&mut entries, job_id, overall_started_at_unix_ms, &compiled.steps, &result.steps, &sandbox_root);
    project(&mut entries, job_id, clock, &compiled.cleanup_steps, &result.cleanup_steps, &sandbox_root);
    entries
}

fn project(
    entries: &mut Vec<AuditEntry>,
    job_id: &str,
    start_clock: u64,
    steps: &[CompiledStep],
    results: &[StepResult],
    sandbox_root: &str,
) -> u64 {
    let mut clock = start_clock;
    for (step, result) in steps.iter().zip(results.iter()) {
        let started_at = clock;
        clock = clock.saturating_add(result.duration_ms);
        entries.push(AuditEntry {
            job_id: job_id.to_string(),
            step_index: result.step_index,
            requested_verb: result.verb,
            requested_args: step.requested_args.clone(),
            compiled_executable: step.command.executable.clone(),
            compiled_args: step.command.arguments.clone(),
            exit_code: None,
            output: result.output.clone(),
            error: result.error.clone(),
            started_at_unix_ms: started_at,
            completed_at_unix_ms: clock,
            attempts: result.attempts,
            sandbox_root: sandbox_root.to_string(),
        });
    }
    clock
}
