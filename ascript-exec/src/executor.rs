use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use ascript_protocol::AuditEntry;
use ascript_protocol::CommandKind;
use ascript_protocol::CompiledScript;
use ascript_protocol::CompiledStep;
use ascript_protocol::FailureMode;
use ascript_protocol::ScriptResult;
use ascript_protocol::StepResult;
use rand::Rng;
use tokio::sync::Notify;

use crate::audit;
use crate::dispatch;
use crate::error::ExecError;
use crate::in_memory;
use crate::state::ExecutionState;

/// Default exponential back-off between retries of the same step:
/// `retry_delay_ms * 2^attempt`, jittered by +/-20% so a batch of scripts
/// retrying the same flaky dependency doesn't all wake up in lockstep.
fn backoff(base_delay_ms: u64, attempt: u32) -> Duration {
    if base_delay_ms == 0 {
        return Duration::ZERO;
    }
    let scaled = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter = rand::rng().random_range(0.8..1.2);
    Duration::from_millis((scaled as f64 * jitter) as u64)
}

fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Runs a fully compiled script to completion (§4.10). `cancel` is notified
/// by the caller to abort the run early; it is threaded straight through to
/// every process step's own timeout race, the same `Arc<Notify>` pattern
/// `run_process` already uses internally. Returns the `ScriptResult` together
/// with one `AuditEntry` per executed step, `job_id` tagging every entry so a
/// host can correlate a run's audit trail across multiple scripts.
pub async fn execute(compiled: &CompiledScript, job_id: &str, cancel: Arc<Notify>) -> (ScriptResult, Vec<AuditEntry>) {
    let overall_start = Instant::now();
    let overall_started_at_unix_ms = unix_ms_now();
    let options = &compiled.effective_options;
    let script_deadline = overall_start + Duration::from_millis(options.script_timeout_ms);

    let sandbox_root = compiled.workspace.sandbox_root();
    let working_directory = compiled.workspace.working_directory.as_path();
    let mut state = ExecutionState::new();
    let (main_results, all_succeeded, script_timed_out) = run_main_steps(
        &compiled.steps,
        &compiled.label_index,
        &mut state,
        options,
        script_deadline,
        sandbox_root,
        working_directory,
        &cancel,
    )
    .await;

    let run_cleanup = match options.failure_mode {
        FailureMode::StopOnFirstError => all_succeeded,
        FailureMode::ContinueOnError | FailureMode::StopAndCleanup => true,
    };

    let cleanup_results = if run_cleanup {
        run_cleanup_steps(&compiled.cleanup_steps, &mut state, options, script_deadline, sandbox_root, working_directory, &cancel).await
    } else {
        Vec::new()
    };

    if script_timed_out {
        tracing::warn!(timeout_ms = options.script_timeout_ms, "script exceeded its overall timeout");
    }
    let result = ScriptResult {
        all_succeeded,
        steps: main_results,
        cleanup_steps: cleanup_results,
        total_duration_ms: overall_start.elapsed().as_millis() as u64,
    };
    let entries = audit::build_audit_entries(job_id, overall_started_at_unix_ms, compiled, &result);
    (result, entries)
}

async fn run_main_steps(
    steps: &[CompiledStep],
    label_index: &std::collections::BTreeMap<String, usize>,
    state: &mut ExecutionState,
    options: &ascript_protocol::ExecutionOptions,
    script_deadline: Instant,
    sandbox_root: &std::path::Path,
    working_directory: &std::path::Path,
    cancel: &Arc<Notify>,
) -> (Vec<StepResult>, bool, bool) {
    let mut results = Vec::new();
    let mut all_succeeded = true;
    let mut index = 0usize;
    let mut timed_out = false;

    while index < steps.len() {
        if Instant::now() >= script_deadline {
            timed_out = true;
            all_succeeded = false;
            break;
        }

        let step = &steps[index];
        let result = run_step(step, state, options, script_deadline, sandbox_root, working_directory, cancel).await;
        let succeeded = result.success;
        results.push(result);

        if succeeded {
            index += 1;
            continue;
        }

        all_succeeded = false;
        match step.on_failure.as_ref().and_then(|goto| label_index.get(&goto.label)) {
            Some(&target) => index = target,
            None if step.on_failure.is_some() => break,
            None => match options.failure_mode {
                FailureMode::ContinueOnError => index += 1,
                FailureMode::StopOnFirstError | FailureMode::StopAndCleanup => break,
            },
        }
    }

    (results, all_succeeded, timed_out)
}

async fn run_cleanup_steps(
    steps: &[CompiledStep],
    state: &mut ExecutionState,
    options: &ascript_protocol::ExecutionOptions,
    script_deadline: Instant,
    sandbox_root: &std::path::Path,
    working_directory: &std::path::Path,
    cancel: &Arc<Notify>,
) -> Vec<StepResult> {
    let mut results = Vec::new();
    for step in steps {
        if Instant::now() >= script_deadline {
            break;
        }
        results.push(run_step(step, state, options, script_deadline, sandbox_root, working_directory, cancel).await);
    }
    results
}

async fn run_step(
    step: &CompiledStep,
    state: &mut ExecutionState,
    options: &ascript_protocol::ExecutionOptions,
    script_deadline: Instant,
    sandbox_root: &std::path::Path,
    working_directory: &std::path::Path,
    cancel: &Arc<Notify>,
) -> StepResult {
    let started = Instant::now();

    if let Some(predicate) = &step.guard {
        if !state.evaluate_guard(predicate, sandbox_root) {
            return StepResult {
                step_index: step.step_index,
                verb: step.verb,
                success: true,
                output: None,
                error: None,
                attempts: 0,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    }

    let mut attempts = 0u32;
    let mut last_output = None;
    let mut last_error = None;
    let mut succeeded = false;

    loop {
        attempts += 1;
        let remaining = script_deadline.saturating_duration_since(Instant::now());
        let step_timeout = Duration::from_millis(step.step_timeout_ms).min(remaining);

        match dispatch_step(step, state, options, step_timeout, working_directory, cancel).await {
            Ok(output) => {
                last_output = Some(output);
                succeeded = true;
                break;
            }
            Err(err) => {
                last_error = Some(err.to_string());
                if attempts > step.max_retries || Instant::now() >= script_deadline {
                    break;
                }
                tokio::time::sleep(backoff(options.retry_delay_ms, attempts - 1)).await;
            }
        }
    }

    let recorded = last_output.as_deref().or(last_error.as_deref()).unwrap_or("");
    state.record(if succeeded { step.capture_as.as_deref() } else { None }, recorded);

    StepResult {
        step_index: step.step_index,
        verb: step.verb,
        success: succeeded,
        output: last_output,
        error: last_error,
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

async fn dispatch_step(
    step: &CompiledStep,
    state: &ExecutionState,
    options: &ascript_protocol::ExecutionOptions,
    timeout: Duration,
    working_directory: &std::path::Path,
    cancel: &Arc<Notify>,
) -> Result<String, ExecError> {
    match step.command.kind {
        CommandKind::Process => {
            let outcome =
                dispatch::run_process(&step.command, working_directory, timeout, options.max_output_bytes, Arc::clone(cancel)).await?;
            if outcome.cancelled {
                return Err(ExecError::Cancelled);
            }
            if outcome.timed_out {
                return Err(ExecError::StepTimedOut);
            }
            if outcome.succeeded() {
                Ok(outcome.stdout)
            } else {
                Err(ExecError::StepFailure(if outcome.stderr.is_empty() { outcome.stdout } else { outcome.stderr }))
            }
        }
        CommandKind::InMemory => {
            let arguments = state.substitute(&step.command.arguments);
            in_memory::dispatch(&step.command.executable, &arguments, options.max_output_bytes).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ascript_protocol::CompiledCommand;
    use ascript_protocol::ExecutionOptions;
    use ascript_protocol::Verb;
    use ascript_protocol::WorkspaceContext;
    use std::collections::BTreeMap;

    fn in_memory_step(step_index: usize, verb: Verb, executable: &str, arguments: Vec<String>, capture_as: Option<&str>) -> CompiledStep {
        CompiledStep {
            step_index,
            verb,
            command: CompiledCommand { kind: CommandKind::InMemory, executable: executable.to_string(), arguments },
            max_retries: 0,
            step_timeout_ms: 5_000,
            capture_as: capture_as.map(str::to_string),
            on_failure: None,
            requested_args: Vec::new(),
            guard: None,
        }
    }

    fn script(steps: Vec<CompiledStep>) -> CompiledScript {
        CompiledScript {
            steps,
            cleanup_steps: Vec::new(),
            effective_options: ExecutionOptions::default(),
            workspace: WorkspaceContext::new("/tmp", "/tmp"),
            label_index: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn runs_steps_in_order_and_records_prev() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt").to_string_lossy().into_owned();
        let steps = vec![
            in_memory_step(0, Verb::FileWrite, "file_write", vec![path.clone(), "hi".to_string()], None),
            in_memory_step(1, Verb::FileRead, "file_read", vec![path], None),
        ];
        let (result, entries) = execute(&script(steps), "job-1", Arc::new(Notify::new())).await;
        assert!(result.all_succeeded);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].output.as_deref(), Some("hi"));
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.job_id == "job-1"));
    }

    #[tokio::test]
    async fn stop_on_first_error_halts_remaining_main_steps() {
        let steps = vec![
            in_memory_step(0, Verb::FileRead, "file_read", vec!["/does/not/exist".to_string()], None),
            in_memory_step(1, Verb::MathEval, "math_eval", vec!["1+1".to_string()], None),
        ];
        let (result, _entries) = execute(&script(steps), "job-2", Arc::new(Notify::new())).await;
        assert!(!result.all_succeeded);
        assert_eq!(result.steps.len(), 1);
    }

    #[tokio::test]
    async fn continue_on_error_runs_every_step() {
        let mut compiled = script(vec![
            in_memory_step(0, Verb::FileRead, "file_read", vec!["/does/not/exist".to_string()], None),
            in_memory_step(1, Verb::MathEval, "math_eval", vec!["1+1".to_string()], None),
        ]);
        compiled.effective_options.failure_mode = FailureMode::ContinueOnError;
        let (result, _entries) = execute(&compiled, "job-3", Arc::new(Notify::new())).await;
        assert!(!result.all_succeeded);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps[1].success);
    }

    #[tokio::test]
    async fn capture_as_binds_a_name_other_steps_can_reference() {
        let steps = vec![
            in_memory_step(0, Verb::MathEval, "math_eval", vec!["2+2".to_string()], Some("SUM")),
            in_memory_step(1, Verb::MathEval, "math_eval", vec!["$SUM".to_string()], None),
        ];
        let (result, _entries) = execute(&script(steps), "job-4", Arc::new(Notify::new())).await;
        assert_eq!(result.steps[1].output.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn proc_run_executes_with_the_workspace_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiled = script(vec![CompiledStep {
            step_index: 0,
            verb: Verb::ProcRun,
            command: CompiledCommand { kind: CommandKind::Process, executable: "pwd".to_string(), arguments: vec![] },
            max_retries: 0,
            step_timeout_ms: 5_000,
            capture_as: None,
            on_failure: None,
            requested_args: Vec::new(),
            guard: None,
        }]);
        compiled.workspace = WorkspaceContext::new(dir.path(), dir.path());
        let (result, _entries) = execute(&compiled, "job-5", Arc::new(Notify::new())).await;
        assert!(result.all_succeeded);
        let canonical_dir = dir.path().canonicalize().unwrap();
        let reported = std::path::Path::new(result.steps[0].output.as_deref().unwrap().trim()).canonicalize().unwrap();
        assert_eq!(reported, canonical_dir);
    }
}
