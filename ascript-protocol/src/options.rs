use serde::Deserialize;
use serde::Serialize;

/// Script-level execution defaults (§3). Per-step `max_retries`/`step_timeout_ms`
/// on an `Operation` override these; everything else is uniform across a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub step_timeout_ms: u64,
    pub script_timeout_ms: u64,
    pub failure_mode: FailureMode,
    pub max_output_bytes: usize,
    pub max_error_bytes: usize,
    pub pipe_step_output: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        ExecutionOptions {
            max_retries: 0,
            retry_delay_ms: 0,
            step_timeout_ms: 10_000,
            script_timeout_ms: 300_000,
            failure_mode: FailureMode::StopOnFirstError,
            max_output_bytes: 64 * 1024,
            max_error_bytes: 16 * 1024,
            pipe_step_output: true,
        }
    }
}

/// How the executor composes step failures across the main step list (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    StopOnFirstError,
    ContinueOnError,
    StopAndCleanup,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let opts = ExecutionOptions::default();
        assert_eq!(opts.max_retries, 0);
        assert_eq!(opts.failure_mode, FailureMode::StopOnFirstError);
        assert!(opts.pipe_step_output);
    }

    #[test]
    fn partial_json_fills_remaining_fields_from_default() {
        let opts: ExecutionOptions =
            serde_json::from_str(r#"{"max_retries":3}"#).expect("partial options parse");
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.step_timeout_ms, 10_000);
    }
}
