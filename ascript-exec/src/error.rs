use thiserror::Error;

/// The runtime-only half of the error taxonomy: everything a `CompiledScript`
/// can still fail with once it is actually dispatched, which by definition
/// could never have been caught at compile time.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("step failed: {0}")]
    StepFailure(String),
    #[error("step exceeded its timeout")]
    StepTimedOut,
    #[error("script exceeded its overall timeout")]
    ScriptTimedOut,
    #[error("execution was cancelled by the caller")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template/patch error: {0}")]
    Patch(#[from] ascript_patch::PatchError),
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
