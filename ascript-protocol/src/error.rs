use thiserror::Error;

use crate::verb::Verb;

/// A verb-tagged violation discovered during expansion, validation,
/// resolution, sanitization, or compilation (§7). Fails the entire script
/// before any effect; there is no partial `CompiledScript`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{verb:?} at step {step_index}: {reason}")]
pub struct CompileError {
    pub verb: Verb,
    pub step_index: usize,
    pub reason: String,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(verb: Verb, step_index: usize, kind: CompileErrorKind, reason: impl Into<String>) -> Self {
        CompileError {
            verb,
            step_index,
            reason: reason.into(),
            kind,
        }
    }
}

/// The error taxonomy of §7, minus `StepFailure`/`Cancellation` which are
/// runtime-only and live in `ascript-exec`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("expansion")]
    Expansion,
    #[error("path violation")]
    PathViolation,
    #[error("url violation")]
    UrlViolation,
    #[error("gigablacklist violation")]
    GigaBlacklistViolation,
    #[error("capture violation")]
    CaptureViolation,
    #[error("label violation")]
    LabelViolation,
    #[error("variable violation")]
    VariableViolation,
    #[error("whitelist violation")]
    WhitelistViolation,
    #[error("arity violation")]
    ArityViolation,
    #[error("shape violation")]
    ShapeViolation,
}
