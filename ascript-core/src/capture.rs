use std::collections::BTreeSet;

use ascript_protocol::CompileError;
use ascript_protocol::CompileErrorKind;
use ascript_protocol::Verb;
use ascript_protocol::RESERVED_VARIABLE_NAMES;

use crate::expand::ExpandedOp;

/// A script may declare at most this many `captureAs` bindings (main and
/// cleanup combined); generous enough for any realistic pipeline, small
/// enough that the variable-resolution pass never has to deal with an
/// unbounded environment.
pub const MAX_CAPTURES: usize = 16;

/// Outcome of walking every expanded step for `captureAs` declarations
/// (§4.2): the set of names a script may reference once bound, and the
/// subset of those whose value came directly from a spawned process,
/// exactly the names the variable resolver must refuse inside a `ProcRun`.
#[derive(Debug, Clone, Default)]
pub struct CaptureAnalysis {
    pub declared_names: BTreeSet<String>,
    pub process_tainted_names: BTreeSet<String>,
}

pub fn analyze_captures(main: &[ExpandedOp], cleanup: &[ExpandedOp]) -> Result<CaptureAnalysis, CompileError> {
    let mut analysis = CaptureAnalysis::default();
    let mut total = 0usize;

    for (step_index, expanded) in main.iter().chain(cleanup.iter()).enumerate() {
        let Some(name) = &expanded.operation.capture_as else { continue };

        if RESERVED_VARIABLE_NAMES.contains(&name.as_str()) {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::CaptureViolation,
                format!("captureAs cannot bind to the reserved name {name:?}"),
            ));
        }
        if !is_valid_capture_name(name) {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::CaptureViolation,
                format!("captureAs name {name:?} must start with a letter or underscore and contain only letters, digits, or underscores"),
            ));
        }
        if !analysis.declared_names.insert(name.clone()) {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::CaptureViolation,
                format!("captureAs name {name:?} is already bound earlier in this script"),
            ));
        }

        total += 1;
        if total > MAX_CAPTURES {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::CaptureViolation,
                format!("script declares more than {MAX_CAPTURES} captures"),
            ));
        }

        if expanded.operation.verb.is_process_spawning() {
            analysis.process_tainted_names.insert(name.clone());
        }
    }

    Ok(analysis)
}

fn is_valid_capture_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
