use std::collections::BTreeMap;

use ascript_protocol::CompileError;
use ascript_protocol::CompileErrorKind;

use crate::expand::ExpandedOp;

const LABEL_MAX_LEN: usize = 64;

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= LABEL_MAX_LEN
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Builds the label-to-step-index map for the main step list and checks
/// every `onFailure: goto:<label>` reference against it (§4.3). Jumps may
/// only go forward; a script with a loop via `goto` could run forever, and
/// the expander already gives agents `ForEach` for repetition; and a label
/// is only ever meaningful within the main list; a cleanup step referencing
/// one is a shape error, not a jump target lookup.
pub fn validate_labels(main: &[ExpandedOp], cleanup: &[ExpandedOp]) -> Result<BTreeMap<String, usize>, CompileError> {
    let mut label_index = BTreeMap::new();

    for (step_index, expanded) in main.iter().enumerate() {
        let Some(label) = &expanded.operation.label else { continue };
        if !is_valid_label(label) {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::LabelViolation,
                format!("label {label:?} must be 1-{LABEL_MAX_LEN} alphanumeric/underscore/hyphen characters"),
            ));
        }
        if label_index.insert(label.clone(), step_index).is_some() {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::LabelViolation,
                format!("label {label:?} is declared more than once"),
            ));
        }
    }

    for (step_index, expanded) in main.iter().enumerate() {
        let Some(on_failure) = &expanded.operation.on_failure else { continue };
        let target = label_index.get(&on_failure.label).copied().ok_or_else(|| {
            CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::LabelViolation,
                format!("onFailure targets undeclared label {:?}", on_failure.label),
            )
        })?;
        if target <= step_index {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::LabelViolation,
                format!("onFailure at step {step_index} targets label {:?} at step {target}, which is not forward", on_failure.label),
            ));
        }
    }

    for (step_index, expanded) in cleanup.iter().enumerate() {
        if expanded.operation.on_failure.is_some() {
            return Err(CompileError::new(
                expanded.operation.verb,
                step_index,
                CompileErrorKind::LabelViolation,
                "cleanup steps may not declare onFailure",
            ));
        }
    }

    Ok(label_index)
}
