use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ascript_protocol::CompileError;
use ascript_protocol::CompileErrorKind;
use ascript_protocol::Operation;
use ascript_protocol::Predicate;
use ascript_protocol::Verb;
use ascript_protocol::WorkspaceContext;
use regex_lite::Regex;

use crate::capture::CaptureAnalysis;
use crate::expand::ExpandedOp;

/// A step whose arguments have had every compile-time-known `$VAR` reference
/// substituted. Anything left over is either a runtime token (`$PREV`,
/// `$<captureName>`) the executor fills in immediately before dispatch, or,
/// for non-`ProcRun` verbs only, a name nobody declared, kept verbatim
/// (§4.4, §9 open question: unknown names pass through as literal text
/// rather than failing the whole script).
#[derive(Debug, Clone)]
pub struct ResolvedOp {
    pub operation: Operation,
    pub guard: Option<Predicate>,
}

#[allow(clippy::expect_used)]
fn variable_pattern() -> Regex {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern is valid")
}

fn substitute(arg: &str, known: &BTreeMap<String, String>, pattern: &Regex) -> (String, Vec<String>) {
    let mut unresolved = Vec::new();
    let mut result = String::with_capacity(arg.len());
    let mut last_end = 0;
    for m in pattern.find_iter(arg) {
        result.push_str(&arg[last_end..m.start()]);
        let name = &arg[m.start() + 1..m.end()];
        match known.get(name) {
            Some(value) => result.push_str(value),
            None => {
                unresolved.push(name.to_string());
                result.push_str(m.as_str());
            }
        }
        last_end = m.end();
    }
    result.push_str(&arg[last_end..]);
    (result, unresolved)
}

fn known_variables(workspace: &WorkspaceContext) -> BTreeMap<String, String> {
    let mut known = workspace.variables.clone();
    known.extend(workspace.builtin_variables());
    known
}

/// Resolves both step lists against the workspace's compile-time variables
/// (§4.4). `ProcRun` arguments must come out fully literal with respect to
/// `$PREV` and any capture whose value came from a spawned process
/// (`captures.process_tainted_names`), since those are exactly the runtime
/// values this pipeline can never safely parameterize a process argv with.
/// Any other unresolved `$TOKEN`, an ordinary capture or an unrecognized
/// name, is left in place as a runtime placeholder for the executor to fill
/// in immediately before dispatch.
pub fn resolve_script(
    main: &[ExpandedOp],
    cleanup: &[ExpandedOp],
    workspace: &WorkspaceContext,
    captures: &CaptureAnalysis,
) -> Result<(Vec<ResolvedOp>, Vec<ResolvedOp>), CompileError> {
    let known = known_variables(workspace);
    let pattern = variable_pattern();
    let resolved_main = resolve_list(main, &known, &pattern, captures)?;
    let resolved_cleanup = resolve_list(cleanup, &known, &pattern, captures)?;
    Ok((resolved_main, resolved_cleanup))
}

fn resolve_list(
    ops: &[ExpandedOp],
    known: &BTreeMap<String, String>,
    pattern: &Regex,
    captures: &CaptureAnalysis,
) -> Result<Vec<ResolvedOp>, CompileError> {
    ops.iter()
        .enumerate()
        .map(|(step_index, expanded)| resolve_one(expanded, step_index, known, pattern, captures))
        .collect()
}

fn is_proc_run_blocked(name: &str, captures: &CaptureAnalysis) -> bool {
    name == "PREV" || captures.process_tainted_names.contains(name)
}

fn resolve_one(
    expanded: &ExpandedOp,
    step_index: usize,
    known: &BTreeMap<String, String>,
    pattern: &Regex,
    captures: &CaptureAnalysis,
) -> Result<ResolvedOp, CompileError> {
    let mut operation = expanded.operation.clone();
    let fully_literal_required = operation.verb == Verb::ProcRun;

    for arg in &mut operation.args {
        let (resolved, unresolved) = substitute(arg, known, pattern);
        if fully_literal_required {
            let blocked: Vec<&String> = unresolved.iter().filter(|name| is_proc_run_blocked(name, captures)).collect();
            if !blocked.is_empty() {
                return Err(CompileError::new(
                    operation.verb,
                    step_index,
                    CompileErrorKind::VariableViolation,
                    format!(
                        "ProcRun arguments cannot reference $PREV or a process-tainted capture at compile time; found {:?}",
                        blocked
                    ),
                ));
            }
        }
        *arg = resolved;
    }

    Ok(ResolvedOp { operation, guard: expanded.guard.clone() })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ascript_protocol::Verb;

    fn workspace() -> WorkspaceContext {
        let mut ws = WorkspaceContext::new("/sbx", "/sbx");
        ws.variables.insert("PROJECT".to_string(), "demo".to_string());
        ws
    }

    #[test]
    fn substitutes_known_variable() {
        let expanded = ExpandedOp { operation: Operation::simple(Verb::FileRead, ["/sbx/$PROJECT/a.txt"]), guard: None };
        let (main, _) = resolve_script(&[expanded], &[], &workspace(), &CaptureAnalysis::default()).expect("resolves");
        assert_eq!(main[0].operation.args[0], "/sbx/demo/a.txt");
    }

    #[test]
    fn unknown_variable_passes_through_for_non_proc_run() {
        let expanded = ExpandedOp { operation: Operation::simple(Verb::FileRead, ["/sbx/$MYSTERY/a.txt"]), guard: None };
        let (main, _) = resolve_script(&[expanded], &[], &workspace(), &CaptureAnalysis::default()).expect("resolves");
        assert_eq!(main[0].operation.args[0], "/sbx/$MYSTERY/a.txt");
    }

    #[test]
    fn proc_run_rejects_prev_reference() {
        let expanded = ExpandedOp { operation: Operation::simple(Verb::ProcRun, ["git", "commit", "-m", "$PREV"]), guard: None };
        assert!(resolve_script(&[expanded], &[], &workspace(), &CaptureAnalysis::default()).is_err());
    }

    #[test]
    fn proc_run_accepts_known_compile_time_variable() {
        let expanded = ExpandedOp { operation: Operation::simple(Verb::ProcRun, ["git", "add", "$PROJECT/a.txt"]), guard: None };
        let (main, _) = resolve_script(&[expanded], &[], &workspace(), &CaptureAnalysis::default()).expect("resolves");
        assert_eq!(main[0].operation.args[1], "demo/a.txt");
    }

    #[test]
    fn proc_run_rejects_process_tainted_capture() {
        let mut captures = CaptureAnalysis::default();
        captures.process_tainted_names.insert("RESULT".to_string());
        let expanded = ExpandedOp { operation: Operation::simple(Verb::ProcRun, ["git", "add", "$RESULT"]), guard: None };
        assert!(resolve_script(&[expanded], &[], &workspace(), &captures).is_err());
    }

    #[test]
    fn proc_run_accepts_non_tainted_capture_as_runtime_placeholder() {
        let mut captures = CaptureAnalysis::default();
        captures.declared_names.insert("X".to_string());
        let expanded = ExpandedOp { operation: Operation::simple(Verb::ProcRun, ["dotnet", "build", "$X"]), guard: None };
        let (main, _) = resolve_script(&[expanded], &[], &workspace(), &captures).expect("resolves");
        assert_eq!(main[0].operation.args[2], "$X");
    }
}
