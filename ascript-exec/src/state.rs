use std::collections::BTreeMap;
use std::path::Path;

use ascript_protocol::Predicate;
use regex_lite::Regex;

/// Running state the executor carries from one compiled step to the next:
/// the previous step's output and every value bound by a `captureAs`. Every
/// `$TOKEN` an in-memory command still carries once it reaches dispatch is
/// either `$PREV` or a capture name; compile time already rejected unknown
/// names for `ProcRun` and left them as literal text everywhere else, so
/// this substitution only ever fills in the two runtime sources.
#[derive(Debug, Default)]
pub struct ExecutionState {
    prev_output: Option<String>,
    captures: BTreeMap<String, String>,
}

impl ExecutionState {
    pub fn new() -> Self {
        ExecutionState::default()
    }

    pub fn prev_output(&self) -> Option<&str> {
        self.prev_output.as_deref()
    }

    /// Called after a step completes, regardless of whether it had a
    /// `captureAs`; `$PREV` always reflects the immediately preceding step.
    pub fn record(&mut self, capture_as: Option<&str>, output: &str) {
        self.prev_output = Some(output.to_string());
        if let Some(name) = capture_as {
            self.captures.insert(name.to_string(), output.to_string());
        }
    }

    #[allow(clippy::expect_used)]
    fn token_pattern() -> Regex {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern is valid")
    }

    /// Fills in `$PREV`/capture tokens left in an in-memory command's
    /// arguments. A token that still isn't known (a capture that was never
    /// actually bound because its step was skipped by a guard) is left
    /// verbatim, matching the same "unknown names pass through" rule
    /// compile-time resolution used.
    pub fn substitute(&self, arguments: &[String]) -> Vec<String> {
        let pattern = Self::token_pattern();
        arguments.iter().map(|arg| self.substitute_one(arg, &pattern)).collect()
    }

    fn substitute_one(&self, arg: &str, pattern: &Regex) -> String {
        let mut result = String::with_capacity(arg.len());
        let mut last_end = 0;
        for m in pattern.find_iter(arg) {
            result.push_str(&arg[last_end..m.start()]);
            let name = &arg[m.start() + 1..m.end()];
            let value = if name == "PREV" {
                self.prev_output.as_deref()
            } else {
                self.captures.get(name).map(String::as_str)
            };
            match value {
                Some(v) => result.push_str(v),
                None => result.push_str(m.as_str()),
            }
            last_end = m.end();
        }
        result.push_str(&arg[last_end..]);
        result
    }

    /// Evaluates an `If` guard immediately before the step it is attached to
    /// would otherwise dispatch. `FileExists`/`DirExists` are resolved
    /// against the sandbox root the same way a real file verb's path would
    /// be; a path a real step could never have touched (traversal, control
    /// characters) is treated as simply not existing rather than surfacing a
    /// validation error this late in the pipeline.
    pub fn evaluate_guard(&self, predicate: &Predicate, sandbox_root: &Path) -> bool {
        match predicate {
            Predicate::PrevContains { needle } => self.prev_output.as_deref().is_some_and(|prev| prev.contains(needle.as_str())),
            Predicate::PrevEmpty => match self.prev_output.as_deref() {
                Some(prev) => prev.is_empty(),
                None => true,
            },
            Predicate::EnvEquals { name, value } => std::env::var(name).map(|v| &v == value).unwrap_or(false),
            Predicate::FileExists { path } => ascript_sandbox::resolve(path, sandbox_root).map(|p| p.is_file()).unwrap_or(false),
            Predicate::DirExists { path } => ascript_sandbox::resolve(path, sandbox_root).map(|p| p.is_dir()).unwrap_or(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_prev_and_capture_tokens() {
        let mut state = ExecutionState::new();
        state.record(Some("HASH"), "abc123");
        let out = state.substitute(&["value is $PREV".to_string(), "$HASH-suffix".to_string()]);
        assert_eq!(out, vec!["value is abc123".to_string(), "abc123-suffix".to_string()]);
    }

    #[test]
    fn leaves_unknown_tokens_verbatim() {
        let state = ExecutionState::new();
        let out = state.substitute(&["$NEVER_BOUND".to_string()]);
        assert_eq!(out, vec!["$NEVER_BOUND".to_string()]);
    }

    #[test]
    fn prev_empty_is_true_before_any_step_runs() {
        let state = ExecutionState::new();
        assert!(state.evaluate_guard(&Predicate::PrevEmpty, Path::new("/sbx")));
    }

    #[test]
    fn prev_contains_checks_the_latest_recorded_output() {
        let mut state = ExecutionState::new();
        state.record(None, "build succeeded");
        assert!(state.evaluate_guard(&Predicate::PrevContains { needle: "succeeded".to_string() }, Path::new("/sbx")));
        assert!(!state.evaluate_guard(&Predicate::PrevContains { needle: "failed".to_string() }, Path::new("/sbx")));
    }

    #[test]
    fn file_exists_guard_respects_sandbox_containment() {
        let state = ExecutionState::new();
        assert!(!state.evaluate_guard(&Predicate::FileExists { path: "../../etc/passwd".to_string() }, Path::new("/sbx")));
    }
}
