use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

/// The per-script sandbox context, built by the host before `compile` is
/// called and immutable thereafter (§3). The core validates paths against
/// `sandbox_root` but never creates or deletes it.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    pub sandbox_root: PathBuf,
    pub working_directory: PathBuf,
    pub run_as_user: Option<String>,
    pub variables: BTreeMap<String, String>,
}

/// Names that `captureAs` may never bind to because they are populated by the
/// host or the executor itself (§3).
pub const RESERVED_VARIABLE_NAMES: &[&str] =
    &["WORKSPACE", "CWD", "USER", "PREV", "ITEM", "INDEX"];

impl WorkspaceContext {
    pub fn new(sandbox_root: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        WorkspaceContext {
            sandbox_root: sandbox_root.into(),
            working_directory: working_directory.into(),
            run_as_user: None,
            variables: BTreeMap::new(),
        }
    }

    /// Seeds the built-in reserved variables from this workspace. Called once
    /// by the variable resolver before any user variable is merged in, so a
    /// script can always reference `$WORKSPACE`/`$CWD`/`$USER` regardless of
    /// what the host put in `variables`.
    pub fn builtin_variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(
            "WORKSPACE".to_string(),
            self.sandbox_root.to_string_lossy().into_owned(),
        );
        vars.insert(
            "CWD".to_string(),
            self.working_directory.to_string_lossy().into_owned(),
        );
        if let Some(user) = &self.run_as_user {
            vars.insert("USER".to_string(), user.clone());
        }
        vars
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_variables_expose_workspace_and_cwd() {
        let ws = WorkspaceContext::new("/sbx", "/sbx");
        let vars = ws.builtin_variables();
        assert_eq!(vars.get("WORKSPACE").map(String::as_str), Some("/sbx"));
        assert_eq!(vars.get("CWD").map(String::as_str), Some("/sbx"));
        assert!(!vars.contains_key("USER"));
    }
}
