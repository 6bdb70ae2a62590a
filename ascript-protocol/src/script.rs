use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::operation::Operation;
use crate::options::ExecutionOptions;

/// Top-level request the host submits to `compile` (§3). `operations` and
/// `cleanup` share the entire validation pipeline; there is no relaxed path
/// for cleanup steps. `fragments` are named operation lists an `Include` step
/// may splice in by name; they never nest more than the expander's overall
/// depth cap allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub cleanup: Vec<Operation>,
    #[serde(default)]
    pub options: Option<ExecutionOptions>,
    #[serde(default)]
    pub fragments: BTreeMap<String, Vec<Operation>>,
}

impl Script {
    pub fn effective_options(&self) -> ExecutionOptions {
        self.options.clone().unwrap_or_default()
    }
}
