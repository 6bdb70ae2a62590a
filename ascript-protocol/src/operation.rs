use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::verb::Verb;

/// One concrete verb invocation with arguments and metadata.
///
/// Control-flow fields (`for_each`, `if_`) are populated only for their
/// matching verb; the expander asserts this before any other stage sees the
/// operation (§4.1). `capture_as` is validated for uniqueness across the
/// whole script by the capture analyzer (§4.2), not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub verb: Verb,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub step_timeout_ms: Option<u64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub on_failure: Option<OnFailure>,
    #[serde(default)]
    pub capture_as: Option<String>,
    #[serde(default)]
    pub for_each: Option<ForEachSpec>,
    #[serde(default, rename = "if")]
    pub if_: Option<IfSpec>,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
    #[serde(default)]
    pub patches: Option<Vec<PatchSpec>>,
}

impl Operation {
    /// Convenience constructor for the common case of a primitive verb with
    /// only positional arguments; everything else defaults to `None`.
    pub fn simple(verb: Verb, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Operation {
            verb,
            args: args.into_iter().map(Into::into).collect(),
            max_retries: None,
            step_timeout_ms: None,
            label: None,
            on_failure: None,
            capture_as: None,
            for_each: None,
            if_: None,
            template: None,
            patches: None,
        }
    }
}

/// A forward-only jump target. The only syntax the language exposes is
/// `goto:<label>`; the label validator (§4.3) checks existence and
/// strict-forward-index-ness, not this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OnFailure {
    pub label: String,
}

impl TryFrom<String> for OnFailure {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.strip_prefix("goto:") {
            Some(label) if !label.is_empty() => Ok(OnFailure {
                label: label.to_string(),
            }),
            _ => Err(format!("onFailure must be of the form goto:<label>, got {value:?}")),
        }
    }
}

impl From<OnFailure> for String {
    fn from(value: OnFailure) -> Self {
        format!("goto:{}", value.label)
    }
}

/// Body of a `ForEach` verb: one operation is synthesized per item by the
/// expander, substituting `$ITEM`/`$INDEX` into `body.args` only (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachSpec {
    pub items: Vec<String>,
    pub body: Box<Operation>,
}

/// Body of an `If` verb. There is no else branch and no boolean composition
/// by design (§4.1); each predicate is a single closed-form check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfSpec {
    pub predicate: Predicate,
    pub body: Box<Operation>,
}

/// Closed set of `If` predicates. None of these are evaluated by the
/// expander: `$PREV` only exists once a prior step has actually run, and
/// `FileExists`/`DirExists` read live filesystem state. The expander's job is
/// only to eliminate the `If` wrapper, leaving the inner operation with the
/// predicate attached as a guard the executor checks immediately before
/// dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    PrevContains { needle: String },
    PrevEmpty,
    EnvEquals { name: String, value: String },
    FileExists { path: String },
    DirExists { path: String },
}

/// `FileTemplate` substitution values. Per the compiler (§4.9.6) every value
/// must be literal; no `$`; and the key count is capped at 64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub values: BTreeMap<String, String>,
}

/// One `find` → `replace` substitution for `FilePatch` (§4.9.7). `find` must
/// be non-empty and neither side may contain `$`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSpec {
    pub find: String,
    pub replace: String,
}
