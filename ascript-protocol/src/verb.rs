use serde::Deserialize;
use serde::Serialize;

/// The closed set of primitive and structured operations an agent script may
/// contain. New verbs cannot be registered at runtime; adding one requires a
/// new variant here plus a matching arm in every exhaustive dispatch (the
/// compiler, the expander, and the executor each `match` on `Verb` without a
/// wildcard arm so a missed case is a build failure, not a runtime gap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    // Filesystem: read
    FileRead,
    FileHash,
    DirList,
    DirTree,

    // Filesystem: write
    FileWrite,
    FileAppend,
    FileCopy,
    FileMove,
    FileDelete,

    // Directory
    DirCreate,
    DirDelete,

    // Process
    ProcRun,

    // HTTP
    HttpGet,
    HttpPost,

    // Text / JSON manipulation
    JsonGet,
    JsonSet,
    TextReplace,
    MathEval,

    // Environment
    EnvGet,

    // System info
    SysInfo,

    // Templating / patching
    FileTemplate,
    FilePatch,

    // Control flow
    ForEach,
    If,

    // Batch
    FileWriteMany,
    FileCopyMany,
    FileDeleteMany,

    // Composition
    Include,
}

impl Verb {
    /// True for verbs whose primary positional argument(s) name paths that
    /// must be validated for write access rather than read access.
    pub fn is_write_path_verb(self) -> bool {
        matches!(
            self,
            Verb::FileWrite | Verb::FileAppend | Verb::FileMove | Verb::FileDelete
        )
    }

    /// True for verbs that are expanded away before validation and never
    /// reach the compiler directly.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Verb::ForEach
                | Verb::If
                | Verb::Include
                | Verb::FileWriteMany
                | Verb::FileCopyMany
                | Verb::FileDeleteMany
        )
    }

    pub fn is_process_spawning(self) -> bool {
        matches!(self, Verb::ProcRun)
    }

    /// Inclusive `[min, max]` argument-count bounds enforced by the compiler
    /// (§4.9.1). `None` for `max` means unbounded (batch verbs are capped
    /// separately by the expander, not here).
    pub fn arity(self) -> (usize, Option<usize>) {
        use Verb::*;
        match self {
            FileRead | DirList | DirCreate | DirDelete | EnvGet | SysInfo => (1, Some(1)),
            FileHash | DirTree => (1, Some(2)),
            FileWrite | FileAppend => (2, Some(2)),
            FileCopy | FileMove => (2, Some(2)),
            FileDelete => (1, Some(1)),
            ProcRun => (1, None),
            HttpGet => (1, Some(1)),
            HttpPost => (1, Some(2)),
            JsonGet => (2, Some(2)),
            JsonSet => (3, Some(3)),
            TextReplace => (3, Some(3)),
            MathEval => (1, Some(1)),
            FileTemplate => (2, Some(2)),
            FilePatch => (1, Some(1)),
            ForEach | If | Include => (0, None),
            FileWriteMany | FileCopyMany | FileDeleteMany => (1, None),
        }
    }
}
