//! The validation-and-compilation half of the pipeline: turns a raw `Script`
//! into a `CompiledScript` by running expansion, capture analysis, label
//! validation, variable resolution, and per-verb compilation in that fixed
//! order. Everything here is pure with respect to the filesystem and the
//! network except the sandbox-path containment check itself, which only
//! ever reads directory structure, never creates or deletes anything.

mod capture;
mod compile;
mod expand;
mod label;
mod resolve;

pub use capture::analyze_captures;
pub use capture::CaptureAnalysis;
pub use capture::MAX_CAPTURES;
pub use compile::compile_script;
pub use compile::ALLOWED_HASH_ALGORITHMS;
pub use compile::DIR_TREE_DEFAULT_DEPTH;
pub use compile::DIR_TREE_MAX_DEPTH;
pub use compile::MAX_MATH_EXPR_LEN;
pub use compile::MAX_PATCHES;
pub use compile::MAX_TEMPLATE_KEYS;
pub use expand::expand_script;
pub use expand::ExpandedOp;
pub use expand::MAX_EXPANDED_OPERATIONS;
pub use expand::MAX_EXPANSION_DEPTH;
pub use expand::MAX_FOREACH_ITEMS;
pub use label::validate_labels;
pub use resolve::resolve_script;
pub use resolve::ResolvedOp;
