//! Read-substitute-write logic for the two verbs that edit files by content
//! rather than by name: `FileTemplate` (placeholder substitution into a
//! fresh destination) and `FilePatch` (sequential find/replace against a
//! file in place). Neither function here touches the filesystem; callers in
//! `ascript-exec` do the reading and writing through already-sandboxed paths
//! so this crate stays a pure string transform, easy to test in isolation.

mod error;
mod patch;
mod template;

pub use error::PatchError;
pub use patch::apply as apply_patches;
pub use patch::PatchOp;
pub use template::render as render_template;
