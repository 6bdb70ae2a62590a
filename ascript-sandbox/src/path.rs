use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::error::SandboxError;
use crate::gigablacklist::SANDBOX_ENV_FILENAMES;

/// Extensions that are either native executables or are interpretable by a
/// binary the global block list could never fully suppress (e.g. `.rs`
/// compiles to a native binary with `rustc`/`cargo` present on the host).
/// Writing these inside the sandbox is refused regardless of approval mode
/// (§4.5). Deliberately excludes shell-script extensions (`.sh`, `.py`,
/// `.ps1`, …): the agent cannot execute them because every interpreter is
/// globally blocked in the command whitelist, but a human or external
/// automation consuming the sandbox afterward may legitimately need them.
pub const TIER1_BLOCKED_EXTENSIONS: &[&str] = &[
    ".exe", ".com", ".scr", ".msi", ".msp", ".dll", ".bin", ".run", ".appimage", ".elf", ".so",
    ".dylib", ".js", ".mjs", ".cjs", ".jse", ".wsf", ".wsh", ".msh", ".vbs", ".vbe", ".csproj",
    ".fsproj", ".vbproj", ".proj", ".targets", ".props", ".sln", ".rs",
];

/// Build-file and package-manifest names whose presence could redirect a
/// later build/package-manager invocation into running agent-controlled
/// content (§4.5).
pub const TIER1_BLOCKED_FILENAMES: &[&str] = &[
    "Makefile",
    "makefile",
    "GNUmakefile",
    "CMakeLists.txt",
    "Dockerfile",
    ".npmrc",
    "Directory.Build.props",
    "Directory.Build.targets",
    "Directory.Packages.props",
    "nuget.config",
    "package.json",
    "build.rs",
    "Cargo.toml",
    "setup.py",
    "setup.cfg",
    "pyproject.toml",
    ".gitattributes",
    ".gitmodules",
];

#[cfg(windows)]
const WINDOWS_RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM0", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
    "COM8", "COM9", "LPT0", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn has_disallowed_control_chars(path: &str) -> bool {
    path.chars().any(|c| c == '\0' || (c.is_control() && c != '\t'))
}

/// Lexically normalizes `.`/`..` segments without touching the filesystem, so
/// it works for write targets that do not exist yet. Mirrors the approach
/// `codex-core::safety::is_write_patch_constrained_to_writable_paths` uses to
/// normalize patch paths before a prefix check.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn canonical_root(sandbox_root: &Path) -> PathBuf {
    let mut root = normalize_lexically(sandbox_root);
    if root.as_os_str().is_empty() {
        root.push(std::path::MAIN_SEPARATOR.to_string());
    }
    root
}

fn is_contained(root: &Path, candidate: &Path) -> bool {
    if cfg!(windows) {
        let root_lower = root.to_string_lossy().to_lowercase();
        let candidate_lower = candidate.to_string_lossy().to_lowercase();
        candidate_lower == root_lower || candidate_lower.starts_with(&format!("{root_lower}{}", std::path::MAIN_SEPARATOR))
            || candidate.starts_with(root)
    } else {
        candidate == root || candidate.starts_with(root)
    }
}

fn resolve_common(user_path: &str, sandbox_root: &Path) -> Result<PathBuf, SandboxError> {
    if has_disallowed_control_chars(user_path) {
        return Err(SandboxError::PathControlCharacter);
    }

    let root = canonical_root(sandbox_root);
    let candidate = Path::new(user_path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let canonical = normalize_lexically(&joined);

    if !is_contained(&root, &canonical) {
        return Err(SandboxError::PathOutsideRoot(user_path.to_string()));
    }

    #[cfg(windows)]
    {
        if let Some(stem) = canonical.file_stem().and_then(|s| s.to_str()) {
            if WINDOWS_RESERVED_STEMS
                .iter()
                .any(|reserved| reserved.eq_ignore_ascii_case(stem))
            {
                return Err(SandboxError::ReservedDeviceName(stem.to_string()));
            }
        }
    }

    if let Some(name) = canonical.file_name().and_then(|n| n.to_str()) {
        if SANDBOX_ENV_FILENAMES.iter().any(|blocked| *blocked == name) {
            return Err(SandboxError::BlockedName(name.to_string()));
        }
    }

    Ok(canonical)
}

/// Resolves a user-supplied path for read access against `sandbox_root`
/// (§4.5 steps 1-6, minus the write-tier extras).
pub fn resolve(user_path: &str, sandbox_root: &Path) -> Result<PathBuf, SandboxError> {
    resolve_common(user_path, sandbox_root)
}

/// Resolves a user-supplied path for write/append/copy-dst/move-dst access,
/// additionally enforcing the Tier-1 extension/filename block list and the
/// `.git` traversal guard (§4.5).
pub fn resolve_for_write(user_path: &str, sandbox_root: &Path) -> Result<PathBuf, SandboxError> {
    let canonical = resolve_common(user_path, sandbox_root)?;

    let file_name = canonical.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if let Some(ext_pos) = file_name.rfind('.') {
        let ext = file_name[ext_pos..].to_lowercase();
        if TIER1_BLOCKED_EXTENSIONS.iter().any(|blocked| *blocked == ext) {
            return Err(SandboxError::BlockedExtension(ext));
        }
    }

    if TIER1_BLOCKED_FILENAMES
        .iter()
        .any(|blocked| *blocked == file_name)
        || SANDBOX_ENV_FILENAMES.iter().any(|blocked| *blocked == file_name)
    {
        return Err(SandboxError::BlockedFilename(file_name.to_string()));
    }

    if canonical
        .components()
        .any(|c| c.as_os_str() == std::ffi::OsStr::new(".git"))
    {
        return Err(SandboxError::GitDirectoryTraversal);
    }

    Ok(canonical)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_paths_to_sandbox_root() {
        let resolved = resolve("a.txt", Path::new("/sbx")).expect("resolves");
        assert_eq!(resolved, PathBuf::from("/sbx/a.txt"));
    }

    #[test]
    fn rejects_traversal_outside_root() {
        let err = resolve("../../etc/passwd", Path::new("/sbx")).unwrap_err();
        assert_eq!(err, SandboxError::PathOutsideRoot("../../etc/passwd".to_string()));
    }

    #[test]
    fn rejects_absolute_paths_outside_root() {
        let err = resolve("/etc/passwd", Path::new("/sbx")).unwrap_err();
        assert!(matches!(err, SandboxError::PathOutsideRoot(_)));
    }

    #[test]
    fn rejects_null_bytes() {
        let err = resolve("a\0b.txt", Path::new("/sbx")).unwrap_err();
        assert_eq!(err, SandboxError::PathControlCharacter);
    }

    #[test]
    fn allows_tab_but_not_newline() {
        assert!(resolve("a\tb.txt", Path::new("/sbx")).is_ok());
        assert!(resolve("a\nb.txt", Path::new("/sbx")).is_err());
    }

    #[test]
    fn write_rejects_tier1_extension() {
        let err = resolve_for_write("evil.dll", Path::new("/sbx")).unwrap_err();
        assert!(matches!(err, SandboxError::BlockedExtension(_)));
    }

    #[test]
    fn write_rejects_tier1_filename() {
        let err = resolve_for_write("package.json", Path::new("/sbx")).unwrap_err();
        assert!(matches!(err, SandboxError::BlockedFilename(_)));
    }

    #[test]
    fn write_accepts_shell_and_script_extensions() {
        for name in ["notes.sh", "run.py", "deploy.ps1", "task.rb", "x.pl", "svc.service"] {
            assert!(resolve_for_write(name, Path::new("/sbx")).is_ok(), "{name} should be writable");
        }
    }

    #[test]
    fn write_rejects_git_directory_traversal() {
        let err = resolve_for_write(".git/hooks/pre-commit", Path::new("/sbx")).unwrap_err();
        assert_eq!(err, SandboxError::GitDirectoryTraversal);
    }

    #[test]
    fn resolve_is_idempotent_for_dot_segments() {
        let resolved = resolve("./sub/../a.txt", Path::new("/sbx")).expect("resolves");
        assert_eq!(resolved, PathBuf::from("/sbx/a.txt"));
    }
}
