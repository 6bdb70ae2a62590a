use crate::error::SandboxError;

/// Filenames that back a signed, HMAC-protected per-sandbox variable store
/// (§6). Any verb that could read, write, move, or otherwise touch these by
/// name is rejected outright; they never pass through ordinary path
/// validation into a handler.
pub const SANDBOX_ENV_FILENAMES: &[&str] = &[".sandbox.env", ".sandbox.env.sig", "sandbox.env"];

/// A global, verb-agnostic substring scan applied to every resolved argument
/// of every operation; primary and cleanup; before compilation emits a
/// single command (§4.8). This is the last line of defense: it does not know
/// or care which verb produced the argument.
const BLOCKED_TERMS: &[&str] = &[
    // Shell metacharacters that would only matter if something downstream
    // re-interpreted the argument through a shell; which nothing does, but
    // an argument containing them is also a strong signal of an injection
    // attempt smuggled through a verb that otherwise looked benign.
    "; rm -rf",
    "&& rm -rf",
    "| rm -rf",
    "$(", "`",
    ">(", "<(",
    "rm -rf /",
    "mkfs",
    "dd if=",
    ":(){ :|:& };:",
    // Credential / secret keywords.
    "BEGIN PRIVATE KEY",
    "BEGIN RSA PRIVATE KEY",
    "BEGIN OPENSSH PRIVATE KEY",
    "aws_secret_access_key",
    // System-alteration terms.
    "/etc/shadow",
    "/etc/passwd",
    "visudo",
    "iptables -F",
    "shutdown -h",
    "format c:",
];

/// Scans a single resolved argument, failing closed on the first blocked
/// substring found. Case-sensitive: the blocked terms are themselves the
/// canonical casing attackers use, and lower-casing would create false
/// positives against legitimate paths like `/etc/passwd-style.md`.
pub fn scan_argument(argument: &str) -> Result<(), SandboxError> {
    for term in BLOCKED_TERMS {
        if argument.contains(term) {
            return Err(SandboxError::GigaBlacklistMatch((*term).to_string()));
        }
    }
    for filename in SANDBOX_ENV_FILENAMES {
        if argument.contains(filename) {
            return Err(SandboxError::GigaBlacklistMatch((*filename).to_string()));
        }
    }
    Ok(())
}

/// Scans every argument in `arguments`, returning the first violation.
pub fn scan_all<'a>(arguments: impl IntoIterator<Item = &'a str>) -> Result<(), SandboxError> {
    for arg in arguments {
        scan_argument(arg)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_destructive_pattern() {
        assert!(scan_argument("rm -rf /").is_err());
    }

    #[test]
    fn rejects_command_substitution() {
        assert!(scan_argument("echo $(whoami)").is_err());
    }

    #[test]
    fn rejects_sandbox_env_filename_anywhere_in_argument() {
        assert!(scan_argument("cat ../.sandbox.env").is_err());
    }

    #[test]
    fn allows_ordinary_text() {
        assert!(scan_argument("hello world, this is fine.").is_ok());
    }

    #[test]
    fn scan_all_stops_at_first_violation() {
        let args = ["fine", "also fine", "rm -rf /", "never reached"];
        assert!(scan_all(args).is_err());
    }
}
