/// The only environment variables `EnvGet` may ever read (§6). Anything
/// outside this set is rejected at compile time; `ascript-exec` checks the
/// same rule again immediately before calling `std::env::var`, since the
/// executor never trusts a compile-time guarantee it can cheaply re-verify.
pub const ENV_GET_ALLOWLIST: &[&str] = &["HOME", "USER", "PATH", "LANG", "TZ", "TERM", "PWD", "HOSTNAME"];

/// Substrings that blacklist a name even if it were otherwise on the
/// allowlist (§6). None of `ENV_GET_ALLOWLIST`'s entries contain any of
/// these today; the check only bites if the allowlist itself ever grows to
/// include something careless like `AWS_SECRET_ACCESS_KEY`.
const ENV_GET_DENYLIST_SUBSTRINGS: &[&str] = &["KEY", "SECRET", "TOKEN", "PASSWORD", "CONN"];

/// Whether `EnvGet` may read `name` (§6). Case-sensitive against the
/// allowlist itself (environment variable names are conventionally
/// uppercase and the allowlist is exhaustive), but the denylist scan is
/// case-insensitive so `aws_secret_key` can't sneak past via casing.
pub fn is_env_var_allowed(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    ENV_GET_ALLOWLIST.contains(&name) && !ENV_GET_DENYLIST_SUBSTRINGS.iter().any(|bad| upper.contains(bad))
}
