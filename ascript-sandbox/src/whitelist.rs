use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::SandboxError;
use crate::path;

/// Binaries that are never permitted regardless of template, flags, or
/// configuration (§4.7). This list is checked before any template lookup;
/// there is no "allowed binary with blocked flags" fallback anywhere in this
/// pipeline.
pub const BLOCKED_BINARIES: &[&str] = &[
    "bash", "sh", "zsh", "fish", "dash", "ksh", "tcsh", "csh", "cmd", "cmd.exe", "powershell",
    "powershell.exe", "pwsh", "python", "python3", "python2", "perl", "ruby", "lua", "php",
    "node", "deno", "sudo", "su", "doas", "curl", "wget", "fetch", "find", "xargs", "env",
    "nohup", "ssh", "scp", "sftp", "rsync", "nc", "ncat", "netcat", "socat", "telnet",
    "crontab", "at", "chmod", "chown", "chgrp", "systemctl", "service", "launchctl", "dd",
    "strace", "ltrace", "gdb", "lldb", "eval", "exec", "source", "osascript", "reg", "reg.exe",
    "schtasks", "wmic", "mshta", "certutil", "bitsadmin", "rundll32",
];

/// True when `binary` (case-insensitively, and ignoring a Windows `.exe`
/// suffix or a leading interpreter-style `python3.11` version tag) names a
/// permanently blocked program.
pub fn is_blocked_binary(binary: &str) -> bool {
    let lower = binary.to_ascii_lowercase();
    let stem = lower.strip_suffix(".exe").unwrap_or(&lower);
    BLOCKED_BINARIES.iter().any(|blocked| {
        *blocked == stem || stem.starts_with(&format!("{blocked}.")) || stem == format!("{blocked}.exe")
    })
}

/// A closed parameter shape for one positional or flag-value slot (§4.7).
#[derive(Debug, Clone)]
pub enum SlotKind {
    Choice(Vec<String>),
    SandboxPath,
    AdminWord(&'static str),
    IntRange(i64, i64),
    ComposedWords(&'static str, usize),
    CompoundName(BTreeSet<String>),
}

impl SlotKind {
    fn validate(&self, value: &str, word_lists: &BTreeMap<&'static str, Vec<String>>, sandbox_root: &Path) -> bool {
        match self {
            SlotKind::Choice(values) => values.iter().any(|v| v == value),
            SlotKind::SandboxPath => path::resolve(value, sandbox_root).is_ok(),
            SlotKind::AdminWord(list_name) => word_lists
                .get(list_name)
                .is_some_and(|list| list.iter().any(|w| w == value)),
            SlotKind::IntRange(min, max) => value
                .parse::<i64>()
                .is_ok_and(|parsed| parsed >= *min && parsed <= *max),
            SlotKind::ComposedWords(list_name, max_words) => {
                let tokens: Vec<&str> = value.split(' ').filter(|t| !t.is_empty()).collect();
                if tokens.is_empty() || tokens.len() > *max_words {
                    return false;
                }
                word_lists
                    .get(list_name)
                    .is_some_and(|list| tokens.iter().all(|t| list.iter().any(|w| w == t)))
            }
            SlotKind::CompoundName(accepted) => accepted.contains(value),
        }
    }
}

/// A flag the template accepts; `value_slot` is `None` for a boolean switch.
#[derive(Debug, Clone)]
pub struct FlagSpec {
    pub name: &'static str,
    pub value_slot: Option<SlotKind>,
}

/// One permitted process-invocation shape (§4.7). Matching is exact: the
/// fixed prefix tokens, then any mix of recognized flags, then exactly the
/// declared positional slots in order; nothing more, nothing less.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub name: &'static str,
    pub prefix: Vec<&'static str>,
    pub flags: Vec<FlagSpec>,
    pub positionals: Vec<SlotKind>,
}

impl CommandTemplate {
    fn flag(&self, token: &str) -> Option<&FlagSpec> {
        self.flags.iter().find(|f| f.name == token)
    }

    fn try_match(
        &self,
        command: &[String],
        word_lists: &BTreeMap<&'static str, Vec<String>>,
        sandbox_root: &Path,
    ) -> bool {
        if command.len() < self.prefix.len() {
            return false;
        }
        if !command[..self.prefix.len()]
            .iter()
            .zip(self.prefix.iter())
            .all(|(a, b)| a == b)
        {
            return false;
        }

        let rest = &command[self.prefix.len()..];
        let mut positional_values = Vec::new();
        let mut i = 0;
        while i < rest.len() {
            let token = &rest[i];
            if let Some(stripped) = token.strip_prefix("--").or_else(|| token.strip_prefix('-')) {
                let flag_token: &str = if token.starts_with("--") {
                    token.as_str()
                } else {
                    stripped
                };
                let _ = flag_token;
                match self.flag(token) {
                    Some(flag) => {
                        if let Some(slot) = &flag.value_slot {
                            i += 1;
                            let Some(value) = rest.get(i) else {
                                return false;
                            };
                            if !slot.validate(value, word_lists, sandbox_root) {
                                return false;
                            }
                        }
                    }
                    None => return false,
                }
            } else {
                positional_values.push(token.clone());
            }
            i += 1;
        }

        if positional_values.len() != self.positionals.len() {
            return false;
        }
        positional_values
            .iter()
            .zip(self.positionals.iter())
            .all(|(value, slot)| slot.validate(value, word_lists, sandbox_root))
    }
}

/// Bounded runtime configuration baked into the immutable whitelist at
/// construction (§4.7): at most 32 project bases and 16 git remote URLs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub project_bases: Vec<String>,
    pub git_remote_urls: Vec<String>,
}

impl RuntimeConfig {
    pub fn validated(mut self) -> Self {
        self.project_bases.truncate(32);
        self.git_remote_urls.truncate(16);
        self
    }
}

const PROTECTED_BRANCH_NAMES: &[&str] = &["main", "master", "develop", "staging", "production", "live", "trunk"];

fn is_protected_branch(candidate: &str) -> bool {
    PROTECTED_BRANCH_NAMES.iter().any(|p| *p == candidate) || candidate.starts_with("release")
}

const BRANCH_CANDIDATE_POOL: &[&str] = &[
    "feature-auth", "feature-api", "feature-ui", "fix-flaky-test", "fix-memory-leak",
    "chore-deps", "docs-update", "hotfix-crash", "perf-cache", "refactor-core",
];

const COMMIT_MESSAGE_WORDS: &[&str] = &[
    "fix", "add", "update", "remove", "refactor", "docs", "test", "chore", "bump", "clean",
    "improve", "handle", "support", "the", "a", "an", "and", "for", "to", "in", "of", "on",
];

const CARGO_TEST_FILTER_WORDS: &[&str] = &["unit", "integration", "e2e", "smoke", "regression", "slow", "fast"];

const NPM_SCRIPT_WORDS: &[&str] = &["build", "lint", "test", "format", "start", "dev", "clean"];

const DOCKER_TAG_SUFFIXES: &[&str] = &["dev", "staging", "prod", "test"];

/// The immutable registry of permitted process invocations plus the global
/// block list and gigablacklist-adjacent word lists (§4.7, §4.8). Built once
/// from `RuntimeConfig` at host startup and passed by reference from then on
///; nothing here is ever mutated after `build`.
#[derive(Debug, Clone)]
pub struct CommandWhitelist {
    templates: Vec<CommandTemplate>,
    word_lists: BTreeMap<&'static str, Vec<String>>,
}

impl CommandWhitelist {
    pub fn build(config: RuntimeConfig) -> Self {
        let config = config.validated();

        let branch_words: Vec<String> = BRANCH_CANDIDATE_POOL
            .iter()
            .filter(|candidate| !is_protected_branch(candidate))
            .map(|s| s.to_string())
            .collect();

        let mut word_lists: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        word_lists.insert("branch_names", branch_words);
        word_lists.insert(
            "commit_words",
            COMMIT_MESSAGE_WORDS.iter().map(|s| s.to_string()).collect(),
        );
        word_lists.insert(
            "test_filter_words",
            CARGO_TEST_FILTER_WORDS.iter().map(|s| s.to_string()).collect(),
        );
        word_lists.insert(
            "npm_script_words",
            NPM_SCRIPT_WORDS.iter().map(|s| s.to_string()).collect(),
        );

        let mut docker_tags: BTreeSet<String> = BTreeSet::new();
        for base in &config.project_bases {
            docker_tags.insert(base.clone());
            for suffix in DOCKER_TAG_SUFFIXES {
                docker_tags.insert(format!("{base}{suffix}"));
                docker_tags.insert(format!("{base}.{suffix}"));
            }
        }

        let templates = vec![
            CommandTemplate { name: "git-status", prefix: vec!["git", "status"], flags: vec![], positionals: vec![] },
            CommandTemplate {
                name: "git-log",
                prefix: vec!["git", "log"],
                flags: vec![
                    FlagSpec { name: "--oneline", value_slot: None },
                    FlagSpec { name: "-n", value_slot: Some(SlotKind::IntRange(1, 1000)) },
                ],
                positionals: vec![],
            },
            CommandTemplate {
                name: "git-diff",
                prefix: vec!["git", "diff"],
                flags: vec![
                    FlagSpec { name: "--stat", value_slot: None },
                    FlagSpec { name: "--cached", value_slot: None },
                ],
                positionals: vec![],
            },
            CommandTemplate { name: "git-show", prefix: vec!["git", "show"], flags: vec![], positionals: vec![SlotKind::Choice(vec!["HEAD".to_string()])] },
            CommandTemplate {
                name: "git-branch-create",
                prefix: vec!["git", "branch"],
                flags: vec![],
                positionals: vec![SlotKind::AdminWord("branch_names")],
            },
            CommandTemplate {
                name: "git-checkout-new-branch",
                prefix: vec!["git", "checkout", "-b"],
                flags: vec![],
                positionals: vec![SlotKind::AdminWord("branch_names")],
            },
            CommandTemplate {
                name: "git-add",
                prefix: vec!["git", "add"],
                flags: vec![],
                positionals: vec![SlotKind::SandboxPath],
            },
            CommandTemplate {
                name: "git-commit",
                prefix: vec!["git", "commit", "-m"],
                flags: vec![],
                positionals: vec![SlotKind::ComposedWords("commit_words", 20)],
            },
            CommandTemplate {
                name: "git-clone",
                prefix: vec!["git", "clone"],
                flags: vec![],
                positionals: vec![SlotKind::Choice(config.git_remote_urls.clone())],
            },
            CommandTemplate { name: "cargo-check", prefix: vec!["cargo", "check"], flags: vec![FlagSpec { name: "--release", value_slot: None }], positionals: vec![] },
            CommandTemplate { name: "cargo-build", prefix: vec!["cargo", "build"], flags: vec![FlagSpec { name: "--release", value_slot: None }], positionals: vec![] },
            CommandTemplate {
                name: "cargo-test",
                prefix: vec!["cargo", "test"],
                flags: vec![FlagSpec { name: "--release", value_slot: None }],
                positionals: vec![SlotKind::ComposedWords("test_filter_words", 8)],
            },
            CommandTemplate { name: "npm-install", prefix: vec!["npm", "install"], flags: vec![], positionals: vec![] },
            CommandTemplate { name: "npm-test", prefix: vec!["npm", "test"], flags: vec![], positionals: vec![] },
            CommandTemplate {
                name: "npm-run",
                prefix: vec!["npm", "run"],
                flags: vec![],
                positionals: vec![SlotKind::ComposedWords("npm_script_words", 1)],
            },
            CommandTemplate {
                name: "docker-build-tag",
                prefix: vec!["docker", "build", "-t"],
                flags: vec![],
                positionals: vec![SlotKind::CompoundName(docker_tags), SlotKind::SandboxPath],
            },
            CommandTemplate { name: "ls", prefix: vec!["ls"], flags: vec![], positionals: vec![SlotKind::SandboxPath] },
            CommandTemplate { name: "ls-bare", prefix: vec!["ls"], flags: vec![], positionals: vec![] },
            CommandTemplate { name: "cat", prefix: vec!["cat"], flags: vec![], positionals: vec![SlotKind::SandboxPath] },
            CommandTemplate {
                name: "grep-recursive",
                prefix: vec!["grep", "-R"],
                flags: vec![],
                positionals: vec![SlotKind::Choice(vec![]), SlotKind::SandboxPath],
            },
        ];

        CommandWhitelist { templates, word_lists }
    }

    /// Validates a full `ProcRun` invocation (binary name as `command[0]`)
    /// against the global block list and then the template registry (§4.7).
    /// There is no fallback path: an unregistered shape is rejected outright.
    pub fn validate_invocation(&self, command: &[String], sandbox_root: &Path) -> Result<&'static str, SandboxError> {
        let binary = command.first().ok_or(SandboxError::NoMatchingTemplate)?;
        if is_blocked_binary(binary) {
            return Err(SandboxError::BlockedBinary(binary.clone()));
        }

        self.templates
            .iter()
            .find(|t| t.try_match(command, &self.word_lists, sandbox_root))
            .map(|t| t.name)
            .ok_or(SandboxError::NoMatchingTemplate)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn whitelist() -> CommandWhitelist {
        CommandWhitelist::build(RuntimeConfig {
            project_bases: vec!["myproj".to_string()],
            git_remote_urls: vec!["https://github.com/example/repo.git".to_string()],
        })
    }

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blocks_shell_binaries_outright() {
        for binary in ["bash", "sh", "zsh", "powershell.exe", "curl", "find"] {
            assert!(is_blocked_binary(binary), "{binary} should be blocked");
        }
    }

    #[test]
    fn git_status_matches() {
        assert!(whitelist().validate_invocation(&cmd(&["git", "status"]), Path::new("/sbx")).is_ok());
    }

    #[test]
    fn git_push_has_no_template() {
        assert!(whitelist()
            .validate_invocation(&cmd(&["git", "push", "origin", "main"]), Path::new("/sbx"))
            .is_err());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = whitelist()
            .validate_invocation(&cmd(&["git", "log", "--all"]), Path::new("/sbx"))
            .unwrap_err();
        assert_eq!(err, SandboxError::NoMatchingTemplate);
    }

    #[test]
    fn branch_creation_rejects_protected_names() {
        assert!(whitelist()
            .validate_invocation(&cmd(&["git", "branch", "main"]), Path::new("/sbx"))
            .is_err());
        assert!(whitelist()
            .validate_invocation(&cmd(&["git", "branch", "release-2.0"]), Path::new("/sbx"))
            .is_err());
    }

    #[test]
    fn branch_creation_accepts_listed_candidate() {
        assert!(whitelist()
            .validate_invocation(&cmd(&["git", "branch", "feature-auth"]), Path::new("/sbx"))
            .is_ok());
    }

    #[test]
    fn compound_name_accepts_base_and_bounded_suffix_forms() {
        let wl = whitelist();
        for tag in ["myproj", "myprojdev", "myproj.dev"] {
            assert!(
                wl.validate_invocation(&cmd(&["docker", "build", "-t", tag, "."]), Path::new("/sbx"))
                    .is_ok(),
                "{tag} should be accepted"
            );
        }
        assert!(wl
            .validate_invocation(&cmd(&["docker", "build", "-t", "unrelated", "."]), Path::new("/sbx"))
            .is_err());
    }

    #[test]
    fn git_clone_accepts_configured_remote_only() {
        assert!(whitelist()
            .validate_invocation(&cmd(&["git", "clone", "https://github.com/example/repo.git"]), Path::new("/sbx"))
            .is_ok());
        assert!(whitelist()
            .validate_invocation(&cmd(&["git", "clone", "https://evil.example/whatever.git"]), Path::new("/sbx"))
            .is_err());
    }

    #[test]
    fn extra_positional_argument_is_rejected() {
        assert!(whitelist()
            .validate_invocation(&cmd(&["cat", "a.txt", "b.txt"]), Path::new("/sbx"))
            .is_err());
    }
}
