//! Everything a resolved operation must pass before it is allowed to touch
//! the filesystem, the network, or a child process: path containment, a
//! SSRF-safe URL ruleset, the closed command-template whitelist, and the
//! global gigablacklist scan. This crate has no knowledge of scripts, labels,
//! or variables; it only ever sees fully-resolved strings.

mod config;
mod env;
mod error;
mod gigablacklist;
mod path;
mod url;
mod whitelist;

pub use config::SandboxConfig;
pub use env::is_env_var_allowed;
pub use env::ENV_GET_ALLOWLIST;
pub use error::SandboxError;
pub use gigablacklist::scan_all;
pub use gigablacklist::scan_argument;
pub use gigablacklist::SANDBOX_ENV_FILENAMES;
pub use path::resolve;
pub use path::resolve_for_write;
pub use path::TIER1_BLOCKED_EXTENSIONS;
pub use path::TIER1_BLOCKED_FILENAMES;
pub use url::is_private_or_reserved;
pub use url::validate as validate_url;
pub use url::validate_hostname;
pub use whitelist::is_blocked_binary;
pub use whitelist::CommandTemplate;
pub use whitelist::CommandWhitelist;
pub use whitelist::FlagSpec;
pub use whitelist::RuntimeConfig;
pub use whitelist::SlotKind;
pub use whitelist::BLOCKED_BINARIES;
