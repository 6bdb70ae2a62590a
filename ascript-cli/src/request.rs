use ascript_protocol::Script;
use ascript_protocol::WorkspaceContext;
use serde::Deserialize;

/// The JSON shape `ascript-cli` reads from a file or stdin: a `Script` plus
/// everything a host would otherwise supply once at startup; the
/// already-resolved workspace context and the runtime knobs
/// `ascript_sandbox::SandboxConfig` bakes into the command whitelist.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub script: Script,
    pub workspace: WorkspaceContext,
    #[serde(default)]
    pub project_bases: Vec<String>,
    #[serde(default)]
    pub git_remote_urls: Vec<String>,
    #[serde(default)]
    pub allow_plain_http: bool,
}
