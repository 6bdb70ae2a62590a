use std::path::PathBuf;

use clap::Parser;

/// Compiles and runs one agent command script, non-interactively.
///
/// Reads a JSON request (a `Script`, a `WorkspaceContext`, and the sandbox's
/// runtime knobs) from `request_file`, or from stdin when no path is given.
/// Prints the compiled script's `ScriptResult` and audit trail as JSON on
/// stdout and exits non-zero if any main step failed.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Path to the JSON request file. Reads from stdin when omitted.
    pub request_file: Option<PathBuf>,

    /// Identifier stamped onto every audit entry this run produces.
    #[arg(long, default_value = "ascript-cli")]
    pub job_id: String,
}
