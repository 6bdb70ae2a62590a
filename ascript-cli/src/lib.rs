mod cli;
mod request;

use std::io::Read;
use std::sync::Arc;

use ascript_protocol::AuditEntry;
use ascript_protocol::ScriptResult;
pub use cli::Cli;
use request::Request;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let default_level = "error";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level)).unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .try_init();

    let raw = read_request(cli.request_file.as_deref())?;
    let request: Request = serde_json::from_str(&raw)?;
    let (result, audit) = compile_and_execute(request, &cli.job_id).await?;

    let output = serde_json::json!({ "result": result, "audit": audit });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !result.all_succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// The testable core of `run_main`: compiles the request's `Script` against
/// its `WorkspaceContext` and runs it. Split out from `run_main` so tests can
/// exercise it directly without going through stdin/stdout or the
/// success/failure exit code.
async fn compile_and_execute(request: Request, job_id: &str) -> anyhow::Result<(ScriptResult, Vec<AuditEntry>)> {
    let sandbox_config = ascript_sandbox::SandboxConfig::new(request.project_bases, request.git_remote_urls, request.allow_plain_http);
    let whitelist = ascript_sandbox::CommandWhitelist::build(sandbox_config.runtime);

    let compiled = ascript_core::compile_script(&request.script, request.workspace, &whitelist, sandbox_config.allow_plain_http)?;
    tracing::info!(job_id, step_count = compiled.step_count(), "compiled script");

    let (result, audit) = ascript_exec::execute(&compiled, job_id, Arc::new(Notify::new())).await;
    tracing::info!(job_id, all_succeeded = result.all_succeeded, "script finished");
    Ok((result, audit))
}

fn read_request(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
