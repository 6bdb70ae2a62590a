use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ascript_protocol::CompiledCommand;
use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::error::ExecError;
use crate::tail_buffer::TailBuffer;

const MAX_STREAM_LINES: usize = 256;

/// Result of running a whitelisted process to completion, timeout, or
/// cancellation. There is no `Result<_, ExecError>` wrapper on the process
/// outcome itself; a non-zero exit or a timeout is data the executor
/// interprets as a step failure, not an `ExecError`; only I/O-layer problems
/// spawning or reading the child are `ExecError`s.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

/// Spawns `command` with a bare argv; no shell is ever invoked, so there is
/// no metacharacter for an argument to abuse even if it slipped past the
/// gigablacklist. stdin is closed immediately so a command that blocks
/// waiting for input fails fast instead of hanging out the step timeout.
///
/// On Unix the child is placed in its own process group (§4.10): a timeout
/// or cancellation signals the whole group, not just the direct child, so a
/// process that forks its own children (a build tool invoking a compiler)
/// can't outlive the step that spawned it.
pub async fn run_process(
    command: &CompiledCommand,
    cwd: &Path,
    timeout: Duration,
    max_output_bytes: usize,
    cancel: Arc<Notify>,
) -> Result<ProcessOutcome, ExecError> {
    let mut cmd = Command::new(&command.executable);
    cmd.args(&command.arguments);
    cmd.current_dir(cwd);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child: Child = cmd.spawn()?;
    let pid = child.id();
    let stdout = child.stdout.take().ok_or_else(|| std::io::Error::other("stdout pipe unavailable"))?;
    let stderr = child.stderr.take().ok_or_else(|| std::io::Error::other("stderr pipe unavailable"))?;

    let stdout_task = tokio::spawn(read_capped(BufReader::new(stdout), max_output_bytes));
    let stderr_task = tokio::spawn(read_capped(BufReader::new(stderr), max_output_bytes));

    let (exit_code, timed_out, cancelled) = tokio::select! {
        result = tokio::time::timeout(timeout, child.wait()) => {
            match result {
                Ok(status) => (status?.code(), false, false),
                Err(_) => {
                    kill_process_group(pid);
                    child.start_kill()?;
                    let _ = child.wait().await;
                    (None, true, false)
                }
            }
        }
        _ = cancel.notified() => {
            kill_process_group(pid);
            child.start_kill()?;
            let _ = child.wait().await;
            (None, false, true)
        }
    };

    let (stdout, stdout_truncated) = stdout_task.await??;
    let (stderr, stderr_truncated) = stderr_task.await??;

    Ok(ProcessOutcome { exit_code, stdout, stderr, stdout_truncated, stderr_truncated, timed_out, cancelled })
}

/// Sends `SIGKILL` to the whole process group `pid` leads (§4.10). `pid` is
/// only `None` if the child already exited between spawn and this call, in
/// which case there is no group left to signal. Best-effort: a group that
/// has already reaped itself simply returns `ESRCH`, which this ignores.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R, cap_bytes: usize) -> Result<(String, bool), ExecError> {
    let mut buffer = TailBuffer::new(cap_bytes, MAX_STREAM_LINES);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.push(&chunk[..n]);
    }
    Ok(buffer.finish())
}
