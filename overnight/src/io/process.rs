//! Helpers for running child processes with timeouts and bounded output.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Extra time given to output readers once the child is gone.
const KILL_GRACE: Duration = Duration::from_millis(500);
const READER_POLL: Duration = Duration::from_millis(10);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Diagnostic text for a check: stderr when it has content, else stdout.
    pub fn diagnostic_text(&self) -> String {
        let (mut text, truncated, stream) = if self.stderr.iter().any(|b| !b.is_ascii_whitespace()) {
            (self.stderr_text(), self.stderr_truncated, "stderr")
        } else {
            (self.stdout_text(), self.stdout_truncated, "stdout")
        };
        if truncated > 0 {
            text.push_str(&format!("\n[{stream} truncated {truncated} bytes]\n"));
        }
        text
    }
}

/// True when `err` came from spawning a program that does not exist.
pub fn is_missing_program(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
    })
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs_f64(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };
    let pid = child.id();
    let started = Instant::now();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs_f64(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            kill_process_group(pid);
            child.wait().context("wait command after kill")?
        }
    };

    // Descendants that outlive the child keep the pipes open; the readers
    // get whatever budget is left, then the group is killed.
    let readers_by = Instant::now() + timeout.saturating_sub(started.elapsed()).max(KILL_GRACE);
    if !wait_for_readers(&stdout_handle, &stderr_handle, readers_by) {
        warn!("child left descendants holding its output, killing process group");
        timed_out = true;
        kill_process_group(pid);
        wait_for_readers(&stdout_handle, &stderr_handle, Instant::now() + KILL_GRACE);
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

type ReaderHandle = thread::JoinHandle<Result<(Vec<u8>, usize)>>;

/// Poll both readers until they finish or `by` passes. True when both finished.
fn wait_for_readers(stdout: &ReaderHandle, stderr: &ReaderHandle, by: Instant) -> bool {
    loop {
        if stdout.is_finished() && stderr.is_finished() {
            return true;
        }
        if Instant::now() >= by {
            return false;
        }
        thread::sleep(READER_POLL);
    }
}

/// Join a finished reader. A reader still blocked on a leaked pipe is
/// detached and its output dropped.
fn join_output(handle: ReaderHandle) -> Result<(Vec<u8>, usize)> {
    if !handle.is_finished() {
        warn!("output reader still blocked, discarding its output");
        return Ok((Vec::new(), 0));
    }
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Start the child as the leader of a new process group so a timeout can
/// take down everything it spawned.
#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // ESRCH just means the whole group is already gone.
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL)
        && err != nix::errno::Errno::ESRCH
    {
        warn!(err = %err, pid, "failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
