//! Resource-limited child process execution.
//!
//! Every build and every run goes through [`execute`]. Output is drained
//! concurrently while the child runs, stdin is fed from its own thread, and
//! the whole process group is killed when a ceiling is hit or the run ends. Failures are
//! reported in the returned [`ProcessResult`], never as `Err`.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{LimitKind, ProcessResult, ResourceLimits, RunStatus};
use crate::io::watchdog::{WatchdogConfig, group_memory_bytes};

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// Wait slice while background group members still hold the output pipes.
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// One invocation: argument vector, private working directory, and ceilings.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub limits: ResourceLimits,
    pub output_limit_bytes: usize,
    pub watchdog: WatchdogConfig,
}

impl ProcessRequest {
    pub fn new(argv: Vec<String>, workdir: PathBuf, limits: ResourceLimits) -> Self {
        Self {
            argv,
            workdir,
            limits,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            watchdog: WatchdogConfig::default(),
        }
    }

    pub fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn with_output_limit(mut self, output_limit_bytes: usize) -> Self {
        self.output_limit_bytes = output_limit_bytes;
        self
    }
}

/// How supervision of a child ended.
#[derive(Debug)]
enum Termination {
    Exited(ExitStatus),
    Killed(LimitKind, ExitStatus),
}

/// Run a command under the request's limits, feeding `stdin` to it.
#[instrument(skip_all, fields(program = request.argv.first().map(String::as_str), time_limit_ms = request.limits.time_limit().as_millis() as u64, memory_limit = request.limits.memory_limit()))]
pub fn execute(request: &ProcessRequest, stdin: Option<&[u8]>) -> ProcessResult {
    match execute_inner(request, stdin) {
        Ok(result) => result,
        Err(err) => {
            error!(err = %format!("{err:#}"), "process supervision failed");
            ProcessResult::spawn_error(format!("{err:#}"))
        }
    }
}

fn execute_inner(request: &ProcessRequest, stdin: Option<&[u8]>) -> Result<ProcessResult> {
    let argv = request
        .watchdog
        .wrap(request.argv.clone(), &request.limits)
        .context("wrap command with watchdog")?;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&request.workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {program}"));
        }
    };

    let stdin_handle = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || match pipe.write_all(&input) {
                // The child may legitimately exit without reading all of its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }))
        }
        _ => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = request.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    let drained = || stdout_handle.is_finished() && stderr_handle.is_finished();
    let (termination, peak_memory) = supervise(&mut child, request, drained)?;
    let elapsed = started.elapsed();

    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Err(e)) => warn!(err = %e, "failed to write stdin"),
            Err(_) => warn!("stdin writer thread panicked"),
            Ok(Ok(())) => {}
        }
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }
    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    let (status, exit_status) = match termination {
        Termination::Killed(kind, exit_status) => (RunStatus::LimitExceeded(kind), exit_status),
        Termination::Exited(exit_status) => {
            let status = if let Some(kind) = request.watchdog.helper_violation(&stderr) {
                RunStatus::LimitExceeded(kind)
            } else if peak_memory.is_some_and(|peak| peak > request.limits.memory_limit()) {
                RunStatus::LimitExceeded(LimitKind::Memory)
            } else if exit_status.success() {
                RunStatus::Success
            } else {
                RunStatus::RuntimeError
            };
            (status, exit_status)
        }
    };

    debug!(exit_code = ?exit_status.code(), signal = ?exit_status.signal(), ?status, elapsed_ms = elapsed.as_millis() as u64, "command finished");
    Ok(ProcessResult {
        status,
        stdout,
        stderr,
        exit_code: exit_status.code(),
        signal: exit_status.signal(),
        elapsed,
        peak_memory,
        stdout_truncated,
        stderr_truncated,
        error: None,
    })
}

/// Wait for the child and every process it left behind in its group.
///
/// The run is over once the child has exited and both output readers hit
/// EOF. Background members still holding the pipes at the deadline count as
/// a time violation. In procfs mode the group's memory is sampled between
/// wait slices.
fn supervise(
    child: &mut Child,
    request: &ProcessRequest,
    drained: impl Fn() -> bool,
) -> Result<(Termination, Option<u64>)> {
    let pgid = Pid::from_raw(child.id() as i32);
    let deadline = Instant::now() + request.watchdog.hard_deadline(&request.limits);
    let poll = request.watchdog.poll_interval();
    let memory_limit = request.limits.memory_limit();
    let mut peak: Option<u64> = None;
    let mut exited: Option<ExitStatus> = None;

    loop {
        let now = Instant::now();
        if now >= deadline {
            warn!(
                time_limit_ms = request.limits.time_limit().as_millis() as u64,
                child_exited = exited.is_some(),
                "command timed out, killing"
            );
            let status = kill_group(child, pgid, exited)?;
            return Ok((Termination::Killed(LimitKind::Time, status), peak));
        }
        let remaining = deadline - now;

        match exited {
            None => {
                let slice = poll.map_or(remaining, |p| p.min(remaining));
                exited = child.wait_timeout(slice).context("wait for command")?;
            }
            Some(_) => thread::sleep(DRAIN_POLL.min(remaining)),
        }

        if let Some(status) = exited
            && drained()
        {
            // Members that closed their pipes may still be running.
            signal_group(pgid);
            return Ok((Termination::Exited(status), peak));
        }

        if poll.is_some()
            && let Some(sample) = group_memory_bytes(pgid.as_raw())
        {
            let current = peak.map_or(sample, |p| p.max(sample));
            peak = Some(current);
            if current > memory_limit {
                warn!(peak = current, memory_limit, "memory limit exceeded, killing");
                let status = kill_group(child, pgid, exited)?;
                return Ok((Termination::Killed(LimitKind::Memory, status), peak));
            }
        }
    }
}

/// SIGKILL the whole group. A group with no members left is not an error.
fn signal_group(pgid: Pid) -> bool {
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => true,
        Err(Errno::ESRCH) => true,
        Err(e) => {
            debug!(err = %e, "killpg failed");
            false
        }
    }
}

/// Kill the child's process group so grandchildren (compiler passes,
/// shells, background jobs) release the output pipes too, then reap the
/// child unless it was already reaped.
fn kill_group(child: &mut Child, pgid: Pid, exited: Option<ExitStatus>) -> Result<ExitStatus> {
    if !signal_group(pgid) && exited.is_none() {
        child.kill().context("kill command")?;
    }
    match exited {
        Some(status) => Ok(status),
        None => child.wait().context("wait command after kill"),
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BYTES_PER_MB;

    fn request(argv: &[&str], time_ms: u64, memory_mb: u64) -> ProcessRequest {
        let limits = ResourceLimits::from_millis_and_mb(time_ms, memory_mb).expect("limits");
        ProcessRequest::new(
            argv.iter().map(|s| s.to_string()).collect(),
            std::env::temp_dir(),
            limits,
        )
    }

    #[test]
    fn captures_stdout_and_stdin_round_trip() {
        let req = request(&["cat"], 5_000, 256);
        let result = execute(&req, Some(b"1 2 3\n"));
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.stdout, "1 2 3\n");
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn nonzero_exit_is_runtime_error_with_stderr() {
        let req = request(&["sh", "-c", "echo partial; echo oops >&2; exit 3"], 5_000, 256);
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::RuntimeError);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "partial\n");
        assert_eq!(result.stderr, "oops\n");
    }

    #[test]
    fn sleeping_past_the_limit_is_a_time_violation() {
        let req = request(&["sh", "-c", "echo started; sleep 10"], 300, 256);
        let started = Instant::now();
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::LimitExceeded(LimitKind::Time));
        assert_eq!(result.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn allocating_past_the_limit_is_a_memory_violation() {
        // awk doubles a string until it is ~512 MiB; the limit is 32 MiB.
        let script = r#"BEGIN { s = "xxxxxxxxxxxxxxxx"; while (length(s) < 536870912) s = s s; print length(s) }"#;
        let req = request(&["awk", script], 20_000, 32);
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::LimitExceeded(LimitKind::Memory));
        assert!(result.peak_memory.expect("peak observed") > 32 * BYTES_PER_MB);
    }

    #[test]
    fn background_job_holding_stdout_is_a_time_violation() {
        let req = request(&["sh", "-c", "sleep 30 & echo hi"], 500, 256);
        let started = Instant::now();
        let result = execute(&req, None);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.status, RunStatus::LimitExceeded(LimitKind::Time));
        assert_eq!(result.stdout, "hi\n");
    }

    #[test]
    fn detached_background_job_does_not_delay_the_result() {
        let req = request(
            &["sh", "-c", "sleep 30 </dev/null >/dev/null 2>&1 & echo hi"],
            5_000,
            256,
        );
        let started = Instant::now();
        let result = execute(&req, None);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.stdout, "hi\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn memory_of_grandchildren_counts_against_the_limit() {
        // The trailing echo keeps sh from exec-ing awk, so the hog is a grandchild.
        let script = r#"awk 'BEGIN { s = "xxxxxxxxxxxxxxxx"; while (length(s) < 268435456) s = s s; print length(s) }'; echo done"#;
        let req = request(&["sh", "-c", script], 20_000, 32);
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::LimitExceeded(LimitKind::Memory));
        assert!(result.peak_memory.expect("peak observed") > 32 * BYTES_PER_MB);
        assert!(!result.stdout.contains("done"));
    }

    #[test]
    fn missing_program_is_reported_not_raised() {
        let req = request(&["definitely-not-a-real-program-xyz"], 1_000, 16);
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::SpawnError);
        assert!(result.error.expect("error").contains("spawn"));
    }

    #[test]
    fn output_beyond_limit_is_truncated_but_drained() {
        let req = request(&["sh", "-c", "printf 'abcdefghij'"], 5_000, 256).with_output_limit(4);
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.stdout, "abcd");
        assert_eq!(result.stdout_truncated, 6);
    }

    #[test]
    fn helper_marker_overrides_exit_classification() {
        let watchdog = WatchdogConfig::Helper {
            command: crate::template::CommandTemplate::new([
                "sh",
                "-c",
                "echo 'MEM {{ memory_kb }}' >&2; exit 1",
                "helper",
            ]),
            time_marker: "TIMEOUT".to_string(),
            memory_marker: "MEM".to_string(),
        };
        let req = request(&["true"], 1_000, 1).with_watchdog(watchdog);
        let result = execute(&req, None);
        assert_eq!(result.status, RunStatus::LimitExceeded(LimitKind::Memory));
        assert_eq!(result.stderr, "MEM 1024\n");
    }
}
