//! Blocking child-process execution with captured output.
//!
//! Output is drained on reader threads while the child runs so a chatty
//! process can never deadlock on a full pipe. The caller's thread blocks
//! until the child exits or, when a timeout is set, until it is killed.
//! On timeout the readers are detached: grandchildren that inherited the
//! pipes may keep them open long after the direct child is gone.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Everything needed to launch one process.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Extra environment on top of the inherited one.
    pub env: Vec<(String, String)>,
    /// Kill the child after this long. `None` waits for exit.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Output of a process that exited with code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started at all.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    /// Non-zero exit. `message` is trimmed stderr, else trimmed stdout, else
    /// a generic exit-code line.
    #[error("{message}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        message: String,
        stdout: String,
        stderr: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    /// True when the executable itself was not found.
    pub fn is_missing_executable(&self) -> bool {
        matches!(
            self,
            ProcessError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }

    fn io(context: impl Into<String>, source: io::Error) -> Self {
        ProcessError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Run `spec` to completion and return its output if it exits with code 0.
#[instrument(
    skip_all,
    fields(program = %spec.program, timeout_secs = spec.timeout.map(|t| t.as_secs()))
)]
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.workdir)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(command = %spec.display(), "spawning child process");
    let mut child = cmd.spawn().map_err(|source| {
        error!(err = %source, program = %spec.program, "failed to spawn command");
        ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        }
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProcessError::io("stdout", io::Error::other("stdout was not piped")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProcessError::io("stderr", io::Error::other("stderr was not piped")))?;
    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let (status, timed_out) = wait_for_exit(&mut child, spec.timeout)?;

    if let Some(timeout) = spec.timeout.filter(|_| timed_out) {
        warn!(timeout_secs = timeout.as_secs(), program = %spec.program, "command timed out");
        drop((stdout_handle, stderr_handle));
        return Err(ProcessError::TimedOut {
            program: spec.program.clone(),
            timeout,
        });
    }

    let stdout = join_output(stdout_handle)?;
    let stderr = join_output(stderr_handle)?;

    debug!(exit_code = ?status.code(), "command finished");
    if !status.success() {
        return Err(ProcessError::Failed {
            program: spec.program.clone(),
            exit_code: status.code(),
            message: failure_message(&spec.program, status.code(), &stdout, &stderr),
            stdout,
            stderr,
        });
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(0),
    })
}

fn wait_for_exit(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, bool), ProcessError> {
    let Some(timeout) = timeout else {
        let status = child
            .wait()
            .map_err(|e| ProcessError::io("wait for command", e))?;
        return Ok((status, false));
    };
    match child
        .wait_timeout(timeout)
        .map_err(|e| ProcessError::io("wait for command", e))?
    {
        Some(status) => Ok((status, false)),
        None => {
            child
                .kill()
                .map_err(|e| ProcessError::io("kill command", e))?;
            let status = child
                .wait()
                .map_err(|e| ProcessError::io("wait command after kill", e))?;
            Ok((status, true))
        }
    }
}

fn failure_message(program: &str, code: Option<i32>, stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    match code {
        Some(code) => format!("{program} failed with exit code {code}"),
        None => format!("{program} was terminated by a signal"),
    }
}

fn join_output(handle: thread::JoinHandle<io::Result<String>>) -> Result<String, ProcessError> {
    match handle.join() {
        Ok(result) => result.map_err(|e| ProcessError::io("read output", e)),
        Err(_) => Err(ProcessError::io(
            "read output",
            io::Error::other("output reader thread panicked"),
        )),
    }
}

fn read_stream<R: Read>(mut reader: R) -> io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir()).args(["-c", script])
    }

    #[test]
    fn captures_both_streams_on_success() {
        let out = run_command(&sh("printf out; printf err >&2")).expect("run");
        assert_eq!(out.stdout, "out");
        assert_eq!(out.stderr, "err");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn failure_prefers_trimmed_stderr() {
        let err = run_command(&sh("echo noise; echo '  bad thing  ' >&2; exit 3")).unwrap_err();
        match err {
            ProcessError::Failed {
                exit_code, message, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(message, "bad thing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failure_falls_back_to_stdout_then_exit_code() {
        let err = run_command(&sh("echo only-stdout; exit 1")).unwrap_err();
        assert_eq!(err.to_string(), "only-stdout");
        let err = run_command(&sh("exit 7")).unwrap_err();
        assert_eq!(err.to_string(), "sh failed with exit code 7");
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let spec = CommandSpec::new("autosave-definitely-missing-binary", std::env::temp_dir());
        let err = run_command(&spec).unwrap_err();
        assert!(err.is_missing_executable());
    }

    #[test]
    fn timeout_kills_the_child() {
        let spec = sh("exec sleep 5").timeout(Duration::from_millis(200));
        let err = run_command(&spec).unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[test]
    fn timeout_does_not_wait_for_grandchildren() {
        let started = Instant::now();
        let spec = sh("sleep 4; echo done").timeout(Duration::from_millis(200));
        let err = run_command(&spec).unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn passes_extra_environment() {
        let out = run_command(&sh("printf \"$AUTOSAVE_EXTRA\"").env("AUTOSAVE_EXTRA", "set"))
            .expect("run");
        assert_eq!(out.stdout, "set");
    }
}
