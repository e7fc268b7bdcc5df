//! `CommandRunner` adapters.
//!
//! - [`ProcessRunner`] spawns real processes with captured output and an
//!   optional kill-on-timeout.
//! - [`RecordingRunner`] runs nothing; it records specs and answers with a
//!   fixed exit code. Used by tests and by `kiln plan`.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use kiln_core::{
    application::{
        ApplicationError,
        ports::{CommandOutput, CommandRunner, CommandSpec},
    },
    error::{KilnError, KilnResult},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Wait for `child`, killing it once `timeout` elapses. `None` means killed.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl CommandRunner for ProcessRunner {
    #[instrument(skip_all, fields(command = %spec, cwd = %spec.cwd.display()))]
    fn run(&self, spec: &CommandSpec) -> KilnResult<CommandOutput> {
        let started = Instant::now();
        let could_not_start = |reason: String| -> KilnError {
            ApplicationError::CommandFailed {
                command: spec.to_string(),
                code: None,
                stderr: reason,
            }
            .into()
        };

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| could_not_start(format!("failed to start: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, spec.timeout)
            .map_err(|e| could_not_start(format!("failed to wait: {e}")))?;

        // A killed process may leave grandchildren holding the pipes; the
        // drain threads are detached in that case.
        let Some(status) = status else {
            warn!(elapsed_ms = started.elapsed().as_millis() as u64, "Command timed out, killed");
            return Err(ApplicationError::Timeout {
                operation: format!("command `{spec}`"),
                elapsed: started.elapsed(),
            }
            .into());
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        debug!(
            code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Records every spec instead of running it.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    code: i32,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with this exit code.
    pub fn exiting_with(code: i32) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> KilnResult<CommandOutput> {
        debug!(command = %spec, "Recorded command");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        Ok(CommandOutput {
            code: Some(self.code),
            ..CommandOutput::default()
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str, dir: &TempDir) -> CommandSpec {
        CommandSpec::new("sh", dir.path()).args(["-c", script])
    }

    #[test]
    fn captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let out = ProcessRunner
            .run(&sh("echo out; echo err >&2; exit 3", &dir))
            .unwrap();

        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn runs_in_cwd_with_env() {
        let dir = TempDir::new().unwrap();
        let mut spec = sh("printf \"$GREETING\" > greeting.txt", &dir);
        spec.env.insert("GREETING".into(), "hello".into());

        assert!(ProcessRunner.run(&spec).unwrap().success());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn slow_command_is_killed_on_timeout() {
        let dir = TempDir::new().unwrap();
        let mut spec = sh("exec sleep 5", &dir);
        spec.timeout = Some(Duration::from_millis(100));

        let started = Instant::now();
        let err = ProcessRunner.run(&spec).unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let err = ProcessRunner
            .run(&CommandSpec::new("kiln-definitely-not-a-program", dir.path()))
            .unwrap_err();
        assert_eq!(err.code(), "COMMAND_FAILED");
    }

    #[test]
    fn recording_runner_records() {
        let runner = RecordingRunner::exiting_with(1);
        let spec = CommandSpec::new("npm", "/p").args(["install"]);
        assert_eq!(runner.run(&spec).unwrap().code, Some(1));
        assert_eq!(runner.calls(), vec![spec]);
    }
}
