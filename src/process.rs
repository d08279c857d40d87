//! Helpers for short-lived child processes (syntax probe, formatter) and the
//! Python interpreter they run on.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors from launching or supervising a child process.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("process timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
}

/// The Python interpreter used to run, probe and format code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    program: PathBuf,
}

impl Default for Interpreter {
    fn default() -> Self {
        let program = if cfg!(windows) { "python" } else { "python3" };
        Self::new(program)
    }
}

impl Interpreter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `configured` when it is set and non-blank, the platform default otherwise.
    pub fn resolve(configured: Option<&str>) -> Self {
        match configured.map(str::trim) {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::default(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A fresh command for this interpreter. The child dies with the handle.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Checks that the interpreter can be launched at all.
    pub async fn is_available(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        matches!(cmd.status().await, Ok(status) if status.success())
    }
}

/// Runs `cmd`, feeding `input` on stdin, and collects its output.
///
/// The child is killed when `timeout` elapses.
pub async fn run_with_input(
    mut cmd: Command,
    input: &str,
    timeout: Duration,
) -> Result<Output, RunError> {
    let program = cmd.as_std().get_program().to_string_lossy().to_string();
    cmd.kill_on_drop(true)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|source| RunError::Spawn { program, source })?;

    let stdin = child.stdin.take();
    let input = input.as_bytes().to_vec();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            // A child that exits without reading stdin closes the pipe early.
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        }
    };

    let run = async {
        let (_, output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(RunError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_interpreter() {
        assert_eq!(Interpreter::resolve(None), Interpreter::default());
        assert_eq!(Interpreter::resolve(Some("   ")), Interpreter::default());
        assert_eq!(
            Interpreter::resolve(Some("/opt/py/bin/python3.12")).program(),
            Path::new("/opt/py/bin/python3.12")
        );
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "process timed out after 5 seconds");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-program-4821");
        let err = run_with_input(cmd, "", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_input_is_piped_through() {
        let cmd = Command::new("cat");
        let output = run_with_input(cmd, "hello\n", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let err = run_with_input(cmd, "", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout(_)));
    }
}
