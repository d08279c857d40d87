//! Runs user code in a separate interpreter process and streams its output.
//!
//! The supervisor and the stream readers live on tokio tasks; everything
//! they observe is posted to a channel that the UI thread drains, so no
//! worker ever touches a widget.

use crate::constants::{OUTPUT_DRAIN_GRACE, RUN_EVENT_BUFFER};
use crate::process::{Interpreter, RunError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// A saved script, run from its own directory.
    File(PathBuf),
    /// Inline source passed with `-c`.
    Code(String),
}

/// Progress of a run, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { pid: Option<u32> },
    Stdout(String),
    Stderr(String),
    Exited(Option<i32>),
    Stopped,
    Failed(String),
}

/// Handle to a running process. Dropping it stops the process.
#[derive(Debug)]
pub struct RunHandle {
    stop: Option<oneshot::Sender<()>>,
    finished: Arc<AtomicBool>,
}

impl RunHandle {
    /// Requests termination. Returns false when the run had already ended.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.stop.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.finished.load(Ordering::SeqCst) && self.stop.is_some()
    }
}

pub struct ProcessRunner;

impl ProcessRunner {
    /// Launches `target` on `interpreter`. Must be called inside a tokio runtime.
    pub fn spawn(
        interpreter: &Interpreter,
        target: RunTarget,
    ) -> (RunHandle, mpsc::Receiver<RunEvent>) {
        let (events, rx) = mpsc::channel(RUN_EVENT_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));

        let mut cmd = interpreter.command();
        cmd.env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        match &target {
            RunTarget::File(path) => {
                cmd.arg(path);
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    cmd.current_dir(dir);
                }
            }
            RunTarget::Code(code) => {
                cmd.arg("-c").arg(code);
            }
        }

        let program = interpreter.program().display().to_string();
        tokio::spawn(supervise(cmd, program, events, stop_rx, finished.clone()));

        (
            RunHandle {
                stop: Some(stop_tx),
                finished,
            },
            rx,
        )
    }
}

async fn supervise(
    mut cmd: tokio::process::Command,
    program: String,
    events: mpsc::Sender<RunEvent>,
    stop_rx: oneshot::Receiver<()>,
    finished: Arc<AtomicBool>,
) {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let err = RunError::Spawn { program, source };
            tracing::error!("{}", err);
            finished.store(true, Ordering::SeqCst);
            let _ = events.send(RunEvent::Failed(err.to_string())).await;
            return;
        }
    };

    let pid = child.id();
    tracing::info!("Started {} (pid {:?})", program, pid);
    let _ = events.send(RunEvent::Started { pid }).await;

    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(out, events.clone(), RunEvent::Stdout)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(err, events.clone(), RunEvent::Stderr)));

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => RunEvent::Exited(status.code()),
            Err(e) => RunEvent::Failed(format!("failed to wait for process: {}", e)),
        },
        _ = stop_rx => {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill pid {:?}: {}", pid, e);
            }
            RunEvent::Stopped
        }
    };

    // Deliver buffered output before the final event. A grandchild that
    // inherited the pipes may keep them open, so the wait is bounded.
    for mut reader in [stdout, stderr].into_iter().flatten() {
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut reader).await.is_err() {
            tracing::debug!("Output of pid {:?} still open, detaching reader", pid);
            reader.abort();
        }
    }
    tracing::info!("Process {:?} finished: {:?}", pid, outcome);
    finished.store(true, Ordering::SeqCst);
    let _ = events.send(outcome).await;
}

async fn forward_lines<R>(stream: R, events: mpsc::Sender<RunEvent>, wrap: fn(String) -> RunEvent)
where
    R: AsyncRead + Unpin,
{
    // Bytes rather than `lines()` so invalid UTF-8 is replaced, not fatal.
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if events.send(wrap(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Output stream closed with error: {}", e);
                break;
            }
        }
    }
}

/// Opens the platform terminal in `dir`.
pub fn open_terminal(dir: &Path) -> Result<(), RunError> {
    let candidates: Vec<(&str, Vec<&str>)> = if cfg!(target_os = "windows") {
        vec![("cmd", vec!["/c", "start", "cmd"])]
    } else if cfg!(target_os = "macos") {
        vec![("open", vec!["-a", "Terminal", "."])]
    } else {
        ["x-terminal-emulator", "gnome-terminal", "konsole", "xterm"]
            .into_iter()
            .map(|t| (t, Vec::new()))
            .collect()
    };

    let mut last_err = None;
    for (program, args) in candidates {
        match std::process::Command::new(program)
            .args(&args)
            .current_dir(dir)
            .spawn()
        {
            Ok(_) => {
                tracing::info!("Opened {} in {}", program, dir.display());
                return Ok(());
            }
            Err(source) => {
                last_err = Some(RunError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
        }
    }
    Err(last_err.unwrap_or_else(|| RunError::Failed("no terminal available".to_string())))
}
