//! Compile-and-catch syntax probe.
//!
//! The buffer is handed to the real interpreter, which compiles it without
//! running it and reports the first `SyntaxError` as a line of JSON.

use crate::constants::SYNTAX_CHECK_TIMEOUT;
use crate::process::{run_with_input, Interpreter, RunError};
use serde::Deserialize;
use std::fmt;

const PROBE_SCRIPT: &str = r#"import sys, json
src = sys.stdin.buffer.read().decode("utf-8", "replace")
try:
    compile(src, "<string>", "exec")
except SyntaxError as e:
    print(json.dumps({"line": e.lineno, "column": e.offset, "message": e.msg}))
except ValueError as e:
    print(json.dumps({"line": None, "column": None, "message": str(e)}))
"#;

/// First syntax error reported by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based line number.
    pub line: usize,
    pub column: Option<usize>,
    pub message: String,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Syntax error on line {}: {}", self.line, self.message)
    }
}

#[derive(Deserialize)]
struct ProbeReport {
    line: Option<usize>,
    column: Option<usize>,
    message: String,
}

/// Parses the probe's stdout. Empty output means the source compiled.
pub fn parse_probe_output(stdout: &str) -> Option<SyntaxIssue> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    match serde_json::from_str::<ProbeReport>(line) {
        Ok(report) => Some(SyntaxIssue {
            line: report.line.unwrap_or(1).max(1),
            column: report.column,
            message: report.message,
        }),
        Err(e) => {
            tracing::debug!("Unparseable syntax probe output {:?}: {}", line, e);
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxProbe {
    interpreter: Interpreter,
}

impl SyntaxProbe {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    /// Compiles `source` out of process; `Ok(None)` when it is valid.
    pub async fn check(&self, source: &str) -> Result<Option<SyntaxIssue>, RunError> {
        let mut cmd = self.interpreter.command();
        cmd.arg("-c").arg(PROBE_SCRIPT);
        let output = run_with_input(cmd, source, SYNTAX_CHECK_TIMEOUT).await?;
        if !output.status.success() {
            return Err(RunError::Failed(format!(
                "syntax probe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_probe_output(&String::from_utf8_lossy(&output.stdout)))
    }
}
