use crate::constants::FORMAT_TIMEOUT;
use crate::process::{run_with_input, Interpreter, RunError};

/// Pipes `source` through `black` and returns the formatted text.
pub async fn format_source(interpreter: &Interpreter, source: &str) -> Result<String, RunError> {
    let mut cmd = interpreter.command();
    cmd.args(["-m", "black", "-q", "-"]);
    let output = run_with_input(cmd, source, FORMAT_TIMEOUT).await?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = if stderr.contains("No module named black") {
        "black is not installed (pip install black)".to_string()
    } else {
        stderr
            .lines()
            .find(|l| l.starts_with("error:"))
            .unwrap_or_else(|| stderr.trim())
            .to_string()
    };
    tracing::warn!("Formatting failed: {}", reason);
    Err(RunError::Failed(format!("Formatting failed: {}", reason)))
}

/// What to do with a formatter result once it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatResult {
    /// The buffer was edited while the formatter ran.
    Stale,
    Unchanged,
    Replace(String),
}

/// Compares the formatted text against what was sent and what the buffer
/// holds now. Edits made in the meantime always win.
pub fn reconcile(sent: &str, current: &str, formatted: String) -> FormatResult {
    if current != sent {
        FormatResult::Stale
    } else if formatted == sent {
        FormatResult::Unchanged
    } else {
        FormatResult::Replace(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_format_with_black_if_present() {
        let interpreter = Interpreter::default();
        if !interpreter.is_available().await {
            return;
        }
        match format_source(&interpreter, "x=[1,2 ,3]\n").await {
            Ok(formatted) => assert_eq!(formatted, "x = [1, 2, 3]\n"),
            Err(RunError::Failed(msg)) => assert!(msg.starts_with("Formatting failed")),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_reconcile_keeps_edits_made_while_formatting() {
        assert_eq!(reconcile("x=1\n", "x=1\nx", "x = 1\n".to_string()), FormatResult::Stale);
        assert_eq!(reconcile("x = 1\n", "x = 1\n", "x = 1\n".to_string()), FormatResult::Unchanged);
        assert_eq!(
            reconcile("x=1\n", "x=1\n", "x = 1\n".to_string()),
            FormatResult::Replace("x = 1\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let err = format_source(&Interpreter::new("no-such-python-5512"), "x = 1\n")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }
}
