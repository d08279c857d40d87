//! Application-wide constants for pyedit-rs.
//!
//! Centralizes timeouts, defaults and limits so the editor, runner and chat
//! client agree on them.

use std::time::Duration;

// ============================================================================
// Application Identity
// ============================================================================

/// GTK Application ID following reverse-DNS convention.
pub const APP_ID: &str = "com.github.pyedit-rs";

/// Application name displayed in window title.
pub const APP_NAME: &str = "PyEdit.rs";

/// Title used for buffers that have never been saved.
pub const UNTITLED_NAME: &str = "Untitled";

// ============================================================================
// Window Configuration
// ============================================================================

/// Default window width in pixels.
pub const DEFAULT_WINDOW_WIDTH: i32 = 1100;

/// Default window height in pixels.
pub const DEFAULT_WINDOW_HEIGHT: i32 = 800;

// ============================================================================
// Editor Configuration
// ============================================================================

/// Delay between the last keystroke and the re-highlighting pass.
pub const HIGHLIGHT_DEBOUNCE_MS: u64 = 100;

/// Delay before the (out of process) syntax probe runs after an edit.
pub const SYNTAX_CHECK_DEBOUNCE_MS: u64 = 400;

/// Number of spaces per indentation level.
pub const INDENT_WIDTH: usize = 4;

/// Upper bound on entries shown in the completion popup.
pub const MAX_COMPLETIONS: usize = 50;

/// Default editor font size in points.
pub const DEFAULT_FONT_SIZE: u32 = 12;

/// Default monospace font family.
pub const DEFAULT_EDITOR_FONT: &str = "Monospace";

// ============================================================================
// Process Execution
// ============================================================================

/// Timeout for the compile-and-catch syntax probe.
pub const SYNTAX_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for piping the buffer through the code formatter.
pub const FORMAT_TIMEOUT: Duration = Duration::from_secs(20);

/// Capacity of the channel carrying run output to the UI thread.
pub const RUN_EVENT_BUFFER: usize = 256;

/// How long a finished run waits for its output readers to drain.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Local LLM Endpoints
// ============================================================================

/// Default LM Studio host.
pub const DEFAULT_LM_STUDIO_IP: &str = "127.0.0.1";

/// Default LM Studio port.
pub const DEFAULT_LM_STUDIO_PORT: u16 = 7860;

/// Default proxy agent host.
pub const DEFAULT_PROXY_AGENT_IP: &str = "localhost";

/// Default proxy agent port.
pub const DEFAULT_PROXY_AGENT_PORT: u16 = 3000;

/// Model sent with chat, edit and completion requests.
pub const DEFAULT_MODEL: &str = "deepseek-coder-v2-lite-instruct";

/// Fixed HTTP timeout for chat requests. Long answers take a while.
pub const CHAT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for cheap metadata calls such as listing models.
pub const MODELS_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// `max_tokens` for chat requests.
pub const CHAT_MAX_TOKENS: u32 = 4000;

/// `max_tokens` for plain completion requests.
pub const COMPLETION_MAX_TOKENS: u32 = 1000;

/// Instruction sent with `/v1/edits` requests.
pub const EDIT_INSTRUCTION: &str = "Fix the code or text";

/// Number of past messages sent as context with each chat request.
pub const HISTORY_CONTEXT_WINDOW: usize = 10;

// ============================================================================
// Persistence
// ============================================================================

/// File name of the endpoint configuration.
pub const PROXY_CONFIG_FILE: &str = "config.json";

/// Fallback directory (under the home directory) for the endpoint configuration.
pub const PROXY_CONFIG_FALLBACK_DIR: &str = ".proxy_lm_studio";

/// Directory holding daily chat history files.
pub const CHAT_HISTORY_DIR: &str = "chat_history";
