//! Chat history kept in memory and persisted as one JSON file per day.

use crate::api::{ChatMessage, ChatRole};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

impl HistoryEntry {
    pub fn now(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now().naive_local(),
        }
    }
}

/// File layout chosen by extension when exporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Transcript,
}

impl ExportFormat {
    /// `.json` keeps the full entries; anything else gets the readable transcript.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Transcript,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChatHistory {
    entries: Vec<HistoryEntry>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn record(&mut self, role: ChatRole, content: impl Into<String>) {
        self.push(HistoryEntry::now(role, content));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    /// The last `n` entries as request messages.
    pub fn context_messages(&self, n: usize) -> Vec<ChatMessage> {
        self.recent(n)
            .iter()
            .map(|e| ChatMessage {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    /// `<dir>/chat_YYYYMMDD.json`.
    pub fn file_for(dir: &Path, date: NaiveDate) -> PathBuf {
        dir.join(format!("chat_{}.json", date.format("%Y%m%d")))
    }

    pub fn today_file(dir: &Path) -> PathBuf {
        Self::file_for(dir, Local::now().date_naive())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create history directory: {:?}", dir))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, json).with_context(|| format!("Failed to write history: {:?}", path))?;
        tracing::debug!("Saved {} history entries to {:?}", self.entries.len(), path);
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read history: {:?}", path))?;
        let entries: Vec<HistoryEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Malformed history file: {:?}", path))?;
        Ok(Self { entries })
    }

    /// Writes the conversation to a user-chosen file. Only the JSON form can
    /// be imported again with `load_from`.
    pub fn export_to(&self, path: &Path) -> Result<ExportFormat> {
        let format = ExportFormat::for_path(path);
        match format {
            ExportFormat::Json => self.save_to(path)?,
            ExportFormat::Transcript => {
                let text = format!(
                    "PyEdit.rs chat - {}\n{}\n\n{}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    "=".repeat(50),
                    self.to_transcript()
                );
                fs::write(path, text)
                    .with_context(|| format!("Failed to write transcript: {:?}", path))?;
            }
        }
        tracing::info!("Exported {} messages to {:?}", self.entries.len(), path);
        Ok(format)
    }

    /// Plain-text rendering, one `[HH:MM:SS] Speaker: text` block per entry.
    pub fn to_transcript(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "[{}] {}: {}\n\n",
                    e.timestamp.format("%H:%M:%S"),
                    speaker(e.role),
                    e.content
                )
            })
            .collect()
    }
}

pub fn speaker(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "You",
        ChatRole::Assistant => "Assistant",
        ChatRole::System => "System",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(role: ChatRole, content: &str, hms: (u32, u32, u32)) -> HistoryEntry {
        let timestamp = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hms.0, hms.1, hms.2)
            .unwrap();
        HistoryEntry {
            role,
            content: content.to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_recent_window() {
        let mut history = ChatHistory::new();
        for i in 0..15 {
            history.record(ChatRole::User, format!("m{}", i));
        }
        let recent = history.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[9].content, "m14");
        assert_eq!(history.context_messages(2)[1].content, "m14");

        let mut short = ChatHistory::new();
        short.record(ChatRole::Assistant, "only");
        assert_eq!(short.recent(10).len(), 1);
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            ChatHistory::file_for(Path::new("chat_history"), date),
            PathBuf::from("chat_history/chat_20240307.json")
        );
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = ChatHistory::file_for(&dir.path().join("chat_history"), Local::now().date_naive());
        let mut history = ChatHistory::new();
        history.push(entry(ChatRole::User, "hi", (9, 0, 0)));
        history.push(entry(ChatRole::Assistant, "hello", (9, 0, 5)));
        history.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["role"], "user");
        assert_eq!(raw[1]["timestamp"], "2024-05-01T09:00:05");

        let loaded = ChatHistory::load_from(&path).unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn test_load_accepts_fractional_timestamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat_20240501.json");
        fs::write(
            &path,
            r#"[{"role":"assistant","content":"ok","timestamp":"2024-05-01T12:30:45.123456"}]"#,
        )
        .unwrap();
        let loaded = ChatHistory::load_from(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.recent(1)[0].role, ChatRole::Assistant);
    }

    #[test]
    fn test_export_json_imports_back() {
        let dir = tempdir().unwrap();
        let mut history = ChatHistory::new();
        history.push(entry(ChatRole::User, "how do I sort?", (10, 0, 0)));
        history.push(entry(ChatRole::Assistant, "```python\nsorted(xs)\n```", (10, 0, 2)));

        let path = dir.path().join("exports").join("session.JSON");
        assert_eq!(history.export_to(&path).unwrap(), ExportFormat::Json);
        let imported = ChatHistory::load_from(&path).unwrap();
        assert_eq!(imported, history);
        assert_eq!(imported.context_messages(10)[1].content, "```python\nsorted(xs)\n```");
    }

    #[test]
    fn test_export_transcript() {
        let dir = tempdir().unwrap();
        let mut history = ChatHistory::new();
        history.push(entry(ChatRole::User, "hi", (8, 0, 0)));

        let path = dir.path().join("chat.txt");
        assert_eq!(history.export_to(&path).unwrap(), ExportFormat::Transcript);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("PyEdit.rs chat - "));
        assert!(text.ends_with("=\n\n[08:00:00] You: hi\n\n"));
        assert!(ChatHistory::load_from(&path).is_err());
    }

    #[test]
    fn test_load_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[{").unwrap();
        assert!(ChatHistory::load_from(&path).is_err());
    }

    #[test]
    fn test_transcript_and_clear() {
        let mut history = ChatHistory::new();
        history.push(entry(ChatRole::User, "hi", (9, 1, 2)));
        history.push(entry(ChatRole::Assistant, "hello", (9, 1, 3)));
        assert_eq!(
            history.to_transcript(),
            "[09:01:02] You: hi\n\n[09:01:03] Assistant: hello\n\n"
        );
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.to_transcript(), "");
    }
}
