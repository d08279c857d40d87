use pyedit::api::{LocalLlmClient, StopFlag};
use pyedit::config::{EditorSettings, ProxyConfig};
use pyedit::history::ChatHistory;
use pyedit::process::Interpreter;
use pyedit::runner::RunHandle;
use std::path::PathBuf;
use tokio::task::AbortHandle;

/// Central application state shared by the signal handlers.
pub struct AppState {
    /// Currently open file path, if any.
    pub current_file: Option<PathBuf>,
    pub settings: EditorSettings,
    pub proxy_config: ProxyConfig,
    pub interpreter: Interpreter,
    /// The process started by Run, while it is alive.
    pub run: Option<RunHandle>,
    /// `None` when the client could not be built from the config.
    pub chat_client: Option<LocalLlmClient>,
    pub chat_stop: StopFlag,
    /// Non-streaming requests have no chunks to poll the stop flag between,
    /// so Stop aborts their task instead.
    pub chat_task: Option<AbortHandle>,
    pub chat_busy: bool,
    pub history: ChatHistory,
    pub history_dir: PathBuf,
    /// Bumped on every edit so stale syntax probe results are dropped.
    pub edit_generation: u64,
}

impl AppState {
    pub fn new(settings: EditorSettings, proxy_config: ProxyConfig, history_dir: PathBuf) -> Self {
        let interpreter = Interpreter::resolve(settings.interpreter.as_deref());
        let chat_client = build_client(&proxy_config, &settings.model);
        let history_file = ChatHistory::today_file(&history_dir);
        let history = if history_file.exists() {
            ChatHistory::load_from(&history_file).unwrap_or_else(|e| {
                tracing::warn!("Starting with empty chat history: {:#}", e);
                ChatHistory::new()
            })
        } else {
            ChatHistory::new()
        };

        Self {
            current_file: None,
            settings,
            proxy_config,
            interpreter,
            run: None,
            chat_client,
            chat_stop: StopFlag::new(),
            chat_task: None,
            chat_busy: false,
            history,
            history_dir,
            edit_generation: 0,
        }
    }

    /// Re-reads interpreter and client settings after the preferences change.
    pub fn apply_settings(&mut self) {
        self.interpreter = Interpreter::resolve(self.settings.interpreter.as_deref());
        self.chat_client = build_client(&self.proxy_config, &self.settings.model);
    }

    /// Signals a streaming response to stop and aborts a pending plain request.
    pub fn stop_chat(&mut self) {
        self.chat_stop.request();
        if let Some(task) = self.chat_task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(RunHandle::is_running)
    }

    pub fn save_history(&self) {
        let path = ChatHistory::today_file(&self.history_dir);
        if let Err(e) = self.history.save_to(&path) {
            tracing::error!("Failed to save chat history: {:#}", e);
        }
    }
}

fn build_client(config: &ProxyConfig, model: &str) -> Option<LocalLlmClient> {
    match LocalLlmClient::new(config, model) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::error!("Could not create chat client: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state_in(dir: &std::path::Path) -> AppState {
        AppState::new(EditorSettings::default(), ProxyConfig::default(), dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_stop_chat_aborts_plain_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        state.chat_task = Some(task.abort_handle());

        state.stop_chat();
        assert!(state.chat_stop.is_requested());
        assert!(state.chat_task.is_none());
        let joined = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_chat_without_task_only_sets_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        state.stop_chat();
        assert!(state.chat_stop.is_requested());
    }
}
