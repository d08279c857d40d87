use crate::constants::{
    DEFAULT_EDITOR_FONT, DEFAULT_FONT_SIZE, DEFAULT_LM_STUDIO_IP, DEFAULT_LM_STUDIO_PORT,
    DEFAULT_MODEL, DEFAULT_PROXY_AGENT_IP, DEFAULT_PROXY_AGENT_PORT, PROXY_CONFIG_FALLBACK_DIR,
    PROXY_CONFIG_FILE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid settings TOML: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Could not serialize settings: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub ip: String,
    pub port: u16,
}

impl EndpointConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip.trim(), self.port)
    }

    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if self.ip.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{} IP must not be empty", label)));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} port must be between 1 and 65535",
                label
            )));
        }
        Ok(())
    }
}

/// Addresses of the model server and the proxy agent, stored as JSON:
/// `{"lm_studio": {"ip", "port"}, "proxy_agent": {"ip", "port"}}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub lm_studio: EndpointConfig,
    pub proxy_agent: EndpointConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            lm_studio: EndpointConfig::new(DEFAULT_LM_STUDIO_IP, DEFAULT_LM_STUDIO_PORT),
            proxy_agent: EndpointConfig::new(DEFAULT_PROXY_AGENT_IP, DEFAULT_PROXY_AGENT_PORT),
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lm_studio.validate("LM Studio")?;
        self.proxy_agent.validate("Proxy agent")
    }

    /// `config.json` beside the executable when that directory is writable,
    /// otherwise `~/.proxy_lm_studio/config.json`.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        if let Some(dir) = exe_dir.filter(|d| is_writable_dir(d)) {
            return dir.join(PROXY_CONFIG_FILE);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PROXY_CONFIG_FALLBACK_DIR)
            .join(PROXY_CONFIG_FILE)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when it is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn load() -> Self {
        Self::load_or_default(&Self::default_path())
    }

    /// Validates, then writes pretty JSON to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!("Saved endpoint config to {:?}", path);
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path())
    }
}

fn is_writable_dir(dir: &Path) -> bool {
    let probe = dir.join(".pyedit_write_test");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Editor preferences, stored as TOML in the user config directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EditorSettings {
    pub theme: Theme,
    pub interpreter: Option<String>,
    pub model: String,
    pub font_family: String,
    pub font_size: u32,
    pub stream_responses: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            interpreter: None,
            model: DEFAULT_MODEL.to_string(),
            font_family: DEFAULT_EDITOR_FONT.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            stream_responses: true,
        }
    }
}

impl EditorSettings {
    pub fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("pyedit-rs");
        path
    }

    pub fn settings_file() -> PathBuf {
        Self::config_dir().join("settings.toml")
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn load() -> Self {
        let path = Self::settings_file();
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!("Using default settings: {}", e);
            Self::default()
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::settings_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.lm_studio.base_url(), "http://127.0.0.1:7860");
        assert_eq!(config.proxy_agent.base_url(), "http://localhost:3000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ProxyConfig {
            lm_studio: EndpointConfig::new("10.0.0.5", 1234),
            proxy_agent: EndpointConfig::new("agent.local", 8080),
        };
        config.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["lm_studio"]["ip"], "10.0.0.5");
        assert_eq!(raw["proxy_agent"]["port"], 8080);

        assert_eq!(ProxyConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let mut config = ProxyConfig::default();
        config.lm_studio.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ProxyConfig::default();
        config.proxy_agent.ip = "   ".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Proxy agent IP must not be empty");

        let dir = tempdir().unwrap();
        assert!(config.save_to(&dir.path().join("config.json")).is_err());
        assert!(!dir.path().join("config.json").exists());
    }

    #[test]
    fn test_corrupt_or_missing_falls_back() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(ProxyConfig::load_or_default(&missing), ProxyConfig::default());

        let corrupt = dir.path().join("config.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert!(ProxyConfig::load_from(&corrupt).is_err());
        assert_eq!(ProxyConfig::load_or_default(&corrupt), ProxyConfig::default());

        fs::write(
            &corrupt,
            r#"{"lm_studio":{"ip":"a","port":70000},"proxy_agent":{"ip":"b","port":1}}"#,
        )
        .unwrap();
        assert_eq!(ProxyConfig::load_or_default(&corrupt), ProxyConfig::default());
    }

    #[test]
    fn test_base_url_trims_ip() {
        assert_eq!(
            EndpointConfig::new(" 192.168.1.2 ", 7860).base_url(),
            "http://192.168.1.2:7860"
        );
    }

    #[test]
    fn test_editor_settings_roundtrip_and_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let settings = EditorSettings {
            theme: Theme::Light,
            interpreter: Some("/usr/bin/python3".to_string()),
            font_size: 14,
            ..EditorSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path).unwrap(), settings);

        fs::write(&path, "theme = \"light\"\n").unwrap();
        let partial = EditorSettings::load_from(&path).unwrap();
        assert_eq!(partial.theme, Theme::Light);
        assert_eq!(partial.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(partial.model, DEFAULT_MODEL);
    }
}
