use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Env var naming an explicit config file
pub const CONFIG_ENV: &str = "SCRIPTDECK_CONFIG";

const CONFIG_NAMES: [&str; 4] = [
    "scriptdeck.yaml",
    "scriptdeck.yml",
    ".scriptdeck.yaml",
    ".scriptdeck.yml",
];

/// Push channel settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PushConfig {
    /// Try the push channel at all
    pub enabled: bool,
    /// Path (and query) of the WebSocket endpoint, relative to `base_url`
    pub path: String,
    /// Reconnect budget after the first failed attempt
    pub max_reconnect_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/socket.io/?EIO=4&transport=websocket".into(),
            max_reconnect_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl PushConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Root client configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://127.0.0.1:5000`
    pub base_url: String,
    /// Sent as a bearer token when present
    pub auth_token: Option<String>,
    pub poll_interval_ms: u64,
    pub log_refresh_ms: u64,
    pub log_lines: usize,
    pub request_timeout_ms: u64,
    pub manager_log_path: String,
    pub push: PushConfig,
    /// Where the dashboard writes its own log file
    pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".into(),
            auth_token: None,
            poll_interval_ms: 2_000,
            log_refresh_ms: 2_000,
            log_lines: crate::api::DEFAULT_LOG_LINES,
            request_timeout_ms: 10_000,
            manager_log_path: "/api/manager/logs".into(),
            push: PushConfig::default(),
            log_dir: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

/// Command-line values that take precedence over the file
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub no_push: bool,
    pub poll_interval_ms: Option<u64>,
}

impl ClientConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty mapping
        let config: ClientConfig = if content.trim().is_empty() {
            ClientConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Search for a config file: `SCRIPTDECK_CONFIG` first, then the
    /// directory and its parents
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        Self::discover_with(start_dir, std::env::var_os(CONFIG_ENV))
    }

    fn discover_with(
        start_dir: &Path,
        env_path: Option<OsString>,
    ) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Some(env_path) = env_path {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Like [`discover`](Self::discover), but a missing file yields defaults
    pub fn discover_or_default(start_dir: &Path) -> Result<(Option<PathBuf>, Self), ConfigError> {
        match Self::discover(start_dir) {
            Ok((path, config)) => Ok((Some(path), config)),
            Err(ConfigError::NotFound { .. }) => Ok((None, Self::default())),
            Err(e) => Err(e),
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(url) = &overrides.base_url {
            self.base_url = url.clone();
        }
        if let Some(token) = &overrides.auth_token {
            self.auth_token = Some(token.clone());
        }
        if overrides.no_push {
            self.push.enabled = false;
        }
        if let Some(ms) = overrides.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("expected an http(s) URL, got '{}'", self.base_url),
            });
        }
        if !(500..=10_000).contains(&self.poll_interval_ms) {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: format!("{} is outside 500..=10000", self.poll_interval_ms),
            });
        }
        if self.log_refresh_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "log_refresh_ms",
                reason: "must be positive".into(),
            });
        }
        if self.log_lines == 0 {
            return Err(ConfigError::Invalid {
                field: "log_lines",
                reason: "must be positive".into(),
            });
        }
        if !self.manager_log_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "manager_log_path",
                reason: "must start with '/'".into(),
            });
        }
        if self.push.initial_backoff_ms == 0 || self.push.initial_backoff_ms > self.push.max_backoff_ms
        {
            return Err(ConfigError::Invalid {
                field: "push.initial_backoff_ms",
                reason: "must be positive and not above push.max_backoff_ms".into(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn log_refresh(&self) -> Duration {
        Duration::from_millis(self.log_refresh_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `base_url` without a trailing slash
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scriptdeck-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let config = ClientConfig::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.manager_log_path, "/api/manager/logs");
        assert!(config.push.enabled);
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
base_url: "http://10.0.0.5:8080/"
auth_token: secret
poll_interval_ms: 3000
push:
  enabled: false
"#;
        let config = ClientConfig::from_str(yaml).unwrap();
        assert_eq!(config.origin(), "http://10.0.0.5:8080");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval_ms, 3000);
        assert!(!config.push.enabled);
        assert_eq!(config.push.max_reconnect_attempts, 5);
        assert_eq!(config.log_lines, 100);
    }

    #[test]
    fn test_poll_interval_out_of_range() {
        let result = ClientConfig::from_str("poll_interval_ms: 100");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = ClientConfig::from_str("base_url: ftp://host");
        assert!(matches!(result, Err(ConfigError::Invalid { field: "base_url", .. })));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = ClientConfig::default();
        config
            .apply_overrides(&ConfigOverrides {
                base_url: Some("https://deck.example".into()),
                auth_token: Some("t".into()),
                no_push: true,
                poll_interval_ms: Some(5000),
            })
            .unwrap();
        assert_eq!(config.base_url, "https://deck.example");
        assert_eq!(config.auth_token.as_deref(), Some("t"));
        assert!(!config.push.enabled);
        assert_eq!(config.poll_interval_ms, 5000);

        let bad = config.apply_overrides(&ConfigOverrides {
            poll_interval_ms: Some(20_000),
            ..Default::default()
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_discover_walks_parents() {
        let root = scratch_dir("discover");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(".scriptdeck.yml"), "log_lines: 250\n").unwrap();

        let (path, config) = ClientConfig::discover_with(&nested, None).unwrap();
        assert_eq!(path, root.join(".scriptdeck.yml"));
        assert_eq!(config.log_lines, 250);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_discover_prefers_env_path() {
        let root = scratch_dir("env");
        let explicit = root.join("custom.yaml");
        std::fs::write(&explicit, "log_refresh_ms: 1500\n").unwrap();
        std::fs::write(root.join("scriptdeck.yaml"), "log_refresh_ms: 9000\n").unwrap();

        let (path, config) =
            ClientConfig::discover_with(&root, Some(explicit.clone().into_os_string())).unwrap();
        assert_eq!(path, explicit);
        assert_eq!(config.log_refresh_ms, 1500);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_env_path_is_recorded_in_search() {
        let root = scratch_dir("missing");
        let ghost = root.join("ghost.yaml");
        let result = ClientConfig::discover_with(&root, Some(ghost.clone().into_os_string()));
        match result {
            Err(ConfigError::NotFound { searched }) => assert_eq!(searched[0], ghost),
            // a scriptdeck.yaml in some ancestor of the temp dir would be picked up
            Ok(_) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        let _ = std::fs::remove_dir_all(&root);
    }
}
