/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: config.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 10:12:47
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-04 18:40:05
 */

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub broadcast: bool,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_tls: bool,
    /// Envelope sender, falls back to the login name
    pub sender: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Number of messages to replay, negative means every eligible file.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Jobs dispatched since the last recycle before every slot is reconnected.
    /// Defaults to ten full batches.
    pub recycle_threshold: Option<usize>,
    pub send_timeout_seconds: Option<u64>,
}

// Default SMTP port
pub const DEFAULT_SMTP_PORT: u16 = 25;

// Archived messages are stored as `*.qs`, optionally gzipped
pub const DEFAULT_EXTENSION: &str = ".qs";

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

// Connection timeout in seconds, used when none is configured
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 30;

#[cfg(windows)]
pub const DEFAULT_CORPUS_ROOT: &str = "D:\\data\\mail-migration";
#[cfg(not(windows))]
pub const DEFAULT_CORPUS_ROOT: &str = "/opt/mail-migration-data";

// Searched in order when no explicit file is given, the first hit wins
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config",
    "profile/application",
    "../profile/application",
    "/opt/mail-replayer/profile/application",
];

// Extensions the `config` crate can parse, in the order they are tried
const CONFIG_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml", "ini", "ron", "json5"];

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from(DEFAULT_CORPUS_ROOT)
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_limit() -> i64 {
    -1
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            extension: default_extension(),
            max_file_size: default_max_file_size(),
            limit: default_limit(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            recycle_threshold: None,
            send_timeout_seconds: None,
        }
    }
}

impl CorpusConfig {
    /// `None` when every eligible message should be replayed.
    pub fn limit(&self) -> Option<usize> {
        usize::try_from(self.limit).ok()
    }
}

impl DispatchConfig {
    pub fn recycle_threshold(&self) -> usize {
        self.recycle_threshold
            .unwrap_or(self.max_concurrency.saturating_mul(10))
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_seconds.map(Duration::from_secs)
    }
}

impl ServerConfig {
    pub fn sender(&self) -> &str {
        self.sender.as_deref().unwrap_or(&self.username)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_seconds
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
        )
    }
}

// Implement loading configuration
impl AppConfig {
    // Load config from the first search path that exists, then environment variables
    pub fn new() -> Result<Self, ConfigError> {
        Self::new_from_search_path(Path::new("."))
    }

    // Only the first existing candidate is read, later ones are never merged in
    fn new_from_search_path(base: &Path) -> Result<Self, ConfigError> {
        let mut builder = Self::configure_defaults()?;
        if let Some(path) = Self::locate(base) {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder
            // e.g. APP_SERVER__HOST=... APP_CORPUS__LIMIT=...
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize::<Self>()
            .and_then(Self::validate)
    }

    fn locate(base: &Path) -> Option<PathBuf> {
        CONFIG_SEARCH_PATHS.iter().find_map(|name| {
            let stem = base.join(name);
            CONFIG_EXTENSIONS
                .iter()
                .map(|ext| PathBuf::from(format!("{}.{}", stem.display(), ext)))
                .find(|candidate| candidate.is_file())
        })
    }

    // Load config from a specific file path
    pub fn new_from_file(path: &str) -> Result<Self, ConfigError> {
        Self::configure_defaults()?
            .add_source(File::with_name(path).required(true))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize::<Self>()
            .and_then(Self::validate)
    }

    fn configure_defaults()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder())
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.dispatch.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "dispatch.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(source: &str, format: FileFormat) -> Result<AppConfig, ConfigError> {
        AppConfig::configure_defaults()
            .unwrap()
            .add_source(File::from_str(source, format))
            .build()?
            .try_deserialize::<AppConfig>()
            .and_then(AppConfig::validate)
    }

    #[test]
    fn test_valid_config_deserialization() {
        let toml_str = r#"
            recipients = ["a@example.com", "b@example.com"]
            broadcast = true

            [server]
            host = "smtp.example.com"
            port = 587
            username = "sender@example.com"
            password = "secret"
            use_tls = true

            [corpus]
            root = "/data/archive"
            limit = 50

            [dispatch]
            max_concurrency = 4
            recycle_threshold = 12
            send_timeout_seconds = 20
        "#;

        let config = parse(toml_str, FileFormat::Toml).unwrap();

        assert_eq!(config.server.host, "smtp.example.com");
        assert_eq!(config.server.port, 587);
        assert_eq!(config.server.sender(), "sender@example.com");
        assert!(config.server.use_tls);
        assert_eq!(config.recipients.len(), 2);
        assert!(config.broadcast);
        assert_eq!(config.corpus.root, PathBuf::from("/data/archive"));
        assert_eq!(config.corpus.limit(), Some(50));
        assert_eq!(config.dispatch.max_concurrency, 4);
        assert_eq!(config.dispatch.recycle_threshold(), 12);
        assert_eq!(config.dispatch.send_timeout(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_default_values() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
        "#;

        let config = parse(toml_str, FileFormat::Toml).unwrap();

        assert_eq!(config.server.port, DEFAULT_SMTP_PORT);
        assert!(!config.server.use_tls);
        assert!(config.recipients.is_empty());
        assert!(!config.broadcast);
        assert_eq!(config.corpus.extension, ".qs");
        assert_eq!(config.corpus.max_file_size, 1024 * 1024);
        assert_eq!(config.corpus.limit(), None);
        assert_eq!(config.dispatch.max_concurrency, 10);
        assert_eq!(config.dispatch.recycle_threshold(), 100);
        assert_eq!(config.dispatch.send_timeout(), None);
        assert_eq!(config.server.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.server.sender(), "");
    }

    #[test]
    fn test_yaml_profile() {
        let yaml_str = r#"
recipients:
  - user@abctest.co
server:
  host: mail.abctest.co
  port: 2525
corpus:
  root: /opt/mail-migration-data/terrace
  extension: ".msg"
  limit: -1
"#;

        let config = parse(yaml_str, FileFormat::Yaml).unwrap();

        assert_eq!(config.server.port, 2525);
        assert_eq!(config.recipients, vec!["user@abctest.co".to_string()]);
        assert_eq!(config.corpus.extension, ".msg");
        assert_eq!(config.corpus.limit(), None);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let toml_str = r#"
            [server]
            host = "h"

            [dispatch]
            max_concurrency = 0
        "#;

        assert!(parse(toml_str, FileFormat::Toml).is_err());
    }

    #[test]
    fn test_invalid_config_type() {
        let toml_str = r#"
            broadcast = "sometimes"

            [server]
            host = "h"
        "#;

        assert!(parse(toml_str, FileFormat::Toml).is_err());
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_first_config_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("config.yml"),
            "server:\n  host: first.example.com\n",
        );
        write(
            &dir.path().join("profile/application.yml"),
            "recipients:\n  - second@example.com\nserver:\n  host: second.example.com\n  port: 2525\n",
        );

        let config = AppConfig::new_from_search_path(dir.path()).unwrap();

        assert_eq!(config.server.host, "first.example.com");
        assert_eq!(config.server.port, DEFAULT_SMTP_PORT);
        assert!(config.recipients.is_empty());
    }

    #[test]
    fn test_later_config_file_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("config.yml"),
            "recipients:\n  - only@example.com\n",
        );
        write(
            &dir.path().join("profile/application.yml"),
            "server:\n  host: second.example.com\n",
        );

        // The first hit has no server section and nothing fills it in
        assert!(AppConfig::new_from_search_path(dir.path()).is_err());
    }

    #[test]
    fn test_search_path_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("profile/application.toml"),
            "[server]\nhost = \"profile.example.com\"\n",
        );

        let located = AppConfig::locate(dir.path()).unwrap();
        assert!(located.ends_with("profile/application.toml"));

        let config = AppConfig::new_from_search_path(dir.path()).unwrap();
        assert_eq!(config.server.host, "profile.example.com");
    }

    #[test]
    fn test_missing_server_section() {
        let toml_str = r#"
            recipients = ["a@example.com"]
        "#;

        assert!(parse(toml_str, FileFormat::Toml).is_err());
    }
}
