use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Base URL of the generation server, e.g. "http://localhost:5000".
    endpoint: String,
    /// Directory for state files (databases, logs). Defaults to current directory.
    data_dir: Option<String>,
}

pub struct Config {
    /// Base URL of the generation server, without a trailing slash.
    pub endpoint: String,
    /// Directory for state files (databases, logs).
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.endpoint.is_empty() {
            return Err(ConfigError::Validation("endpoint is required".into()));
        }
        if !file.endpoint.starts_with("http://") && !file.endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "endpoint '{}' must start with http:// or https://",
                file.endpoint
            )));
        }

        let endpoint = file.endpoint.trim_end_matches('/').to_string();
        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self { endpoint, data_dir })
    }

    /// Path of the moderation database (blacklist + warns).
    pub fn moderation_db_path(&self) -> PathBuf {
        self.data_dir.join("database.db")
    }

    /// Path of the message-log database.
    pub fn message_db_path(&self) -> PathBuf {
        self.data_dir.join("messages.db")
    }

    /// Directory for log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(r#"{
            "endpoint": "http://localhost:5000",
            "data_dir": "/tmp/tensor"
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.endpoint, "http://localhost:5000");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tensor"));
        assert_eq!(config.moderation_db_path(), PathBuf::from("/tmp/tensor/database.db"));
        assert_eq!(config.message_db_path(), PathBuf::from("/tmp/tensor/messages.db"));
    }

    #[test]
    fn test_data_dir_defaults_to_cwd() {
        let file = write_config(r#"{"endpoint": "http://localhost:5000"}"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let file = write_config(r#"{"endpoint": "http://localhost:5000/"}"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.endpoint, "http://localhost:5000");
    }

    #[test]
    fn test_empty_endpoint() {
        let file = write_config(r#"{"endpoint": ""}"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_endpoint_without_scheme() {
        let file = write_config(r#"{"endpoint": "localhost:5000"}"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_endpoint_field() {
        let file = write_config(r#"{"data_dir": "/tmp"}"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
