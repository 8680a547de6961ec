use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// On-disk configuration, also used to carry command-line/env overrides.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Absolute URL of the QA endpoint, e.g. `http://localhost:8000/chat`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Request timeout. `None` waits for the transport to resolve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for the QA client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint: Url,
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if there is one. No path (no config directory on this
    /// platform) reads as an empty config.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::new()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(io_err)
    }

    /// Layer `overrides` on top of `self`; any value set in `overrides` wins.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            endpoint: overrides.endpoint.or(self.endpoint),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
        }
    }

    pub fn resolve(&self) -> Result<ClientSettings, ConfigError> {
        let raw = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;

        Ok(ClientSettings {
            endpoint: parse_endpoint(raw)?,
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }

    /// `<config_dir>/pdfchat/config.json`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pdfchat").join("config.json"))
    }
}

/// Parse an absolute `http`/`https` URL.
pub fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_no_config_location_is_empty_config() {
        assert_eq!(Config::load_or_default(None).unwrap(), Config::new());

        // Command-line values alone are enough to resolve
        let cli = Config {
            endpoint: Some("http://localhost:8000/chat".to_string()),
            timeout_secs: None,
        };
        let settings = Config::load_or_default(None).unwrap().merge(cli).resolve().unwrap();
        assert_eq!(settings.endpoint.as_str(), "http://localhost:8000/chat");
    }

    #[test]
    fn test_load_or_default_reads_given_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"endpoint":"http://file/chat"}"#).unwrap();

        let config = Config::load_or_default(Some(path.as_path())).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://file/chat"));
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            endpoint: Some("http://localhost:8000/chat".to_string()),
            timeout_secs: Some(30),
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides_win() {
        let file = Config {
            endpoint: Some("http://file/chat".to_string()),
            timeout_secs: Some(10),
        };
        let cli = Config {
            endpoint: Some("http://cli/chat".to_string()),
            timeout_secs: None,
        };

        let merged = file.merge(cli);
        assert_eq!(merged.endpoint.as_deref(), Some("http://cli/chat"));
        assert_eq!(merged.timeout_secs, Some(10));
    }

    #[test]
    fn test_resolve_requires_endpoint() {
        assert!(matches!(
            Config::new().resolve(),
            Err(ConfigError::MissingEndpoint)
        ));

        let blank = Config {
            endpoint: Some("   ".to_string()),
            timeout_secs: None,
        };
        assert!(matches!(blank.resolve(), Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_resolve_builds_settings() {
        let config = Config {
            endpoint: Some("https://qa.example.com/chat".to_string()),
            timeout_secs: Some(5),
        };
        let settings = config.resolve().unwrap();
        assert_eq!(settings.endpoint.as_str(), "https://qa.example.com/chat");
        assert_eq!(settings.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_endpoint_rejects_relative_and_other_schemes() {
        assert!(parse_endpoint("/chat").is_err());
        assert!(parse_endpoint("ftp://example.com/chat").is_err());
        assert!(parse_endpoint("http://127.0.0.1:8000/chat").is_ok());
    }
}
