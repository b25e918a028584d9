//! Runtime configuration, read from the environment (and `.env` in development).

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub cache_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_path: default_cache_path(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env outside tests to keep them hermetic
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("LINGUAECHO_API_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "LINGUAECHO_API_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let request_timeout = match lookup("LINGUAECHO_REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "LINGUAECHO_REQUEST_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", raw),
                    ))
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let cache_path = lookup("LINGUAECHO_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_path);

        Ok(Self {
            api_base_url,
            request_timeout,
            cache_path,
        })
    }
}

fn default_cache_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("linguaecho").join("cache.sqlite"))
        .unwrap_or_else(|| PathBuf::from("linguaecho.sqlite"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.cache_path.ends_with("cache.sqlite") || config.cache_path.ends_with("linguaecho.sqlite"));
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("LINGUAECHO_API_BASE_URL", "https://api.example.com/"),
            ("LINGUAECHO_REQUEST_TIMEOUT_SECS", "5"),
            ("LINGUAECHO_CACHE_PATH", "/tmp/le.sqlite"),
        ])
        .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.cache_path, PathBuf::from("/tmp/le.sqlite"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[("LINGUAECHO_REQUEST_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("LINGUAECHO_REQUEST_TIMEOUT_SECS", "soon")]).is_err());
        let err = config_from(&[("LINGUAECHO_API_BASE_URL", "localhost:8000")]).unwrap_err();
        assert!(err.to_string().contains("LINGUAECHO_API_BASE_URL"));
    }
}
