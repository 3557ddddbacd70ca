use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::services::question_bank::DEFAULT_BANK_KEY;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// Absence is reported by the model client at call time.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankBackend {
    File,
    Redis,
    Memory,
}

impl FromStr for BankBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BankBackend::File),
            "redis" => Ok(BankBackend::Redis),
            "memory" => Ok(BankBackend::Memory),
            other => Err(format!(
                "Unknown bank backend '{}': expected file, redis or memory",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub bank_backend: BankBackend,
    pub bank_dir: String,
    pub bank_key: String,
    pub redis_uri: String,
    pub bind_addr: String,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            bank_backend: BankBackend::File,
            bank_dir: "data".to_string(),
            bank_key: DEFAULT_BANK_KEY.to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();
        let lookup = |key: &str, vars: &[&str]| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| vars.iter().find_map(|name| env::var(name).ok()))
                .filter(|value| !value.trim().is_empty())
        };

        let api_key = lookup("gemini.api_key", &["GEMINI_API_KEY", "API_KEY"]);
        if api_key.is_none() {
            eprintln!("WARNING: GEMINI_API_KEY is not set; model calls will fail");
        }

        let timeout_secs = match lookup("gemini.timeout_secs", &["GEMINI_TIMEOUT_SECS"]) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                config::ConfigError::Message(format!("Invalid gemini timeout: {}", raw))
            })?,
            None => defaults.gemini.timeout_secs,
        };

        let bank_backend = match lookup("bank.backend", &["BANK_BACKEND"]) {
            Some(raw) => raw.parse().map_err(config::ConfigError::Message)?,
            None => defaults.bank_backend,
        };

        let max_body_bytes = match lookup("server.max_body_bytes", &["MAX_BODY_BYTES"]) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                config::ConfigError::Message(format!("Invalid max body size: {}", raw))
            })?,
            None => defaults.max_body_bytes,
        };

        Ok(Config {
            gemini: GeminiConfig {
                api_key,
                model: lookup("gemini.model", &["GEMINI_MODEL"]).unwrap_or(defaults.gemini.model),
                base_url: lookup("gemini.base_url", &["GEMINI_BASE_URL"])
                    .unwrap_or(defaults.gemini.base_url),
                timeout_secs,
            },
            bank_backend,
            bank_dir: lookup("bank.dir", &["BANK_DIR"]).unwrap_or(defaults.bank_dir),
            bank_key: lookup("bank.key", &["BANK_KEY"]).unwrap_or(defaults.bank_key),
            redis_uri: lookup("redis.uri", &["REDIS_URI"]).unwrap_or(defaults.redis_uri),
            bind_addr: lookup("server.bind_addr", &["BIND_ADDR"]).unwrap_or(defaults.bind_addr),
            max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 12] = [
        "APP_ENV",
        "GEMINI_API_KEY",
        "API_KEY",
        "GEMINI_MODEL",
        "GEMINI_BASE_URL",
        "GEMINI_TIMEOUT_SECS",
        "BANK_BACKEND",
        "BANK_DIR",
        "BANK_KEY",
        "REDIS_URI",
        "BIND_ADDR",
        "MAX_BODY_BYTES",
    ];

    fn reset_env() {
        env::set_var("SKIP_ROOT_ENV", "1");
        for name in VARS {
            env::remove_var(name);
        }
        let overrides: Vec<String> = env::vars()
            .map(|(name, _)| name)
            .filter(|name| name.starts_with("APP__"))
            .collect();
        for name in overrides {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        reset_env();
        let config = Config::load().unwrap();
        assert_eq!(config.gemini.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.gemini.timeout_secs, 120);
        assert_eq!(config.bank_key, DEFAULT_BANK_KEY);
        assert_eq!(config.bank_backend, BankBackend::File);
        assert_eq!(config.gemini.base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.redis_uri, Config::default().redis_uri);
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    #[serial]
    fn reset_clears_prefixed_overrides() {
        env::set_var("APP__BANK__KEY", "leaked_bank");
        env::set_var("BANK_KEY", "leaked_bank");
        reset_env();

        let config = Config::load().unwrap();
        assert_eq!(config.bank_key, DEFAULT_BANK_KEY);
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        reset_env();
        env::set_var("API_KEY", "legacy-key");
        env::set_var("GEMINI_MODEL", "gemini-2.5-flash");
        env::set_var("GEMINI_TIMEOUT_SECS", "30");
        env::set_var("BANK_BACKEND", "Memory");
        env::set_var("BANK_DIR", "/var/lib/zhixue");

        let config = Config::load().unwrap();
        assert_eq!(config.gemini.api_key.as_deref(), Some("legacy-key"));
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert_eq!(config.gemini.timeout_secs, 30);
        assert_eq!(config.bank_backend, BankBackend::Memory);
        assert_eq!(config.bank_dir, "/var/lib/zhixue");

        env::set_var("GEMINI_API_KEY", "primary-key");
        let config = Config::load().unwrap();
        assert_eq!(config.gemini.api_key.as_deref(), Some("primary-key"));
        reset_env();
    }

    #[test]
    #[serial]
    fn invalid_values_are_configuration_errors() {
        reset_env();
        env::set_var("BANK_BACKEND", "sqlite");
        assert!(Config::load().is_err());

        reset_env();
        env::set_var("GEMINI_TIMEOUT_SECS", "soon");
        assert!(Config::load().is_err());
        reset_env();
    }
}
