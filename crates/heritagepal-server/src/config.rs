//! Configuration for the HeritagePAL server.
//!
//! Values come from an optional `heritagepal.json` file and are then
//! overridden by environment variables (`SUPABASE_URL`, `PORT`, ...).

use std::path::Path;

use heritagepal_genai::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};

use crate::error::{HeritageError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "heritagepal.json";

/// Gemini key value shipped in the sample `.env`; treated as absent.
pub const PLACEHOLDER_GEMINI_KEY: &str = "your_gemini_api_key_here";

/// Default HTTP port.
const fn default_port() -> u16 {
    3001
}

/// Default Gemini model.
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Default allowed CORS origins (the frontend dev server).
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3050".to_string(),
        "http://127.0.0.1:3050".to_string(),
    ]
}

/// Main configuration for the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Origins allowed to call the API from a browser.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Store connection settings.
    #[serde(default)]
    pub supabase: SupabaseSettings,

    /// Generation service settings.
    #[serde(default)]
    pub gemini: GeminiSettings,
}

/// Supabase connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseSettings {
    /// Project URL.
    #[serde(default)]
    pub url: String,
    /// Anon key.
    #[serde(default)]
    pub key: String,
    /// Service-role key.
    #[serde(default)]
    pub service_key: Option<String>,
}

/// Gemini settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiSettings {
    /// API key. Absent or placeholder selects the offline generator.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: Environment::default(),
            cors_origins: default_cors_origins(),
            supabase: SupabaseSettings::default(),
            gemini: GeminiSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `heritagepal.json` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            HeritageError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_file(&current_dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::ConfigParseError` if the file exists but
    /// contains invalid JSON, and `HeritageError::ConfigValidationError` if
    /// the values are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(HeritageError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| HeritageError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides values from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::ConfigValidationError` if a variable has an
    /// unparseable value.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Overrides values using `lookup` to read variables.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::ConfigValidationError` if `PORT` is not a
    /// number or `NODE_ENV` is not a known environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("SUPABASE_URL") {
            self.supabase.url = url;
        }
        if let Some(key) = var("SUPABASE_KEY") {
            self.supabase.key = key;
        }
        if let Some(key) = var("SUPABASE_SERVICE_KEY") {
            self.supabase.service_key = Some(key);
        }
        if let Some(key) = var("GOOGLE_GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = var("GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Some(port) = var("PORT") {
            self.port = port.trim().parse().map_err(|_| {
                HeritageError::config_validation(
                    format!("PORT must be a number between 1 and 65535, got '{port}'"),
                    "Set PORT to a valid TCP port, e.g. 3001",
                )
            })?;
        }
        if let Some(env) = var("NODE_ENV") {
            self.environment = Environment::from_str_case_insensitive(&env).ok_or_else(|| {
                HeritageError::config_validation(
                    format!("unknown NODE_ENV '{env}'"),
                    "Use one of 'development', 'production', 'test'",
                )
            })?;
        }
        if let Some(origins) = var("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `port` is greater than 0
    /// - `gemini.model` is not empty
    /// - `supabase.url`, when set, is an HTTP(S) URL
    /// - every CORS origin is an HTTP(S) URL
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(HeritageError::config_validation(
                "port must be greater than 0",
                "Set PORT or 'port' in heritagepal.json to a valid TCP port",
            ));
        }

        if self.gemini.model.trim().is_empty() {
            return Err(HeritageError::config_validation(
                "gemini.model must not be empty",
                format!("Set GEMINI_MODEL, e.g. '{DEFAULT_MODEL}'"),
            ));
        }

        if !self.supabase.url.is_empty() && !self.supabase.url.starts_with("http") {
            return Err(HeritageError::config_validation(
                format!("SUPABASE_URL must be an http(s) URL, got '{}'", self.supabase.url),
                "Copy the project URL from the Supabase dashboard",
            ));
        }

        if let Some(origin) = self.cors_origins.iter().find(|o| !o.starts_with("http")) {
            return Err(HeritageError::config_validation(
                format!("CORS origin '{origin}' must be an http(s) URL"),
                "List full origins in CORS_ORIGINS, e.g. http://localhost:3050",
            ));
        }

        Ok(())
    }

    /// Validates the settings needed to talk to Supabase.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::ConfigValidationError` if the URL or anon key
    /// is missing.
    pub fn validate_supabase(&self) -> Result<()> {
        if self.supabase.url.is_empty() || self.supabase.key.is_empty() {
            return Err(HeritageError::config_validation(
                "SUPABASE_URL and SUPABASE_KEY are required",
                "Set both in your environment or .env file, or run with --in-memory",
            ));
        }
        Ok(())
    }

    /// Returns the Gemini API key if a real one is configured.
    #[must_use]
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.gemini
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_GEMINI_KEY)
    }
}

/// Deployment environment, from `NODE_ENV`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Local development (default).
    #[default]
    Development,
    /// Production deployment.
    Production,
    /// Automated tests.
    Test,
}

impl Environment {
    /// Parses a string into an `Environment`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// Returns `true` for production deployments.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid environment '{s}': expected one of 'development', 'production', 'test'"
            ))
        })
    }
}

impl Serialize for Environment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.gemini.model, "gemini-2.0-flash-lite");
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3050", "http://127.0.0.1:3050"]
        );
        assert!(config.gemini_api_key().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.gemini.model, "gemini-2.0-flash-lite");
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn test_environment_case_insensitive() {
        let config: Config = serde_json::from_str(r#"{"environment": "PRODUCTION"}"#).unwrap();
        assert!(config.environment.is_production());

        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{"environment": "staging"}"#);
        assert!(result.unwrap_err().to_string().contains("invalid environment"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SUPABASE_URL", "https://abc.supabase.co"),
                ("SUPABASE_KEY", "anon"),
                ("SUPABASE_SERVICE_KEY", "service"),
                ("GOOGLE_GEMINI_API_KEY", "real-key"),
                ("PORT", "4000"),
                ("NODE_ENV", "production"),
                ("CORS_ORIGINS", "https://heritagepal.gy, http://localhost:3000"),
            ]))
            .unwrap();

        assert_eq!(config.supabase.url, "https://abc.supabase.co");
        assert_eq!(config.supabase.service_key.as_deref(), Some("service"));
        assert_eq!(config.gemini_api_key(), Some("real-key"));
        assert_eq!(config.port, 4000);
        assert!(config.environment.is_production());
        assert_eq!(
            config.cors_origins,
            vec!["https://heritagepal.gy", "http://localhost:3000"]
        );
        config.validate().unwrap();
        config.validate_supabase().unwrap();
    }

    #[test]
    fn test_env_empty_values_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("PORT", ""), ("GEMINI_MODEL", "  ")])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.gemini.model, "gemini-2.0-flash-lite");
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "abc")])).unwrap_err();
        assert!(matches!(err, HeritageError::ConfigValidationError { .. }));
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_placeholder_gemini_key_is_ignored() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("GOOGLE_GEMINI_API_KEY", PLACEHOLDER_GEMINI_KEY)]))
            .unwrap();
        assert!(config.gemini_api_key().is_none());
    }

    #[test]
    fn test_validation_zero_port() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port must be greater than 0"));
    }

    #[test]
    fn test_validation_bad_supabase_url() {
        let mut config = Config::default();
        config.supabase.url = "abc.supabase.co".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_model() {
        let mut config = Config::default();
        config.gemini.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_supabase_requires_url_and_key() {
        let mut config = Config::default();
        config.supabase.url = "https://abc.supabase.co".to_string();
        assert!(config.validate_supabase().is_err());
        config.supabase.key = "anon".to_string();
        config.validate_supabase().unwrap();
    }

    #[test]
    fn test_load_from_file_valid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_heritagepal_valid.json");
        let json = r#"{
            "port": 5050,
            "gemini": {"model": "gemini-1.5-flash"}
        }"#;
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.port, 5050);
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert_eq!(config.environment, Environment::Development);

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_heritagepal_invalid.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(b"{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, HeritageError::ConfigParseError { path, .. } if *path == config_path),
            "Expected ConfigParseError, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config =
            Config::load_from_file(&PathBuf::from("/nonexistent/heritagepal.json")).unwrap();
        assert_eq!(config, Config::default());
    }
}
