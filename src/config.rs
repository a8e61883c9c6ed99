//! Configuration file parser for ~/.config/redeguara/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
//! Environment variables override the file for the connection settings.
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::feed::DEFAULT_PAGE_SIZE;

pub const ENV_SUPABASE_URL: &str = "REDEGUARA_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "REDEGUARA_ANON_KEY";
pub const ENV_PASSWORD: &str = "REDEGUARA_PASSWORD";

const DEFAULT_SUPABASE_URL: &str = "https://qppuhasdsxyuipkuusnn.supabase.co";
const DEFAULT_SITE_URL: &str = "https://redeguara.com";

const KNOWN_KEYS: [&str; 8] = [
    "supabase_url",
    "supabase_anon_key",
    "site_url",
    "page_size",
    "home_cache_ttl_secs",
    "cache_capacity",
    "email",
    "keybindings",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No anon key configured (set supabase_anon_key or {ENV_ANON_KEY})")]
    MissingAnonKey,
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be given.
/// `Debug` masks the anon key.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project URL of the hosted backend.
    pub supabase_url: String,

    /// Public anon key. `REDEGUARA_ANON_KEY` takes precedence.
    pub supabase_anon_key: Option<String>,

    /// Public site used for share links.
    pub site_url: String,

    /// Posts per feed page.
    pub page_size: usize,

    /// How long home sections are served from the cache.
    pub home_cache_ttl_secs: u64,

    /// Datasets kept in the session cache.
    pub cache_capacity: usize,

    /// Account to sign in with at startup.
    pub email: Option<String>,

    /// Keybinding overrides. Keys are action names, values are key strings.
    pub keybindings: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_anon_key: None,
            site_url: DEFAULT_SITE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            home_cache_ttl_secs: DEFAULT_TTL.as_secs(),
            cache_capacity: DEFAULT_CAPACITY,
            email: None,
            keybindings: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("supabase_url", &self.supabase_url)
            .field(
                "supabase_anon_key",
                &self.supabase_anon_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("site_url", &self.site_url)
            .field("page_size", &self.page_size)
            .field("home_cache_ttl_secs", &self.home_cache_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("email", &self.email)
            .field("keybindings", &self.keybindings)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            supabase_url = %config.supabase_url,
            page_size = config.page_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `REDEGUARA_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_SUPABASE_URL) {
            self.supabase_url = url;
        }
        if let Some(key) = get(ENV_ANON_KEY) {
            self.supabase_anon_key = Some(key);
        }
        self
    }

    pub fn anon_key(&self) -> Result<SecretString, ConfigError> {
        self.supabase_anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
            .ok_or(ConfigError::MissingAnonKey)
    }

    pub fn home_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.home_cache_ttl_secs)
    }
}

/// The account password, only ever taken from the environment.
pub fn password_from_env() -> Option<SecretString> {
    std::env::var(ENV_PASSWORD)
        .ok()
        .filter(|p| !p.is_empty())
        .map(SecretString::from)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("redeguara_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.home_cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache_capacity, 64);
        assert!(config.supabase_url.starts_with("https://"));
        assert!(config.supabase_anon_key.is_none());
        assert!(config.email.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/redeguara_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.site_url, DEFAULT_SITE_URL);
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "page_size = 25\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.home_cache_ttl_secs, 300);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
supabase_url = "https://example.supabase.co"
supabase_anon_key = "anon-123"
site_url = "https://guara.example"
page_size = 5
home_cache_ttl_secs = 60
cache_capacity = 8
email = "ana@example.com"

[keybindings]
toggle_like = "space"
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.supabase_url, "https://example.supabase.co");
        assert_eq!(config.anon_key().unwrap().expose_secret(), "anon-123");
        assert_eq!(config.site_url, "https://guara.example");
        assert_eq!(config.page_size, 5);
        assert_eq!(config.home_cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.email.as_deref(), Some("ana@example.com"));
        assert_eq!(
            config.keybindings.get("toggle_like").map(String::as_str),
            Some("space")
        );
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "page_size = 3\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.page_size, 3);
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "page_size = \"ten\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = Config {
            supabase_anon_key: Some("from-file".into()),
            ..Config::default()
        };
        let config = config.with_overrides(|name| match name {
            ENV_SUPABASE_URL => Some("http://127.0.0.1:54321".into()),
            ENV_ANON_KEY => Some("from-env".into()),
            _ => None,
        });
        assert_eq!(config.supabase_url, "http://127.0.0.1:54321");
        assert_eq!(config.anon_key().unwrap().expose_secret(), "from-env");
    }

    #[test]
    fn test_blank_env_value_ignored() {
        let config = Config::default().with_overrides(|_| Some("  ".into()));
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert!(matches!(config.anon_key(), Err(ConfigError::MissingAnonKey)));
    }

    #[test]
    fn test_debug_masks_anon_key() {
        let config = Config {
            supabase_anon_key: Some("super-secret-key-12345".into()),
            ..Config::default()
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
