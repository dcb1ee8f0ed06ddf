use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::SubseekError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

const ENV_OPENSUBTITLES_KEY: &str = "SUBSEEK_OPENSUBTITLES_API_KEY";
const ENV_OMDB_KEY: &str = "SUBSEEK_OMDB_API_KEY";

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub opensubtitles: OpenSubtitlesSettings,
    pub omdb: OmdbSettings,
    pub runtime: RuntimeSettings,
    #[serde(skip)]
    env: EnvOverrides,
}

/// Settings replaced from the environment, with the value they replaced.
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    opensubtitles_api_key: Option<EnvOverride>,
    omdb_api_key: Option<EnvOverride>,
}

#[derive(Debug, Clone)]
struct EnvOverride {
    file: String,
    env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// ISO 639-1 code used for automatic searches.
    pub default_language: String,
    pub subtitle_format: String,
    /// Where downloaded subtitles are written. Empty means the platform
    /// download directory.
    pub download_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSubtitlesSettings {
    pub api_key: String,
    pub base_url: String,
    pub use_proxy: bool,
    pub proxy_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmdbSettings {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub max_concurrent_resolutions: usize,
    /// Pause between two downloads of a bulk download.
    pub download_delay_ms: u64,
}

impl AppConfig {
    /// Load config: user file (if exists) merged over built-in defaults,
    /// then API keys from the environment.
    pub fn load() -> Result<Self, SubseekError> {
        let user_path = Self::config_path();
        let user = if user_path.exists() {
            Some(std::fs::read_to_string(&user_path)?)
        } else {
            None
        };
        let mut config = Self::from_layers(user.as_deref())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Merge a user TOML document over the built-in defaults. Keys absent
    /// from the user document keep their default value.
    pub fn from_layers(user: Option<&str>) -> Result<Self, SubseekError> {
        let mut base: toml::Table =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| SubseekError::Config(e.to_string()))?;
        if let Some(user) = user {
            let overlay: toml::Table =
                toml::from_str(user).map_err(|e| SubseekError::Config(e.to_string()))?;
            merge_tables(&mut base, overlay);
        }
        toml::Value::Table(base)
            .try_into()
            .map_err(|e: toml::de::Error| SubseekError::Config(e.to_string()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.env.opensubtitles_api_key =
            override_key(&mut self.opensubtitles.api_key, lookup(ENV_OPENSUBTITLES_KEY));
        self.env.omdb_api_key = override_key(&mut self.omdb.api_key, lookup(ENV_OMDB_KEY));
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), SubseekError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_toml()?)?;
        Ok(())
    }

    /// The document `save` writes. Keys that still hold their environment
    /// value are written with the value they replaced.
    pub fn to_toml(&self) -> Result<String, SubseekError> {
        let mut doc = self.clone();
        restore_key(&mut doc.opensubtitles.api_key, &self.env.opensubtitles_api_key);
        restore_key(&mut doc.omdb.api_key, &self.env.omdb_api_key);
        toml::to_string_pretty(&doc).map_err(|e| SubseekError::Config(e.to_string()))
    }

    /// Base URL the OpenSubtitles client should talk to.
    pub fn opensubtitles_url(&self) -> &str {
        if self.opensubtitles.use_proxy {
            &self.opensubtitles.proxy_url
        } else {
            &self.opensubtitles.base_url
        }
    }

    /// Resolved subtitle download directory.
    pub fn download_dir(&self) -> PathBuf {
        if !self.general.download_dir.is_empty() {
            return PathBuf::from(&self.general.download_dir);
        }
        directories::UserDirs::new()
            .and_then(|d| d.download_dir().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("subseek.db"))
            .unwrap_or_else(|| PathBuf::from("subseek.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, SubseekError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "subseek")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

fn override_key(slot: &mut String, value: Option<String>) -> Option<EnvOverride> {
    let env = value.filter(|k| !k.is_empty())?;
    let file = std::mem::replace(slot, env.clone());
    Some(EnvOverride { file, env })
}

fn restore_key(slot: &mut String, applied: &Option<EnvOverride>) {
    if let Some(applied) = applied {
        if *slot == applied.env {
            slot.clone_from(&applied.file);
        }
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.general.default_language, "en");
        assert_eq!(config.general.subtitle_format, "srt");
        assert_eq!(config.runtime.max_concurrent_resolutions, 4);
        assert_eq!(config.runtime.download_delay_ms, 1000);
        assert!(!config.opensubtitles.use_proxy);
    }

    #[test]
    fn test_partial_user_file_keeps_defaults() {
        let config = AppConfig::from_layers(Some(
            "[general]\ndefault_language = \"pt\"\n\n[opensubtitles]\nuse_proxy = true\n",
        ))
        .unwrap();
        assert_eq!(config.general.default_language, "pt");
        assert_eq!(config.general.subtitle_format, "srt");
        assert_eq!(config.opensubtitles_url(), "http://localhost:3001/api/v1");
    }

    #[test]
    fn test_invalid_user_file_is_config_error() {
        let err = AppConfig::from_layers(Some("general = [")).unwrap_err();
        assert!(matches!(err, SubseekError::Config(_)));
    }

    #[test]
    fn test_env_overrides_api_keys() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            ENV_OPENSUBTITLES_KEY => Some("os-key".into()),
            ENV_OMDB_KEY => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.opensubtitles.api_key, "os-key");
        assert_eq!(config.omdb.api_key, "");
    }

    #[test]
    fn test_env_keys_are_not_saved() {
        let mut config =
            AppConfig::from_layers(Some("[omdb]\napi_key = \"file-omdb\"\n")).unwrap();
        config.apply_env(|key| match key {
            ENV_OPENSUBTITLES_KEY => Some("env-os".into()),
            ENV_OMDB_KEY => Some("env-omdb".into()),
            _ => None,
        });
        assert_eq!(config.omdb.api_key, "env-omdb");

        let saved = config.to_toml().unwrap();
        assert!(!saved.contains("env-os"));
        assert!(!saved.contains("env-omdb"));
        let reloaded = AppConfig::from_layers(Some(&saved)).unwrap();
        assert_eq!(reloaded.omdb.api_key, "file-omdb");
        assert_eq!(reloaded.opensubtitles.api_key, "");
    }

    #[test]
    fn test_key_changed_after_env_is_saved() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == ENV_OMDB_KEY).then(|| "env-omdb".to_string()));
        config.omdb.api_key = "typed-in".into();

        let reloaded = AppConfig::from_layers(Some(&config.to_toml().unwrap())).unwrap();
        assert_eq!(reloaded.omdb.api_key, "typed-in");
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.runtime.max_concurrent_resolutions,
            config.runtime.max_concurrent_resolutions
        );
    }
}
