use crate::client::ClientOptions;
use lbc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://lbc.fly.dev";
pub const DEFAULT_CHALLENGE_ID: &str = "default";

pub const ENV_API_KEY: &str = "LBC_API_KEY";
pub const ENV_BASE_URL: &str = "LBC_BASE_URL";
pub const ENV_CHALLENGE_ID: &str = "LBC_CHALLENGE_ID";

/// Contents of `~/.lbc/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
}

pub fn config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".lbc"))
        .ok_or_else(|| Error::Config("could not determine the home directory".to_string()))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

impl Config {
    /// Loads the default config file and applies `LBC_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&default_config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file yields an empty config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("could not read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let pick = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = pick(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = pick(ENV_BASE_URL) {
            self.base_url = Some(v);
        }
        if let Some(v) = pick(ENV_CHALLENGE_ID) {
            self.challenge_id = Some(v);
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = default_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn remove() -> Result<bool> {
        Self::remove_at(&default_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!("could not create {}: {}", parent.display(), e))
            })?;
        }
        let body = toml::to_string(self)
            .map_err(|e| Error::Config(format!("could not serialize config: {}", e)))?;
        fs::write(path, body)
            .map_err(|e| Error::Config(format!("could not write {}: {}", path.display(), e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not restrict config file permissions"
                );
            }
        }
        Ok(())
    }

    /// Deletes the config file. Returns whether a file was removed.
    pub fn remove_at(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)
            .map_err(|e| Error::Config(format!("could not remove {}: {}", path.display(), e)))?;
        Ok(true)
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn challenge_id(&self) -> &str {
        self.challenge_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CHALLENGE_ID)
    }

    pub fn client_options(&self) -> Result<ClientOptions> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "missing credentials: pass an api key or run `lbc login` first".to_string(),
                )
            })?;
        Ok(ClientOptions::new(self.base_url(), api_key).with_challenge_id(self.challenge_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "lbc_config_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = temp_dir("missing");
        let config = Config::load_from(&dir.join("config.toml")).expect("load");
        assert_eq!(config, Config::default());
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.challenge_id(), "default");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = temp_dir("save");
        let path = dir.join("nested").join("config.toml");
        let config = Config {
            api_key: Some("sk_test".into()),
            base_url: Some("http://localhost:9999".into()),
            challenge_id: Some("color-match".into()),
        };
        config.save_to(&path).expect("save");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("api_key = \"sk_test\""), "{}", raw);
        assert_eq!(Config::load_from(&path).expect("load"), config);
        assert!(Config::remove_at(&path).expect("remove"));
        assert!(!Config::remove_at(&path).expect("remove again"));
        let _ = fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = temp_dir("perms");
        let path = dir.join("config.toml");
        Config {
            api_key: Some("sk_secret".into()),
            ..Config::default()
        }
        .save_to(&path)
        .expect("save");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [(ENV_BASE_URL, "http://override:1"), (ENV_API_KEY, "  ")]
            .into_iter()
            .collect();
        let mut config = Config {
            api_key: Some("sk_file".into()),
            ..Config::default()
        };
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.base_url(), "http://override:1");
        assert_eq!(config.api_key.as_deref(), Some("sk_file"));
    }

    #[test]
    fn client_options_require_api_key() {
        let err = Config::default().client_options().expect_err("no key");
        assert_eq!(err.kind(), "config_error");
        let options = Config {
            api_key: Some("sk".into()),
            challenge_id: Some("c1".into()),
            ..Config::default()
        }
        .client_options()
        .expect("options");
        assert_eq!(options.challenge_id, "c1");
        assert_eq!(options.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = temp_dir("bad");
        let path = dir.join("config.toml");
        fs::write(&path, "api_key = ").expect("write");
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
        let _ = fs::remove_dir_all(dir);
    }
}
