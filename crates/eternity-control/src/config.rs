use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::http::HttpController;

pub const DEFAULT_CONTROLLER_URL: &str = "http://127.0.0.1:8080/";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub saves: SavesConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SavesConfig {
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
    /// Where migrations stage downloaded saves. Defaults to a directory
    /// under the system temp dir.
    #[serde(default)]
    pub staging_dir: Option<String>,
}

fn default_url() -> String {
    DEFAULT_CONTROLLER_URL.to_string()
}

fn default_max_download_bytes() -> u64 {
    100_000_000
}

fn default_interval_secs() -> u64 {
    3000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
        }
    }
}

impl Default for SavesConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: default_max_download_bytes(),
            default_interval_secs: default_interval_secs(),
            staging_dir: None,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde("~/.config/eternityctl/config.toml").into_owned())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config =
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Like [`Config::load_from`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn staging_dir(&self) -> PathBuf {
        match &self.saves.staging_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => std::env::temp_dir().join("eternityctl"),
        }
    }

    pub fn connect(&self) -> Result<HttpController> {
        HttpController::new(&self.controller.url, self.controller.token.clone())
            .with_context(|| format!("controller url {}", self.controller.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str("[controller]\ntoken = \"abc\"\n").unwrap();
        assert_eq!(cfg.controller.url, DEFAULT_CONTROLLER_URL);
        assert_eq!(cfg.controller.token.as_deref(), Some("abc"));
        assert_eq!(cfg.saves, SavesConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.saves.staging_dir = Some("/var/tmp/stage".into());
        cfg.saves.default_interval_secs = 60;
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.staging_dir(), PathBuf::from("/var/tmp/stage"));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(cfg.staging_dir().ends_with("eternityctl"));
    }
}
