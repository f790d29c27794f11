use crate::catalog::ProxyRule;
use crate::persist::PersistPolicy;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub catalog: CatalogConfig,
    pub player: PlayerConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Source-resolution endpoint.
    pub base_url: String,
    pub timeout_secs: u64,
    /// Whether the player is considered to run on a secure origin.
    pub secure_origin: bool,
    pub proxy_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// mpv audio device name (see `mpv --audio-device=help`)
    pub audio_device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub save_interval_secs: u64,
    pub startup_guard_secs: u64,
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.paths.data_dir.join("reprise.sqlite3")
    }

    pub fn window_socket_path(&self) -> PathBuf {
        self.paths.data_dir.join("lyrics.sock")
    }

    pub fn mpv_log_path(&self) -> PathBuf {
        self.paths.data_dir.join("mpv.log")
    }

    pub fn proxy_rule(&self) -> ProxyRule {
        ProxyRule::new(self.catalog.secure_origin, self.catalog.proxy_path.clone())
    }

    pub fn persist_policy(&self) -> PersistPolicy {
        PersistPolicy {
            save_interval: Duration::from_secs(self.persistence.save_interval_secs),
            startup_guard: Duration::from_secs(self.persistence.startup_guard_secs),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("dev", "reprise", "reprise")
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("reprise"));
        Self { data_dir }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api/music".to_string(),
            timeout_secs: 15,
            secure_origin: false,
            proxy_path: "/api/music/proxy".to_string(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_interval_secs: 20,
            startup_guard_secs: 5,
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "reprise", "reprise").context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

/// Load the config, writing the defaults on first run.
pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
        }
        let cfg = Config::default();
        let raw = toml::to_string_pretty(&cfg).context("serialize default config")?;
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote default config");
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
