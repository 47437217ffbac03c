use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::model::OptionTemplate;
use crate::session::{default_option_templates, DEFAULT_SESSION_NAME};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Options a new session starts with
    pub default_options: Vec<OptionTemplate>,
    pub default_session_name: String,
    /// How many ticks a status message stays on screen
    pub toast_ticks: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_options: default_option_templates(),
            default_session_name: DEFAULT_SESSION_NAME.to_string(),
            toast_ticks: 30,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "scorekeep") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("scorekeep_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) if !cfg.default_options.is_empty() => cfg,
            Ok(cfg) => Config {
                default_options: default_option_templates(),
                ..cfg
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring invalid config file");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
