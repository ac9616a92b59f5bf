use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::scheduler::TaskKind;
use crate::system::collector::DEFAULT_COMMAND_MAX_LEN;
use crate::system::history::DEFAULT_CAPACITY;
use crate::system::signal::CommandElevation;
use crate::tree::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub snapshot: SnapshotConfig,
    pub tree: TreeConfig,
    pub signals: SignalsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub process_list_interval_ms: u64,
    pub tree_interval_ms: u64,
    pub graphs_interval_ms: u64,
    pub status_interval_ms: u64,
    pub network_interval_ms: u64,
    pub auto_refresh: bool,
    pub history_length: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            process_list_interval_ms: 2000,
            tree_interval_ms: 3000,
            graphs_interval_ms: 2000,
            status_interval_ms: 1000,
            network_interval_ms: 5000,
            auto_refresh: true,
            history_length: DEFAULT_CAPACITY,
        }
    }
}

impl GeneralConfig {
    /// Sampling period for `kind`. Zero is bumped to 1ms since an interval
    /// cannot be empty.
    pub fn period(&self, kind: TaskKind) -> Duration {
        let ms = match kind {
            TaskKind::ProcessList => self.process_list_interval_ms,
            TaskKind::ProcessTree => self.tree_interval_ms,
            TaskKind::Graphs => self.graphs_interval_ms,
            TaskKind::StatusBar => self.status_interval_ms,
            TaskKind::Network => self.network_interval_ms,
        };
        Duration::from_millis(ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub command_max_len: usize,
    /// Only list processes owned by root.
    pub root_only: bool,
    pub hide_kernel_threads: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            command_max_len: DEFAULT_COMMAND_MAX_LEN,
            root_only: false,
            hide_kernel_threads: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// argv of the privilege helper; `{signal}` and `{pid}` are substituted.
    pub elevation_command: Vec<String>,
    pub elevation_timeout_secs: u64,
    pub resample_delay_ms: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        SignalsConfig {
            elevation_command: CommandElevation::default_argv(),
            elevation_timeout_secs: 30,
            resample_delay_ms: 500,
        }
    }
}

impl SignalsConfig {
    pub fn elevation(&self) -> CommandElevation {
        CommandElevation::new(
            self.elevation_command.clone(),
            Duration::from_secs(self.elevation_timeout_secs),
        )
    }

    pub fn resample_delay(&self) -> Duration {
        Duration::from_millis(self.resample_delay_ms)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("procwatch").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "invalid config, using defaults");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}
