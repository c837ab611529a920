//! Worker configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TOLLGATE_DATA_DIR";

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Bounds on INIT parameters.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Log filter settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unix socket path. Empty = $data_dir/worker.sock.
    #[serde(default)]
    pub socket_path: String,
}

/// Bounds applied to host-supplied INIT parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest chain length an INIT may request.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// `yieldEvery` used when INIT omits it.
    #[serde(default = "default_yield_every")]
    pub default_yield_every: u32,
}

/// Log filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the `tollgate` targets: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_steps() -> u32 {
    1 << 24
}

fn default_yield_every() -> u32 {
    tollgate_types::DEFAULT_YIELD_EVERY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            default_yield_every: default_yield_every(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_data_dir().join("config.toml"))
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::default_data_dir()
    }

    /// Socket the server listens on.
    pub fn socket_path(&self, data_dir: &Path) -> PathBuf {
        if self.server.socket_path.is_empty() {
            data_dir.join("worker.sock")
        } else {
            PathBuf::from(&self.server.socket_path)
        }
    }

    /// Default `EnvFilter` directive for the configured level.
    pub fn log_directive(&self) -> String {
        format!("tollgate={}", self.logging.level)
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            home_subdir("Library/Application Support/Tollgate")
        }
        #[cfg(not(target_os = "macos"))]
        {
            home_subdir(".tollgate")
        }
    }
}

fn home_subdir(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| std::env::temp_dir().join("tollgate"))
}
