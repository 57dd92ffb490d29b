//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SUGO_SERIALPORT";

/// Config file name
const CONFIG_FILE_NAME: &str = "sugo-serialport.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SUGO_SERIALPORT_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SUGO_SERIALPORT_CONFIG` environment variable (explicit path)
    /// 2. `./sugo-serialport.toml` (current directory)
    /// 3. The platform config directory for `sugo-serialport`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values in every case.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "{CONFIG_PATH_ENV} points at a missing file");
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform config directory for this adapter.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("io", "sugos", "sugo-serialport").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), "loading configuration");
    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> Option<(String, String)> {
    let var = format!("{ENV_PREFIX}_{key}");
    std::env::var(&var).ok().map(|val| (var, val))
}

/// Apply `SUGO_SERIALPORT_<SECTION>_<KEY>` overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some((_, val)) = env_var("ADAPTER_PATH") {
        config.adapter.path = Some(val).filter(|p| !p.is_empty());
    }
    if let Some((var, val)) = env_var("ADAPTER_VARIANT") {
        config.adapter.variant = val.parse().map_err(|e: String| ConfigError::env_parse(var, e))?;
    }
    if let Some((var, val)) = env_var("ADAPTER_TIMEOUT") {
        config.adapter.timeout = val.parse().map_err(|e: String| ConfigError::env_parse(var, e))?;
    }
    if let Some((var, val)) = env_var("ADAPTER_BAUD_RATE") {
        config.adapter.options.baud_rate = val
            .parse()
            .map_err(|_| ConfigError::env_parse(var, "Invalid baud rate"))?;
    }
    if let Some((var, val)) = env_var("ADAPTER_EVENT_BUFFER") {
        config.adapter.event_buffer = val
            .parse()
            .map_err(|_| ConfigError::env_parse(var, "Invalid buffer size"))?;
    }
    if let Some((_, val)) = env_var("HOST_REQUIRED_COMMANDS") {
        config.host.required_commands = val
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }

    Ok(())
}

fn validate(config: &Config) -> ConfigResult<()> {
    if config.adapter.event_buffer == 0 {
        return Err(ConfigError::validation("adapter.event_buffer", "must be at least 1"));
    }
    if config.adapter.options.baud_rate == 0 {
        return Err(ConfigError::validation("adapter.options.baudRate", "must be positive"));
    }
    if config.host.required_commands.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::validation("host.required_commands", "empty command name"));
    }
    Ok(())
}
