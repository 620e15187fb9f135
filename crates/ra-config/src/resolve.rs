//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI arguments → environment variables → XDG paths → defaults.

use std::path::{Path, PathBuf};

/// Which run a configuration file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    /// Cohort simulation (`recency simulate`).
    Simulation,
    /// Assay property estimation (`recency estimate`).
    Assay,
}

impl ConfigKind {
    /// Environment variable holding a direct path for this kind.
    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKind::Simulation => ENV_SIMULATION_PATH,
            ConfigKind::Assay => ENV_ASSAY_PATH,
        }
    }

    /// File names searched for inside a config directory, in order.
    pub fn file_names(self) -> &'static [&'static str] {
        match self {
            ConfigKind::Simulation => &["simulate.toml", "simulate.json"],
            ConfigKind::Assay => &["estimate.toml", "estimate.json"],
        }
    }
}

/// A resolved configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// Path to the config file (or None if not found).
    pub path: Option<PathBuf>,

    /// Where the path came from (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
const ENV_SIMULATION_PATH: &str = "RA_SIMULATION_CONFIG";
const ENV_ASSAY_PATH: &str = "RA_ASSAY_CONFIG";
const ENV_CONFIG_DIR: &str = "RA_CONFIG_DIR";

/// Application name for XDG directories.
const APP_NAME: &str = "recency-assay";

/// Resolve a configuration path using the standard resolution order.
///
/// 1. Explicit CLI path (if it exists)
/// 2. Environment variable (RA_SIMULATION_CONFIG, RA_ASSAY_CONFIG)
/// 3. RA_CONFIG_DIR environment variable + file name
/// 4. XDG config directory (~/.config/recency-assay/)
/// 5. Built-in defaults (None)
pub fn resolve_config(kind: ConfigKind, cli_path: Option<&Path>) -> ResolvedConfig {
    // 1. CLI argument
    if let Some(path) = cli_path {
        if path.exists() {
            return found(path.to_path_buf(), ConfigSource::CliArgument);
        }
    }

    // 2. Environment variable (direct path)
    if let Ok(env_path) = std::env::var(kind.env_var()) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    // 3. Environment variable (config dir)
    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        if let Some(path) = first_existing(Path::new(&config_dir), kind) {
            return found(path, ConfigSource::Environment);
        }
    }

    // 4. XDG config directory
    if let Some(dir) = xdg_config_dir() {
        if let Some(path) = first_existing(&dir, kind) {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    ResolvedConfig::default()
}

fn found(path: PathBuf, source: ConfigSource) -> ResolvedConfig {
    ResolvedConfig {
        path: Some(path),
        source,
    }
}

fn first_existing(dir: &Path, kind: ConfigKind) -> Option<PathBuf> {
    kind.file_names()
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Get the XDG config directory for recency-assay.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_kind_file_names() {
        assert_eq!(ConfigKind::Simulation.file_names()[0], "simulate.toml");
        assert_eq!(ConfigKind::Assay.env_var(), "RA_ASSAY_CONFIG");
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(path) = xdg_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }
}
