// Configuration loader
// Loads settings from an explicit path, $MODELOG_CONFIG or ~/.modelog/config.toml,
// then applies environment overrides.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::{BIND_ENV, CONFIG_ENV, LOG_DIR_ENV};
use super::settings::Config;

/// Load configuration from the first config file found, or defaults
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(default_config_path);

    let mut config = match path {
        // An explicitly named file must exist; the home default is optional
        Some(path) if explicit.is_some() || path.exists() => load_config_from(&path)?,
        _ => Config::default(),
    };

    apply_env_overrides(&mut config);

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

/// Parse a TOML config file; missing keys fall back to defaults
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    tracing::debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".modelog").join("config.toml"))
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
        if !dir.is_empty() {
            config.log_dir = PathBuf::from(dir);
        }
    }
    if let Ok(bind) = std::env::var(BIND_ENV) {
        if !bind.is_empty() {
            config.bind_address = bind;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_file() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            "bind_address = \"0.0.0.0:9000\"\nlock_timeout_ms = 250\n",
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.lock_timeout_ms, 250);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "lock_timeout_ms = \"soon\"").unwrap();
        assert!(load_config_from(file.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/modelog.toml")));
        assert!(err.is_err());
    }
}
