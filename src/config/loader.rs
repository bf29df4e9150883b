use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::types::MbcasConfig;
use super::validator::ConfigValidator;

/// Loads and validates `MbcasConfig` from an explicit path, a set of
/// standard locations, or built-in defaults if nothing is found.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(config_path: Option<&str>) -> Self {
        Self {
            config_path: config_path.map(PathBuf::from),
        }
    }

    /// Load, parse, and validate the configuration. Falls back to defaults
    /// if no explicit path was given and no standard location has a file —
    /// unlike a human-facing dev tool, a missing config file is not itself
    /// fatal for a controller meant to run with sane defaults.
    pub fn load(&self) -> Result<MbcasConfig, ConfigError> {
        let config = match self.find_config_file() {
            Some(path) => self.load_from(&path)?,
            None if self.config_path.is_some() => {
                return Err(ConfigError::NotFound);
            }
            None => MbcasConfig::default(),
        };

        let result = ConfigValidator::validate(&config);
        if !result.is_valid() {
            let joined = result
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigError::Invalid(joined));
        }
        for warning in &result.warnings {
            tracing::warn!(%warning, "configuration warning");
        }

        Ok(config)
    }

    fn load_from(&self, path: &Path) -> Result<MbcasConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            return path.exists().then(|| path.clone());
        }

        let mut search_paths = vec![
            PathBuf::from("./mbcas.yml"),
            PathBuf::from("./mbcas.yaml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("mbcas").join("config.yml"));
            search_paths.push(config_dir.join("mbcas").join("config.yaml"));
        }

        search_paths.push(PathBuf::from("/etc/mbcas/config.yml"));
        search_paths.push(PathBuf::from("/etc/mbcas/config.yaml"));

        search_paths.into_iter().find(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let loader = ConfigLoader::new(None);
        // In a clean test sandbox none of the standard locations exist.
        let result = loader.load();
        assert!(result.is_ok());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let loader = ConfigLoader::new(Some("/nonexistent/path/mbcas.yaml"));
        assert!(matches!(loader.load(), Err(ConfigError::NotFound)));
    }
}
