//! Configuration layering, file discovery, and environment overrides

use std::collections::HashMap;
use std::time::Duration;
use camino::{Utf8Path, Utf8PathBuf};
use stow_core::error::StowError;
use tracing::debug;
use crate::toml::{validate_config, StowToml};
use crate::{root::default_cache_root, ConfigResult};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "stow.toml";

/// Cache name used when no layer sets one
pub const DEFAULT_CACHE_NAME: &str = "stow";

/// Purge age used when no layer sets one (one week)
pub const DEFAULT_PURGE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Prefix of recognized environment variables
pub const ENV_PREFIX: &str = "STOW_";

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StowConfig {
    /// Namespace under the per-user cache directory
    pub name: String,
    /// Explicit root, if configured
    pub root: Option<Utf8PathBuf>,
    /// Create the root if missing
    pub create_root: bool,
    /// Default age threshold for purges
    pub purge_max_age: Duration,
    /// Purge expired entries when the cache is opened
    pub purge_on_open: bool,
    /// tracing filter for hosts that let stow install logging
    pub log_filter: Option<String>,
}

impl Default for StowConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CACHE_NAME.to_string(),
            root: None,
            create_root: true,
            purge_max_age: DEFAULT_PURGE_MAX_AGE,
            purge_on_open: false,
            log_filter: None,
        }
    }
}

impl StowConfig {
    /// Config rooted at an explicit directory, everything else default
    pub fn with_root(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// The directory the cache lives in
    pub fn cache_root(&self) -> ConfigResult<Utf8PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => default_cache_root(&self.name),
        }
    }

    fn from_layers(layers: StowToml) -> Self {
        let defaults = Self::default();
        Self {
            name: layers.cache.name.unwrap_or(defaults.name),
            root: layers.cache.root,
            create_root: layers.cache.create_root.unwrap_or(defaults.create_root),
            purge_max_age: layers
                .purge
                .max_age_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.purge_max_age),
            purge_on_open: layers.purge.on_open.unwrap_or(defaults.purge_on_open),
            log_filter: layers.log.filter,
        }
    }
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Built-in defaults
    Default,
    /// Global config file
    Global(Utf8PathBuf),
    /// Project stow.toml file
    Project(Utf8PathBuf),
    /// Environment variable
    Environment(String),
}

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Directory project discovery starts from
    cwd: Utf8PathBuf,
    /// Global config file location
    global_path: Option<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a loader that searches upward from `cwd`
    pub fn new(cwd: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            global_path: Self::default_global_path(),
        }
    }

    /// Use a specific global config file instead of the per-user one
    pub fn with_global_path(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    /// `<config_dir>/stow/config.toml`, if the platform has a config dir
    pub fn default_global_path() -> Option<Utf8PathBuf> {
        dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
            .map(|dir| dir.join("stow").join("config.toml"))
    }

    /// Find the project stow.toml by walking up the directory tree
    pub fn resolve_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current: Option<&Utf8Path> = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.is_file() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }

    /// Load the project configuration, if any
    pub fn load_project_config(&self) -> ConfigResult<Option<(StowToml, Utf8PathBuf)>> {
        match self.resolve_config_path(CONFIG_FILE_NAME) {
            Some(path) => {
                debug!("Loading project config from {}", path);
                let config = crate::toml::load_from_file(&path)?;
                Ok(Some((config, path)))
            },
            None => Ok(None),
        }
    }

    /// Load the global configuration, if any
    pub fn load_global_config(&self) -> ConfigResult<Option<(StowToml, Utf8PathBuf)>> {
        match &self.global_path {
            Some(path) if path.is_file() => {
                debug!("Loading global config from {}", path);
                let config = crate::toml::load_from_file(path)?;
                Ok(Some((config, path.clone())))
            },
            _ => Ok(None),
        }
    }

    /// Load every layer from disk and the process environment
    pub fn load(&self) -> ConfigResult<(StowConfig, Vec<ConfigSource>)> {
        self.load_with_env(ConfigLayering::collect_env_overrides())
    }

    /// Load file layers and apply the given environment overrides
    pub fn load_with_env(
        &self,
        env_overrides: HashMap<String, String>,
    ) -> ConfigResult<(StowConfig, Vec<ConfigSource>)> {
        let mut sources = vec![ConfigSource::Default];

        let global = self.load_global_config()?.map(|(config, path)| {
            sources.push(ConfigSource::Global(path));
            config
        });
        let project = self.load_project_config()?.map(|(config, path)| {
            sources.push(ConfigSource::Project(path));
            config
        });

        let mut env_keys: Vec<_> = env_overrides.keys().cloned().collect();
        env_keys.sort();
        sources.extend(env_keys.into_iter().map(ConfigSource::Environment));

        let config = ConfigLayering::merge_configs(global, project, env_overrides)?;
        Ok((config, sources))
    }
}

/// Configuration layering and merging
pub struct ConfigLayering;

impl ConfigLayering {
    /// Merge configuration layers: defaults, global, project, environment
    pub fn merge_configs(
        global_config: Option<StowToml>,
        project_config: Option<StowToml>,
        env_overrides: HashMap<String, String>,
    ) -> ConfigResult<StowConfig> {
        let mut merged = StowToml::default();

        if let Some(global) = global_config {
            merged = merged.overlay(global);
        }
        if let Some(project) = project_config {
            merged = merged.overlay(project);
        }

        Self::apply_env_overrides(&mut merged, &env_overrides)?;
        validate_config(&merged)?;

        Ok(StowConfig::from_layers(merged))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut StowToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "STOW_NAME" => {
                    config.cache.name = Some(value.clone());
                },
                "STOW_ROOT" => {
                    config.cache.root = Some(Utf8PathBuf::from(value));
                },
                "STOW_CREATE_ROOT" => {
                    config.cache.create_root = Some(parse_bool(key, value)?);
                },
                "STOW_PURGE_MAX_AGE_SECS" => {
                    let secs = value.trim().parse::<u64>().map_err(|e| StowError::ConfigValidation {
                        field: key.clone(),
                        reason: format!("Invalid number of seconds '{}': {}", value, e),
                    })?;
                    config.purge.max_age_secs = Some(secs);
                },
                "STOW_PURGE_ON_OPEN" => {
                    config.purge.on_open = Some(parse_bool(key, value)?);
                },
                "STOW_LOG" => {
                    config.log.filter = Some(value.clone());
                },
                _ => {
                    // Unknown environment variable, ignore
                },
            }
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StowError::ConfigValidation {
            field: field.to_string(),
            reason: format!("Expected a boolean, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toml::parse_stow_toml;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLayering::merge_configs(None, None, HashMap::new()).unwrap();
        assert_eq!(config, StowConfig::default());
        assert_eq!(config.name, "stow");
        assert_eq!(config.purge_max_age, DEFAULT_PURGE_MAX_AGE);
    }

    #[test]
    fn test_merge_configs() {
        let global = parse_stow_toml(
            "[cache]\nname = \"global\"\n[purge]\nmax_age_secs = 100\n[log]\nfilter = \"stow=warn\"\n",
        )
        .unwrap();
        let project = parse_stow_toml("[cache]\nname = \"project\"\n").unwrap();
        let env = HashMap::from([("STOW_PURGE_ON_OPEN".to_string(), "true".to_string())]);

        let merged = ConfigLayering::merge_configs(Some(global), Some(project), env).unwrap();

        // Project config should take precedence over global
        assert_eq!(merged.name, "project");
        // Global values survive where the project is silent
        assert_eq!(merged.purge_max_age, Duration::from_secs(100));
        assert_eq!(merged.log_filter.as_deref(), Some("stow=warn"));
        // Environment override should be applied
        assert!(merged.purge_on_open);
    }

    #[test]
    fn test_env_overrides_win() {
        let project = parse_stow_toml("[cache]\nroot = \"/from/file\"\n").unwrap();
        let env = HashMap::from([
            ("STOW_ROOT".to_string(), "/from/env".to_string()),
            ("STOW_PURGE_MAX_AGE_SECS".to_string(), "42".to_string()),
            ("STOW_UNKNOWN".to_string(), "ignored".to_string()),
        ]);

        let merged = ConfigLayering::merge_configs(None, Some(project), env).unwrap();
        assert_eq!(merged.root.as_deref(), Some(Utf8Path::new("/from/env")));
        assert_eq!(merged.cache_root().unwrap(), Utf8PathBuf::from("/from/env"));
        assert_eq!(merged.purge_max_age, Duration::from_secs(42));
    }

    #[test]
    fn test_invalid_env_overrides() {
        let env = HashMap::from([("STOW_PURGE_MAX_AGE_SECS".to_string(), "soon".to_string())]);
        assert!(ConfigLayering::merge_configs(None, None, env).is_err());

        let env = HashMap::from([("STOW_PURGE_MAX_AGE_SECS".to_string(), "0".to_string())]);
        assert!(ConfigLayering::merge_configs(None, None, env).is_err());

        let env = HashMap::from([("STOW_NAME".to_string(), "a/b".to_string())]);
        assert!(ConfigLayering::merge_configs(None, None, env).is_err());

        let env = HashMap::from([("STOW_PURGE_ON_OPEN".to_string(), "maybe".to_string())]);
        assert!(ConfigLayering::merge_configs(None, None, env).is_err());
    }

    #[test]
    fn test_resolve_config_path_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = utf8_dir(&temp_dir);
        std::fs::write(temp_path.join(CONFIG_FILE_NAME), "[cache]\nname = \"walked\"\n").unwrap();
        let nested = temp_path.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let loader = ConfigLoader::new(nested).with_global_path(None);
        let resolved = loader.resolve_config_path(CONFIG_FILE_NAME).unwrap();
        assert_eq!(resolved, temp_path.join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_tracks_sources() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = utf8_dir(&temp_dir);
        let global_path = temp_path.join("global.toml");
        std::fs::write(&global_path, "[purge]\nmax_age_secs = 7\n").unwrap();
        let project_dir = temp_path.join("project");
        std::fs::create_dir(&project_dir).unwrap();
        std::fs::write(project_dir.join(CONFIG_FILE_NAME), "[cache]\nname = \"proj\"\n").unwrap();

        let loader = ConfigLoader::new(project_dir.clone()).with_global_path(Some(global_path.clone()));
        let env = HashMap::from([("STOW_LOG".to_string(), "stow=trace".to_string())]);
        let (config, sources) = loader.load_with_env(env).unwrap();

        assert_eq!(config.name, "proj");
        assert_eq!(config.purge_max_age, Duration::from_secs(7));
        assert_eq!(config.log_filter.as_deref(), Some("stow=trace"));
        assert_eq!(
            sources,
            vec![
                ConfigSource::Default,
                ConfigSource::Global(global_path),
                ConfigSource::Project(project_dir.join(CONFIG_FILE_NAME)),
                ConfigSource::Environment("STOW_LOG".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("x", "Yes").unwrap());
        assert!(!parse_bool("x", "0").unwrap());
        assert!(parse_bool("x", "2").is_err());
    }
}
