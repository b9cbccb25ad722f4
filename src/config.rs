//! User configuration management
//!
//! Configuration is stored in TOML format at `~/.ckan/config.toml`. It lists
//! the game instances ckan manages, where the catalog and download cache
//! live, and the resolver defaults used by `ckan install`.
//!
//! # Examples
//!
//! ```no_run
//! use ckan::{Config, GameVersion};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load()?;
//! config.add_instance("main", "~/KSP".into(), GameVersion::parse("1.12.5")?);
//! config.default_instance = Some("main".to_string());
//! config.save()?;
//!
//! println!("Recommends on by default: {}", config.resolver.with_recommends);
//! # Ok(())
//! # }
//! ```

use crate::resolver::RelationshipResolverOptions;
use crate::{Error, GameInstance, GameVersion, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "CKAN_CONFIG_DIR";

/// User configuration file (`~/.ckan/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Known game installations
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,

    /// Instance used when `--instance` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_instance: Option<String>,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub game_version: GameVersion,
}

impl InstanceConfig {
    pub fn to_instance(&self) -> GameInstance {
        GameInstance::new(&self.name, expand_path(&self.path), self.game_version)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory of `.ckan` metadata files (defaults to `<config dir>/catalog`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory of unpacked module downloads (defaults to `<config dir>/cache`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Resolver defaults for `ckan install`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_with_recommends")]
    pub with_recommends: bool,

    #[serde(default)]
    pub with_suggests: bool,

    #[serde(default)]
    pub with_all_suggests: bool,
}

fn default_with_recommends() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            with_recommends: default_with_recommends(),
            with_suggests: false,
            with_all_suggests: false,
        }
    }
}

impl ResolverConfig {
    pub fn to_options(&self) -> RelationshipResolverOptions {
        RelationshipResolverOptions {
            with_recommends: self.with_recommends,
            with_suggests: self.with_suggests,
            with_all_suggests: self.with_all_suggests,
            ..RelationshipResolverOptions::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing filter directive, e.g. `info` or `ckan::resolver=debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn expand_path(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

impl Config {
    /// Directory holding the config file, catalog and cache
    ///
    /// Uses CKAN_CONFIG_DIR if set, otherwise ~/.ckan
    pub fn config_dir() -> Result<PathBuf> {
        // Check for custom config directory (useful for testing)
        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(config_dir));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;
        Ok(home.join(".ckan"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file, or return defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog.path {
            Some(path) => Ok(expand_path(path)),
            None => Ok(Self::config_dir()?.join("catalog")),
        }
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(expand_path(path)),
            None => Ok(Self::config_dir()?.join("cache")),
        }
    }

    /// Add a game instance, replacing any existing one with the same name
    pub fn add_instance(&mut self, name: &str, path: PathBuf, game_version: GameVersion) {
        self.instances.retain(|i| i.name != name);
        self.instances.push(InstanceConfig {
            name: name.to_string(),
            path,
            game_version,
        });

        if self.default_instance.is_none() {
            self.default_instance = Some(name.to_string());
        }
    }

    /// Remove a game instance. Returns false if no such instance exists.
    pub fn remove_instance(&mut self, name: &str) -> bool {
        let before = self.instances.len();
        self.instances.retain(|i| i.name != name);

        if self.default_instance.as_deref() == Some(name) {
            self.default_instance = None;
        }
        self.instances.len() != before
    }

    pub fn find_instance(&self, name: &str) -> Option<&InstanceConfig> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// The configured default instance, or the only instance if there is one
    pub fn default_instance(&self) -> Option<&InstanceConfig> {
        match &self.default_instance {
            Some(name) => self.find_instance(name),
            None if self.instances.len() == 1 => self.instances.first(),
            None => None,
        }
    }

    /// Pick `name` if given, otherwise the default instance
    pub fn select_instance(&self, name: Option<&str>) -> Result<GameInstance> {
        match name {
            Some(name) => self
                .find_instance(name)
                .map(InstanceConfig::to_instance)
                .ok_or_else(|| Error::NoInstance(format!(" named '{}'", name))),
            None => self
                .default_instance()
                .map(InstanceConfig::to_instance)
                .ok_or_else(|| Error::NoInstance(String::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.instances.is_empty());
        assert!(config.resolver.with_recommends);
        assert!(!config.resolver.with_suggests);
        assert!(config.log.filter.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            default_instance = "main"

            [[instances]]
            name = "main"
            path = "/games/ksp"
            game_version = "1.12.5"

            [resolver]
            with_suggests = true
            "#,
        )
        .unwrap();

        assert_eq!(config.instances[0].game_version, GameVersion::new(1, 12, 5));
        assert!(config.resolver.with_recommends);
        assert!(config.resolver.with_suggests);
        assert_eq!(config.default_instance().unwrap().name, "main");
    }

    #[test]
    fn test_instance_management() {
        let mut config = Config::default();

        config.add_instance("main", PathBuf::from("/games/ksp"), GameVersion::Any);
        assert_eq!(config.default_instance.as_deref(), Some("main"));

        config.add_instance("main", PathBuf::from("/games/ksp2"), GameVersion::Any);
        assert_eq!(config.instances.len(), 1);
        assert_eq!(config.instances[0].path, PathBuf::from("/games/ksp2"));

        assert!(config.remove_instance("main"));
        assert!(!config.remove_instance("main"));
        assert!(config.default_instance.is_none());
        assert!(config.select_instance(None).is_err());
    }

    #[test]
    fn test_resolver_options_from_config() {
        let resolver = ResolverConfig {
            with_recommends: false,
            with_suggests: true,
            with_all_suggests: false,
        };
        let options = resolver.to_options();
        assert!(!options.with_recommends);
        assert!(options.with_suggests);
        assert!(!options.without_enforce_consistency);
    }
}
