//! Registry persistence
//!
//! Each game instance keeps its registry in `<game root>/CKAN/registry.json`.
//! A missing file means nothing has been installed yet. Older files without
//! a file ownership index get one rebuilt on load.
//!
//! # Examples
//!
//! ```no_run
//! use ckan::{GameInstance, GameVersion, RegistryManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let instance = GameInstance::new("main", "/games/ksp", GameVersion::parse("1.12.5")?);
//! let manager = RegistryManager::open(instance)?;
//!
//! let registry = manager.session().snapshot();
//! println!("{} modules installed", registry.installed_modules().count());
//!
//! manager.save()?;
//! # Ok(())
//! # }
//! ```

use crate::registry::REGISTRY_VERSION;
use crate::{Error, GameInstance, Registry, RegistrySession, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The registry filename inside the instance's CKAN directory
pub const REGISTRY_FILE_NAME: &str = "registry.json";

pub struct RegistryManager {
    instance: GameInstance,
    session: RegistrySession,
}

impl RegistryManager {
    /// Load the registry for `instance`, or start an empty one.
    pub fn open(instance: GameInstance) -> Result<Self> {
        let path = Self::registry_path(&instance);
        let registry = Self::load_from(&path)?.unwrap_or_else(|| {
            debug!("No registry at {}, starting empty", path.display());
            Registry::empty()
        });

        Ok(Self {
            instance,
            session: RegistrySession::new(registry),
        })
    }

    pub fn registry_path(instance: &GameInstance) -> PathBuf {
        instance.ckan_dir().join(REGISTRY_FILE_NAME)
    }

    pub fn instance(&self) -> &GameInstance {
        &self.instance
    }

    pub fn session(&self) -> &RegistrySession {
        &self.session
    }

    /// Load a registry file. Returns `None` if it doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<Registry>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        let mut registry: Registry = serde_json::from_str(&contents)?;

        if registry.registry_version != REGISTRY_VERSION {
            return Err(Error::RegistryVersionNotSupported(
                registry.registry_version,
            ));
        }

        if registry.needs_file_index() {
            info!("Rebuilding file ownership index for {}", path.display());
            registry.rebuild_file_index();
        }

        Ok(Some(registry))
    }

    /// Write a registry file, replacing any existing one.
    pub fn save_to<P: AsRef<Path>>(registry: &Registry, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(registry)?;

        // Write then rename so a crash never leaves a truncated registry
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        debug!("Saved registry to {}", path.display());
        Ok(())
    }

    /// Persist the current state of the session.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.session.snapshot();
        Self::save_to(&snapshot, Self::registry_path(&self.instance))
    }
}
