//! Test utilities shared by the ckan integration tests.
//!
//! Provides a module builder for catalog fixtures and an isolated
//! environment with a config directory, a game instance and a staging cache.

#![allow(dead_code)]

use ckan::{CkanModule, GameVersion, RelationshipDescriptor};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Game version used by every fixture instance
pub const GAME_VERSION: &str = "1.12.5";

pub fn game_version() -> GameVersion {
    GameVersion::parse(GAME_VERSION).expect("valid game version")
}

/// Builder for module records
pub struct MockModule {
    module: CkanModule,
}

impl MockModule {
    pub fn new(identifier: &str, version: &str) -> Self {
        Self {
            module: CkanModule::new(identifier, version),
        }
    }

    pub fn depends(mut self, name: &str) -> Self {
        self.module.depends.push(RelationshipDescriptor::new(name));
        self
    }

    pub fn depends_on(mut self, descriptor: RelationshipDescriptor) -> Self {
        self.module.depends.push(descriptor);
        self
    }

    pub fn recommends(mut self, name: &str) -> Self {
        self.module.recommends.push(RelationshipDescriptor::new(name));
        self
    }

    pub fn suggests(mut self, name: &str) -> Self {
        self.module.suggests.push(RelationshipDescriptor::new(name));
        self
    }

    pub fn conflicts(mut self, name: &str) -> Self {
        self.module.conflicts.push(RelationshipDescriptor::new(name));
        self
    }

    pub fn provides(mut self, name: &str) -> Self {
        self.module.provides.push(name.to_string());
        self
    }

    pub fn game_version(mut self, version: &str) -> Self {
        self.module.ksp_version = GameVersion::parse(version).expect("valid game version");
        self
    }

    pub fn summary(mut self, text: &str) -> Self {
        self.module.abstract_ = Some(text.to_string());
        self
    }

    pub fn build(self) -> CkanModule {
        self.module
    }
}

/// An isolated config directory plus one game instance
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub game_root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_dir = temp_dir.path().join("config");
        let game_root = temp_dir.path().join("KSP");

        fs::create_dir_all(&config_dir).expect("Failed to create config directory");
        fs::create_dir_all(game_root.join("GameData")).expect("Failed to create GameData");

        Self {
            temp_dir,
            config_dir,
            game_root,
        }
    }

    /// Write a config registering the game root as the default instance
    pub fn with_instance(self) -> Self {
        let content = format!(
            r#"default_instance = "test"

[[instances]]
name = "test"
path = "{}"
game_version = "{}"
"#,
            self.game_root.display().to_string().replace('\\', "/"),
            GAME_VERSION
        );
        fs::write(self.config_dir.join("config.toml"), content).expect("Failed to write config");
        self
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.config_dir.join("catalog")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.config_dir.join("cache")
    }

    /// Drop a module record into the catalog directory
    pub fn add_to_catalog(&self, module: &CkanModule) -> PathBuf {
        let dir = self.catalog_dir();
        fs::create_dir_all(&dir).expect("Failed to create catalog dir");
        let path = dir.join(format!("{}-{}.ckan", module.identifier, module.version));
        let json = serde_json::to_string_pretty(module).expect("Failed to serialize module");
        fs::write(&path, json).expect("Failed to write module record");
        path
    }

    /// Stage one file for `module` at `relative` under the game root
    pub fn stage_file(&self, module: &CkanModule, relative: &str) -> PathBuf {
        let path = self
            .cache_dir()
            .join(format!("{}-{}", module.identifier, module.version))
            .join(relative);
        fs::create_dir_all(path.parent().expect("staged file has a parent"))
            .expect("Failed to create staging dir");
        fs::write(&path, format!("{} {}", module.identifier, module.version))
            .expect("Failed to write staged file");
        path
    }

    pub fn game_file(&self, relative: &str) -> PathBuf {
        self.game_root.join(relative)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.game_root.join("CKAN").join("registry.json")
    }
}

/// Assert that a file exists
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a file does not exist
pub fn assert_file_not_exists(path: &Path) {
    assert!(
        !path.exists(),
        "Expected file to not exist: {}",
        path.display()
    );
}
