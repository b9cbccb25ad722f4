//! A game installation the registry manages

use crate::{Error, GameVersion, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Name of the directory inside the game root holding CKAN's own state.
pub const CKAN_DIR: &str = "CKAN";

/// Name of the directory mods are installed into.
pub const GAME_DATA_DIR: &str = "GameData";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInstance {
    pub name: String,
    pub root: PathBuf,
    pub version: GameVersion,
}

impl GameInstance {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, version: GameVersion) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            version,
        }
    }

    pub fn ckan_dir(&self) -> PathBuf {
        self.root.join(CKAN_DIR)
    }

    pub fn game_data(&self) -> PathBuf {
        self.root.join(GAME_DATA_DIR)
    }

    /// Turn `path` into a forward-slash path relative to the game root.
    ///
    /// Relative paths are taken as already relative to the root. Absolute
    /// paths must lie under it. `..` components may not escape the root.
    pub fn to_relative(&self, path: &str) -> Result<String> {
        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            candidate.strip_prefix(&self.root).map_err(|_| {
                Error::Other(format!(
                    "{} is outside the game directory {}",
                    path,
                    self.root.display()
                ))
            })?
        } else {
            candidate
        };

        let mut parts: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(Error::Other(format!(
                            "{} escapes the game directory",
                            path
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {}
            }
        }

        // Windows-style separators in metadata
        let joined = parts.join("/").replace('\\', "/");
        if joined.is_empty() {
            return Err(Error::Other(format!("{} names the game directory itself", path)));
        }
        Ok(joined)
    }

    pub fn to_absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> GameInstance {
        GameInstance::new("test", "/games/ksp", GameVersion::new(1, 12, 5))
    }

    #[test]
    fn test_relative_paths_pass_through() {
        let inst = instance();
        assert_eq!(
            inst.to_relative("GameData/Foo/Foo.dll").unwrap(),
            "GameData/Foo/Foo.dll"
        );
        assert_eq!(
            inst.to_relative("./GameData/Foo/../Bar.cfg").unwrap(),
            "GameData/Bar.cfg"
        );
    }

    #[test]
    fn test_absolute_paths_are_relativised() {
        let inst = instance();
        assert_eq!(
            inst.to_relative("/games/ksp/GameData/Foo.dll").unwrap(),
            "GameData/Foo.dll"
        );
        assert!(inst.to_relative("/tmp/Foo.dll").is_err());
    }

    #[test]
    fn test_escaping_root_is_rejected() {
        assert!(instance().to_relative("../outside.txt").is_err());
        assert!(instance().to_relative(".").is_err());
    }
}
