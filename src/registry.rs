//! The module registry: what is available and what is installed
//!
//! The registry is a pure in-memory structure. It knows every module
//! version the catalog has offered, every module installed into a game
//! instance together with the files it owns, and any bare DLLs found on
//! disk. Persistence lives in [`crate::registry_manager`].
//!
//! # Examples
//!
//! ```
//! use ckan::{CkanModule, GameInstance, GameVersion, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = Registry::empty();
//! registry.add_available(CkanModule::new("Kopernicus", "1.0"));
//! registry.add_available(CkanModule::new("Kopernicus", "1.1"));
//!
//! let game = GameVersion::parse("1.12.5")?;
//! let latest = registry.latest_available("Kopernicus", &game)?.unwrap().clone();
//! assert_eq!(latest.version.to_string(), "1.1");
//!
//! let instance = GameInstance::new("main", "/games/ksp", game);
//! let files = vec!["GameData/Kopernicus/Kopernicus.dll".to_string()];
//! registry.register_module(&latest, &files, &instance, false)?;
//! assert_eq!(registry.file_owner("GameData/Kopernicus/Kopernicus.dll"), Some("Kopernicus"));
//! # Ok(())
//! # }
//! ```

use crate::error::{Kraken, KrakenResult};
use crate::sanity::SanityChecker;
use crate::version::Version;
use crate::{CkanModule, GameInstance, GameVersion, ModuleVersion, RelationshipDescriptor};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// The only registry file format version this crate reads and writes.
pub const REGISTRY_VERSION: u32 = 0;

static DLL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|/)GameData/((?:.*/|)([^./]+)[^/]*\.dll)$")
        .expect("DLL pattern is a valid regex")
});

/// Every known release of one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableModule {
    pub identifier: String,
    /// Newest first.
    versions: Vec<CkanModule>,
}

impl AvailableModule {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            versions: Vec::new(),
        }
    }

    /// Add a release. Returns false, leaving the entry untouched, when this
    /// exact version is already known.
    pub fn add(&mut self, module: CkanModule) -> bool {
        match self
            .versions
            .binary_search_by(|existing| module.version.cmp(&existing.version))
        {
            Ok(_) => false,
            Err(pos) => {
                self.versions.insert(pos, module);
                true
            }
        }
    }

    pub fn remove(&mut self, version: &ModuleVersion) -> Option<CkanModule> {
        let pos = self.versions.iter().position(|m| &m.version == version)?;
        Some(self.versions.remove(pos))
    }

    /// Newest release that runs on `game_version` and, if given, satisfies
    /// the relationship's version bounds.
    pub fn latest(
        &self,
        game_version: &GameVersion,
        relationship: Option<&RelationshipDescriptor>,
    ) -> Option<&CkanModule> {
        self.versions.iter().find(|m| {
            m.is_compatible(game_version)
                && relationship.map_or(true, |r| r.version_within_bounds(&m.version))
        })
    }

    /// Newest release regardless of game version.
    pub fn newest(&self) -> Option<&CkanModule> {
        self.versions.first()
    }

    pub fn by_version(&self, version: &ModuleVersion) -> Option<&CkanModule> {
        self.versions.iter().find(|m| &m.version == version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &CkanModule> {
        self.versions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// A module installed into the game, with the files it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledModule {
    pub source_module: CkanModule,
    pub install_time: DateTime<Utc>,
    #[serde(default)]
    pub auto_installed: bool,
    /// Forward-slash paths relative to the game root.
    #[serde(default)]
    pub files: BTreeSet<String>,
}

impl InstalledModule {
    pub fn identifier(&self) -> &str {
        &self.source_module.identifier
    }

    pub fn version(&self) -> &ModuleVersion {
        &self.source_module.version
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub registry_version: u32,
    #[serde(default)]
    available_modules: BTreeMap<String, AvailableModule>,
    #[serde(default)]
    installed_modules: BTreeMap<String, InstalledModule>,
    /// Autodetected name → relative path
    #[serde(default)]
    installed_dlls: BTreeMap<String, String>,
    /// Relative path → owning identifier
    #[serde(default)]
    installed_files: BTreeMap<String, String>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    // ========================================================================
    // Available modules
    // ========================================================================

    /// Add a catalog record. A second record with the same identifier and
    /// version is ignored, so the first source wins.
    pub fn add_available(&mut self, module: CkanModule) {
        let entry = self
            .available_modules
            .entry(module.identifier.clone())
            .or_insert_with(|| AvailableModule::new(module.identifier.clone()));

        let label = module.to_string();
        if !entry.add(module) {
            warn!("Ignoring duplicate catalog record for {}", label);
        }
    }

    pub fn remove_available(
        &mut self,
        identifier: &str,
        version: &ModuleVersion,
    ) -> Option<CkanModule> {
        let entry = self.available_modules.get_mut(identifier)?;
        let removed = entry.remove(version);
        if entry.is_empty() {
            self.available_modules.remove(identifier);
        }
        removed
    }

    pub fn clear_available(&mut self) {
        self.available_modules.clear();
    }

    /// Replace the whole catalog.
    pub fn set_available(&mut self, modules: impl IntoIterator<Item = CkanModule>) {
        self.clear_available();
        for module in modules {
            self.add_available(module);
        }
        info!(
            "Catalog now holds {} identifiers",
            self.available_modules.len()
        );
    }

    pub fn available_module(&self, identifier: &str) -> Option<&AvailableModule> {
        self.available_modules.get(identifier)
    }

    pub fn available_identifiers(&self) -> impl Iterator<Item = &str> {
        self.available_modules.keys().map(String::as_str)
    }

    /// Latest compatible release of every identifier whose dependencies can
    /// all be met by some compatible module, sorted by identifier.
    pub fn available(&self, game_version: &GameVersion) -> Vec<&CkanModule> {
        let compatible = self.compatible_by_name(game_version);

        self.available_modules
            .values()
            .filter_map(|entry| entry.latest(game_version, None))
            .filter(|module| {
                module.depends.iter().all(|dep| {
                    self.installed_dlls.contains_key(&dep.name)
                        || compatible
                            .get(dep.name.as_str())
                            .is_some_and(|mods| mods.iter().any(|m| dep.matches(m)))
                })
            })
            .collect()
    }

    /// Newest release of every identifier that has no compatible release.
    pub fn incompatible(&self, game_version: &GameVersion) -> Vec<&CkanModule> {
        self.available_modules
            .values()
            .filter(|entry| entry.latest(game_version, None).is_none())
            .filter_map(AvailableModule::newest)
            .collect()
    }

    /// `Ok(None)` means the identifier is known but nothing runs on this game version.
    pub fn latest_available(
        &self,
        identifier: &str,
        game_version: &GameVersion,
    ) -> KrakenResult<Option<&CkanModule>> {
        self.available_modules
            .get(identifier)
            .map(|entry| entry.latest(game_version, None))
            .ok_or_else(|| Kraken::not_found(identifier))
    }

    /// The latest compatible release of `name` itself plus the latest
    /// compatible release of every module providing it, sorted by identifier.
    pub fn latest_available_with_provides(
        &self,
        name: &str,
        game_version: &GameVersion,
    ) -> Vec<&CkanModule> {
        self.available_modules
            .values()
            .filter_map(|entry| {
                entry.versions.iter().find(|m| {
                    m.is_compatible(game_version)
                        && (m.identifier == name || m.provides.iter().any(|p| p == name))
                })
            })
            .collect()
    }

    /// Modules that could satisfy `relationship`.
    ///
    /// The newest compatible release of the named identifier within the
    /// relationship's bounds wins outright. Only when there is none is the
    /// name treated as virtual, giving every compatible provider.
    pub fn find_candidates(
        &self,
        relationship: &RelationshipDescriptor,
        game_version: &GameVersion,
    ) -> Vec<&CkanModule> {
        if let Some(exact) = self
            .available_modules
            .get(&relationship.name)
            .and_then(|entry| entry.latest(game_version, Some(relationship)))
        {
            return vec![exact];
        }

        self.available_modules
            .values()
            .filter(|entry| entry.identifier != relationship.name)
            .filter_map(|entry| {
                entry.versions.iter().find(|m| {
                    m.is_compatible(game_version)
                        && m.provides.iter().any(|p| p == &relationship.name)
                })
            })
            .collect()
    }

    pub fn get_module_by_version(
        &self,
        identifier: &str,
        version: &ModuleVersion,
    ) -> Option<&CkanModule> {
        self.available_modules
            .get(identifier)
            .and_then(|entry| entry.by_version(version))
    }

    fn compatible_by_name(&self, game_version: &GameVersion) -> HashMap<&str, Vec<&CkanModule>> {
        let mut index: HashMap<&str, Vec<&CkanModule>> = HashMap::new();
        for module in self
            .available_modules
            .values()
            .flat_map(|entry| entry.versions.iter())
            .filter(|m| m.is_compatible(game_version))
        {
            for name in module.provides_list() {
                index.entry(name).or_default().push(module);
            }
        }
        index
    }

    // ========================================================================
    // Installed modules
    // ========================================================================

    /// True if `identifier` is installed as a module or DLL, or, with
    /// `with_provides`, provided by an installed module.
    pub fn is_installed(&self, identifier: &str, with_provides: bool) -> bool {
        self.installed_version(identifier, with_provides).is_some()
    }

    pub fn installed_version(&self, identifier: &str, with_provides: bool) -> Option<Version> {
        if let Some(installed) = self.installed_modules.get(identifier) {
            return Some(Version::Module(installed.version().clone()));
        }
        if self.installed_dlls.contains_key(identifier) {
            return Some(Version::Autodetected);
        }
        if with_provides {
            return self.provided().remove(identifier);
        }
        None
    }

    /// Everything installed: modules, autodetected DLLs and provided names.
    pub fn installed(&self) -> BTreeMap<String, Version> {
        let mut all = self.provided();
        for name in self.installed_dlls.keys() {
            all.insert(name.clone(), Version::Autodetected);
        }
        for (identifier, installed) in &self.installed_modules {
            all.insert(
                identifier.clone(),
                Version::Module(installed.version().clone()),
            );
        }
        all
    }

    /// Virtual names provided by installed modules.
    pub fn provided(&self) -> BTreeMap<String, Version> {
        let mut provided = BTreeMap::new();
        for installed in self.installed_modules.values() {
            for name in &installed.source_module.provides {
                if self.installed_modules.contains_key(name) {
                    continue;
                }
                provided.entry(name.clone()).or_insert_with(|| Version::Provides {
                    provided_by: installed.identifier().to_string(),
                });
            }
        }
        provided
    }

    pub fn installed_module(&self, identifier: &str) -> Option<&InstalledModule> {
        self.installed_modules.get(identifier)
    }

    pub fn installed_modules(&self) -> impl Iterator<Item = &InstalledModule> {
        self.installed_modules.values()
    }

    pub fn installed_dlls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.installed_dlls
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_str()))
    }

    pub fn installed_dll_names(&self) -> Vec<&str> {
        self.installed_dlls.keys().map(String::as_str).collect()
    }

    /// True if a newer compatible release than the installed one exists.
    /// Autodetected and provided entries never have updates.
    pub fn has_update(&self, identifier: &str, game_version: &GameVersion) -> bool {
        let Some(installed) = self.installed_modules.get(identifier) else {
            return false;
        };
        match self.latest_available(identifier, game_version) {
            Ok(Some(latest)) => latest.version > *installed.version(),
            _ => false,
        }
    }

    /// Record `module` as installed with the given files.
    ///
    /// Fails with `FileExists`, changing nothing, if another module owns
    /// one of the files. Registering an installed identifier again
    /// replaces the old entry.
    pub fn register_module(
        &mut self,
        module: &CkanModule,
        files: &[String],
        instance: &GameInstance,
        auto_installed: bool,
    ) -> KrakenResult<()> {
        let mut normalized = BTreeSet::new();
        for file in files {
            let relative = instance
                .to_relative(file)
                .map_err(|e| Kraken::bad_metadata(&module.identifier, e.to_string()))?;
            normalized.insert(relative);
        }

        for path in &normalized {
            if let Some(owner) = self.installed_files.get(path) {
                if owner != &module.identifier {
                    return Err(Kraken::FileExists {
                        path: path.clone(),
                        owner: owner.clone(),
                        installing: module.identifier.clone(),
                    });
                }
            }
        }

        if let Some(previous) = self.installed_modules.remove(&module.identifier) {
            debug!(
                "Replacing installed {} with {}",
                previous.source_module, module
            );
            self.forget_files(&previous);
        }

        for path in &normalized {
            self.installed_files
                .insert(path.clone(), module.identifier.clone());
        }

        // A real install supersedes the bare DLL
        self.installed_dlls.remove(&module.identifier);

        self.installed_modules.insert(
            module.identifier.clone(),
            InstalledModule {
                source_module: module.clone(),
                install_time: Utc::now(),
                auto_installed,
                files: normalized,
            },
        );

        info!("Registered {}", module);
        Ok(())
    }

    pub fn deregister_module(&mut self, identifier: &str) -> Option<InstalledModule> {
        let removed = self.installed_modules.remove(identifier)?;
        self.forget_files(&removed);
        info!("Deregistered {}", removed.source_module);
        Some(removed)
    }

    fn forget_files(&mut self, installed: &InstalledModule) {
        for path in &installed.files {
            if self.installed_files.get(path) == Some(&installed.source_module.identifier) {
                self.installed_files.remove(path);
            }
        }
    }

    pub fn set_auto_installed(&mut self, identifier: &str, auto_installed: bool) -> bool {
        match self.installed_modules.get_mut(identifier) {
            Some(installed) => {
                installed.auto_installed = auto_installed;
                true
            }
            None => false,
        }
    }

    /// Record a DLL found on disk. Returns the autodetected name, or `None`
    /// when the path is not a DLL under GameData or an installed module
    /// already owns it.
    pub fn register_dll(&mut self, instance: &GameInstance, path: &str) -> Option<String> {
        let relative = instance.to_relative(path).ok()?;
        if let Some(owner) = self.installed_files.get(&relative) {
            debug!("{} is owned by {}, not autodetecting", relative, owner);
            return None;
        }

        let captures = DLL_PATTERN.captures(&relative)?;
        let name = captures.get(2)?.as_str().to_string();
        if self.installed_modules.contains_key(&name) {
            return None;
        }

        debug!("Autodetected {} at {}", name, relative);
        self.installed_dlls.insert(name.clone(), relative);
        Some(name)
    }

    pub fn clear_dlls(&mut self) {
        self.installed_dlls.clear();
    }

    pub fn file_owner(&self, path: &str) -> Option<&str> {
        let normalized = path.replace('\\', "/");
        self.installed_files
            .get(normalized.trim_start_matches("./"))
            .map(String::as_str)
    }

    /// Check the installed set is consistent.
    pub fn check_sanity(&self) -> KrakenResult<()> {
        let modules: Vec<&CkanModule> = self
            .installed_modules
            .values()
            .map(|m| &m.source_module)
            .collect();
        SanityChecker::enforce_consistency(&modules, &self.installed_dll_names())
    }

    /// Every installed module that would be left with unmet dependencies if
    /// `identifiers` were removed, found transitively. The result includes
    /// `identifiers` themselves.
    pub fn find_reverse_dependencies(&self, identifiers: &[String]) -> BTreeSet<String> {
        let mut to_remove: BTreeSet<String> = identifiers.iter().cloned().collect();
        let dlls: Vec<&str> = self
            .installed_dlls
            .keys()
            .filter(|name| !to_remove.contains(*name))
            .map(String::as_str)
            .collect();

        loop {
            let remaining: Vec<&CkanModule> = self
                .installed_modules
                .values()
                .filter(|m| !to_remove.contains(m.identifier()))
                .map(|m| &m.source_module)
                .collect();

            let broken: Vec<String> = SanityChecker::find_unmet_dependencies(&remaining, &dlls)
                .into_values()
                .flatten()
                .filter(|id| !to_remove.contains(id))
                .collect();

            if broken.is_empty() {
                break;
            }
            to_remove.extend(broken);
        }

        to_remove
    }

    /// Rebuild the file ownership index from the installed modules.
    pub fn rebuild_file_index(&mut self) {
        self.installed_files = self
            .installed_modules
            .values()
            .flat_map(|m| {
                m.files
                    .iter()
                    .map(move |f| (f.clone(), m.identifier().to_string()))
            })
            .collect();
    }

    pub fn needs_file_index(&self) -> bool {
        self.installed_files.is_empty()
            && self.installed_modules.values().any(|m| !m.files.is_empty())
    }
}
