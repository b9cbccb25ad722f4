//! Module installation
//!
//! The [`Installer`] trait is the seam between resolution and the files on
//! disk. [`ModuleInstaller`] walks a [`Resolution`] in dependency order,
//! refuses to overwrite files owned by another module, drives the installer
//! and records every installed module in the registry.
//!
//! [`DirectoryInstaller`] is the shipped implementation: it copies modules
//! out of a staging directory where each module has already been unpacked
//! into `<staging>/<identifier>-<version>/`.
//!
//! # Examples
//!
//! ```no_run
//! use ckan::{
//!     DirectoryInstaller, GameInstance, GameVersion, ModuleInstaller, RegistryManager,
//!     RelationshipResolverOptions,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let instance = GameInstance::new("main", "/games/ksp", GameVersion::parse("1.12.5")?);
//! let manager = RegistryManager::open(instance.clone())?;
//! let resolution = manager.session().resolve(
//!     &["Kopernicus"],
//!     RelationshipResolverOptions::default(),
//!     instance.version,
//! )?;
//!
//! let mut installer = ModuleInstaller::new(DirectoryInstaller::new("/var/cache/ckan"), &instance);
//! installer.install(&resolution, manager.session())?;
//! manager.save()?;
//! # Ok(())
//! # }
//! ```

use crate::error::Kraken;
use crate::resolver::{Resolution, SelectionReason};
use crate::{CkanModule, Error, GameInstance, RegistrySession, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Progress callback for installation operations
///
/// Called with:
/// - `message`: Description of current operation (e.g., "Installing Kopernicus 1.0...")
/// - `current`: Units of work done so far
/// - `total`: Total units of work
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Puts module files into a game instance.
///
/// All paths crossing this interface are relative to the game root.
pub trait Installer {
    /// Files `install` would write, without writing anything.
    fn planned_files(&self, module: &CkanModule, instance: &GameInstance) -> Result<Vec<String>>;

    /// Write the module's files and return the paths written.
    fn install(&mut self, module: &CkanModule, instance: &GameInstance) -> Result<Vec<String>>;

    fn remove_files(&mut self, files: &[String], instance: &GameInstance) -> Result<()>;
}

/// Copies modules from an already-populated staging directory.
pub struct DirectoryInstaller {
    staging: PathBuf,
    cancel: Option<Arc<AtomicBool>>,
}

impl DirectoryInstaller {
    pub fn new<P: AsRef<Path>>(staging: P) -> Self {
        Self {
            staging: staging.as_ref().to_path_buf(),
            cancel: None,
        }
    }

    /// Stop copying between files once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Where the unpacked contents of `module` are expected.
    pub fn staging_dir(&self, module: &CkanModule) -> PathBuf {
        self.staging
            .join(format!("{}-{}", module.identifier, module.version))
    }

    fn staged_files(&self, module: &CkanModule) -> Result<Vec<(PathBuf, String)>> {
        if module.is_metapackage() {
            return Ok(Vec::new());
        }

        let source = self.staging_dir(module);
        if !source.is_dir() {
            return Err(Error::Other(format!(
                "{} is not in the download cache\n\n\
                 Hint: Unpack {} into:\n\
                    {}",
                module,
                module.standard_name(),
                source.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&source).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&source)
                .map_err(|e| Error::Other(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push((entry.path().to_path_buf(), relative));
        }
        Ok(files)
    }

    fn check_cancelled(&self, module: &CkanModule) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::SeqCst) {
                return Err(Kraken::CancelledAction(format!("installing {}", module)).into());
            }
        }
        Ok(())
    }
}

impl Installer for DirectoryInstaller {
    fn planned_files(&self, module: &CkanModule, _instance: &GameInstance) -> Result<Vec<String>> {
        Ok(self
            .staged_files(module)?
            .into_iter()
            .map(|(_, relative)| relative)
            .collect())
    }

    fn install(&mut self, module: &CkanModule, instance: &GameInstance) -> Result<Vec<String>> {
        let mut written = Vec::new();
        for (source, relative) in self.staged_files(module)? {
            self.check_cancelled(module)?;

            let target = instance.to_absolute(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &target)?;
            written.push(relative);
        }
        debug!("Copied {} files for {}", written.len(), module);
        Ok(written)
    }

    fn remove_files(&mut self, files: &[String], instance: &GameInstance) -> Result<()> {
        let mut parents = BTreeSet::new();
        for file in files {
            let path = instance.to_absolute(file);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
            let mut dir = path.parent();
            while let Some(d) = dir {
                if d == instance.root || d == instance.game_data() {
                    break;
                }
                parents.insert(d.to_path_buf());
                dir = d.parent();
            }
        }

        // Deepest first so children go before their parents
        let mut parents: Vec<PathBuf> = parents.into_iter().collect();
        parents.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for dir in parents {
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                fs::remove_dir(&dir)?;
            }
        }
        Ok(())
    }
}

/// Applies resolutions and removals to a game instance.
pub struct ModuleInstaller<'a, I: Installer> {
    installer: I,
    instance: &'a GameInstance,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
    overwrite_unowned: bool,
}

impl<'a, I: Installer> ModuleInstaller<'a, I> {
    pub fn new(installer: I, instance: &'a GameInstance) -> Self {
        Self {
            installer,
            instance,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
            overwrite_unowned: true,
        }
    }

    /// Whether files already on disk that no module owns may be replaced.
    /// When refused, such a file cancels the install before anything is written.
    pub fn with_overwrite_unowned(mut self, allow: bool) -> Self {
        self.overwrite_unowned = allow;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Setting this flag stops the installer before the next module.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn into_inner(self) -> I {
        self.installer
    }

    fn report(&self, message: &str, current: u64, total: u64) {
        if let Some(ref cb) = self.progress {
            cb(message, current, total);
        }
    }

    fn check_cancelled(&self, action: String) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(Kraken::CancelledAction(action).into());
        }
        Ok(())
    }

    /// Install every module of `resolution`, dependencies first.
    ///
    /// Returns the identifiers installed. Modules finished before an error
    /// stay registered.
    pub fn install(
        &mut self,
        resolution: &Resolution,
        session: &RegistrySession,
    ) -> Result<Vec<String>> {
        let total = resolution.len() as u64;
        let mut installed = Vec::new();

        for (i, module) in resolution.modules().iter().enumerate() {
            self.check_cancelled(format!("installing {}", module))?;
            self.report(&format!("Installing {}...", module), i as u64, total);

            let snapshot = session.snapshot();

            // Ownership is checked before anything is written
            for file in self.installer.planned_files(module, self.instance)? {
                let relative = self.instance.to_relative(&file)?;
                match snapshot.file_owner(&relative) {
                    Some(owner) if owner != module.identifier => {
                        return Err(Kraken::FileExists {
                            path: relative,
                            owner: owner.to_string(),
                            installing: module.identifier.clone(),
                        }
                        .into());
                    }
                    Some(_) => {}
                    None if self.instance.to_absolute(&relative).exists() => {
                        if !self.overwrite_unowned {
                            return Err(Kraken::CancelledAction(format!(
                                "{} would overwrite {}, which no module owns",
                                module, relative
                            ))
                            .into());
                        }
                        warn!("{} overwrites unowned file {}", module, relative);
                    }
                    None => {}
                }
            }

            let previous = snapshot.installed_module(&module.identifier);
            if let Some(previous) = previous {
                debug!("Removing files of {} before installing {}", previous.source_module, module);
                let old_files: Vec<String> = previous.files.iter().cloned().collect();
                self.installer.remove_files(&old_files, self.instance)?;
            }

            let files = self.installer.install(module, self.instance)?;

            let requested = matches!(
                resolution.reason(&module.identifier),
                Some(SelectionReason::UserRequested)
            );
            // Something the user once asked for stays user-installed
            let auto_installed = !requested && previous.map_or(true, |p| p.auto_installed);

            session.try_write(|registry| {
                registry.register_module(module, &files, self.instance, auto_installed)
            })?;

            info!("Installed {}", module);
            installed.push(module.identifier.clone());
        }

        self.report("Installation complete", total, total);
        Ok(installed)
    }

    /// Remove `identifiers` and every installed module depending on them.
    ///
    /// Returns the identifiers removed.
    pub fn uninstall(
        &mut self,
        identifiers: &[String],
        session: &RegistrySession,
    ) -> Result<Vec<String>> {
        let snapshot = session.snapshot();

        for identifier in identifiers {
            if snapshot.installed_module(identifier).is_none() {
                if snapshot.is_installed(identifier, false) {
                    return Err(Error::Other(format!(
                        "{} was autodetected and cannot be removed by ckan",
                        identifier
                    )));
                }
                return Err(Kraken::not_found(identifier.as_str()).into());
            }
        }

        let to_remove = snapshot.find_reverse_dependencies(identifiers);
        let total = to_remove.len() as u64;
        let mut removed = Vec::new();

        for (i, identifier) in to_remove.iter().enumerate() {
            let Some(installed) = snapshot.installed_module(identifier) else {
                continue;
            };
            self.check_cancelled(format!("removing {}", identifier))?;
            self.report(&format!("Removing {}...", installed.source_module), i as u64, total);

            let files: Vec<String> = installed.files.iter().cloned().collect();
            self.installer.remove_files(&files, self.instance)?;
            session.write(|registry| registry.deregister_module(identifier));

            info!("Removed {}", installed.source_module);
            removed.push(identifier.clone());
        }

        self.report("Removal complete", total, total);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameVersion, Registry, RelationshipDescriptor};
    use crate::resolver::resolve;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    fn stage(staging: &Path, module: &CkanModule, files: &[&str]) {
        let dir = staging.join(format!("{}-{}", module.identifier, module.version));
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("{} from {}", file, module)).unwrap();
        }
    }

    struct Fixture {
        _temp: TempDir,
        staging: PathBuf,
        instance: GameInstance,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        let root = temp.path().join("game");
        fs::create_dir_all(root.join("GameData")).unwrap();
        let instance = GameInstance::new("test", root, GameVersion::Any);
        Fixture {
            _temp: temp,
            staging,
            instance,
        }
    }

    fn session_with(modules: Vec<CkanModule>) -> RegistrySession {
        let mut registry = Registry::empty();
        registry.set_available(modules);
        RegistrySession::new(registry)
    }

    // ============================================================================
    // DirectoryInstaller tests
    // ============================================================================

    #[test]
    fn test_directory_installer_copies_staged_files() {
        let fx = fixture();
        let module = CkanModule::new("A", "1.0");
        stage(&fx.staging, &module, &["GameData/A/A.dll", "GameData/A/A.cfg"]);

        let mut installer = DirectoryInstaller::new(&fx.staging);
        let files = installer.install(&module, &fx.instance).unwrap();

        assert_eq!(files, vec!["GameData/A/A.cfg", "GameData/A/A.dll"]);
        assert!(fx.instance.root.join("GameData/A/A.dll").exists());
    }

    #[test]
    fn test_directory_installer_missing_staging_dir() {
        let fx = fixture();
        let installer = DirectoryInstaller::new(&fx.staging);
        let err = installer
            .planned_files(&CkanModule::new("A", "1.0"), &fx.instance)
            .unwrap_err();
        assert!(err.to_string().contains("not in the download cache"));
    }

    #[test]
    fn test_remove_files_cleans_empty_directories() {
        let fx = fixture();
        let module = CkanModule::new("A", "1.0");
        stage(&fx.staging, &module, &["GameData/A/Plugins/A.dll"]);

        let mut installer = DirectoryInstaller::new(&fx.staging);
        let files = installer.install(&module, &fx.instance).unwrap();
        installer.remove_files(&files, &fx.instance).unwrap();

        assert!(!fx.instance.root.join("GameData/A").exists());
        assert!(fx.instance.game_data().exists());
    }

    // ============================================================================
    // ModuleInstaller tests
    // ============================================================================

    #[test]
    fn test_install_resolution_registers_modules() {
        let fx = fixture();
        let mut a = CkanModule::new("A", "1.0");
        a.depends.push(RelationshipDescriptor::new("B"));
        let b = CkanModule::new("B", "1.0");
        stage(&fx.staging, &a, &["GameData/A/A.dll"]);
        stage(&fx.staging, &b, &["GameData/B/B.dll"]);

        let session = session_with(vec![a, b]);
        let resolution = session
            .resolve(&["A"], Default::default(), GameVersion::Any)
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let progress: ProgressCallback = Arc::new(move |_msg, _current, _total| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance)
            .with_progress(progress);
        let installed = installer.install(&resolution, &session).unwrap();

        assert_eq!(installed, vec!["B", "A"]);
        let registry = session.snapshot();
        assert_eq!(registry.file_owner("GameData/B/B.dll"), Some("B"));
        assert!(!registry.installed_module("A").unwrap().auto_installed);
        assert!(registry.installed_module("B").unwrap().auto_installed);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_file_owned_by_other_module_is_rejected_before_writing() {
        let fx = fixture();
        let a = CkanModule::new("A", "1.0");
        let b = CkanModule::new("B", "1.0");
        stage(&fx.staging, &a, &["GameData/shared.cfg"]);
        stage(&fx.staging, &b, &["GameData/B/B.dll", "GameData/shared.cfg"]);

        let session = session_with(vec![a, b]);
        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance);

        let first = session.resolve(&["A"], Default::default(), GameVersion::Any).unwrap();
        installer.install(&first, &session).unwrap();

        let second = session.resolve(&["B"], Default::default(), GameVersion::Any).unwrap();
        let err = installer.install(&second, &session).unwrap_err();

        assert!(matches!(err.as_kraken(), Some(Kraken::FileExists { owner, .. }) if owner == "A"));
        assert!(!fx.instance.root.join("GameData/B/B.dll").exists());
        assert!(!session.snapshot().is_installed("B", false));
    }

    #[test]
    fn test_unowned_file_overwritten_by_default() {
        let fx = fixture();
        let a = CkanModule::new("A", "1.0");
        stage(&fx.staging, &a, &["GameData/A/A.cfg"]);
        fs::create_dir_all(fx.instance.root.join("GameData/A")).unwrap();
        fs::write(fx.instance.root.join("GameData/A/A.cfg"), "hand copied").unwrap();

        let session = session_with(vec![a]);
        let resolution = session.resolve(&["A"], Default::default(), GameVersion::Any).unwrap();
        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance);
        installer.install(&resolution, &session).unwrap();

        let content = fs::read_to_string(fx.instance.root.join("GameData/A/A.cfg")).unwrap();
        assert_eq!(content, "GameData/A/A.cfg from A 1.0");
        assert_eq!(session.snapshot().file_owner("GameData/A/A.cfg"), Some("A"));
    }

    #[test]
    fn test_unowned_file_refused_leaves_disk_untouched() {
        let fx = fixture();
        let a = CkanModule::new("A", "1.0");
        stage(&fx.staging, &a, &["GameData/A/A.cfg", "GameData/A/A.dll"]);
        fs::create_dir_all(fx.instance.root.join("GameData/A")).unwrap();
        fs::write(fx.instance.root.join("GameData/A/A.dll"), "hand copied").unwrap();

        let session = session_with(vec![a]);
        let resolution = session.resolve(&["A"], Default::default(), GameVersion::Any).unwrap();
        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance)
            .with_overwrite_unowned(false);
        let err = installer.install(&resolution, &session).unwrap_err();

        assert!(matches!(err.as_kraken(), Some(Kraken::CancelledAction(_))));
        assert!(!fx.instance.root.join("GameData/A/A.cfg").exists());
        let content = fs::read_to_string(fx.instance.root.join("GameData/A/A.dll")).unwrap();
        assert_eq!(content, "hand copied");
        assert!(!session.snapshot().is_installed("A", false));
    }

    #[test]
    fn test_cancelled_install_stops_before_next_module() {
        let fx = fixture();
        let a = CkanModule::new("A", "1.0");
        stage(&fx.staging, &a, &["GameData/A/A.dll"]);
        let session = session_with(vec![a]);
        let resolution = session.resolve(&["A"], Default::default(), GameVersion::Any).unwrap();

        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance);
        installer.cancel_flag().store(true, Ordering::SeqCst);

        let err = installer.install(&resolution, &session).unwrap_err();
        assert!(matches!(err.as_kraken(), Some(Kraken::CancelledAction(_))));
        assert!(!session.snapshot().is_installed("A", false));
    }

    #[test]
    fn test_upgrade_replaces_old_files() {
        let fx = fixture();
        let old = CkanModule::new("A", "1.0");
        let new = CkanModule::new("A", "2.0");
        stage(&fx.staging, &old, &["GameData/A/old.cfg", "GameData/A/A.dll"]);
        stage(&fx.staging, &new, &["GameData/A/A.dll"]);

        let session = session_with(vec![old, new]);
        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance);

        let first = session.resolve(&["A=1.0"], Default::default(), GameVersion::Any).unwrap();
        installer.install(&first, &session).unwrap();
        let upgrade = session.resolve(&["A"], Default::default(), GameVersion::Any).unwrap();
        installer.install(&upgrade, &session).unwrap();

        assert!(!fx.instance.root.join("GameData/A/old.cfg").exists());
        let registry = session.snapshot();
        assert_eq!(registry.installed_module("A").unwrap().version().to_string(), "2.0");
        assert_eq!(registry.file_owner("GameData/A/old.cfg"), None);
    }

    #[test]
    fn test_uninstall_removes_reverse_dependencies() {
        let fx = fixture();
        let mut a = CkanModule::new("A", "1.0");
        a.depends.push(RelationshipDescriptor::new("B"));
        let b = CkanModule::new("B", "1.0");
        stage(&fx.staging, &a, &["GameData/A/A.dll"]);
        stage(&fx.staging, &b, &["GameData/B/B.dll"]);

        let session = session_with(vec![a, b]);
        let resolution = resolve(&["A"], Default::default(), &session.snapshot(), GameVersion::Any).unwrap();
        let mut installer = ModuleInstaller::new(DirectoryInstaller::new(&fx.staging), &fx.instance);
        installer.install(&resolution, &session).unwrap();

        let removed = installer.uninstall(&["B".to_string()], &session).unwrap();
        assert_eq!(removed, vec!["A", "B"]);
        assert!(!fx.instance.root.join("GameData/A").exists());
        assert_eq!(session.snapshot().installed_modules().count(), 0);

        let err = installer.uninstall(&["B".to_string()], &session).unwrap_err();
        assert!(matches!(err.as_kraken(), Some(Kraken::ModuleNotFound { .. })));
    }
}
