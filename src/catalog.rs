//! Loading module metadata from a directory of `.ckan` files

use crate::{CkanModule, Registry, Result};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const METADATA_EXTENSION: &str = "ckan";

/// Summary of a catalog load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// Read every `*.ckan` file below `dir`, in file-name order.
///
/// Files that fail to parse or validate are skipped with a warning, so one
/// bad record never hides the rest of the catalog.
pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<(Vec<CkanModule>, CatalogStats)> {
    let dir = dir.as_ref();
    let mut modules = Vec::new();
    let mut stats = CatalogStats::default();

    if !dir.exists() {
        warn!("Catalog directory {} does not exist", dir.display());
        return Ok((modules, stats));
    }

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();

        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION)
        {
            continue;
        }

        match CkanModule::from_file(path) {
            Ok(module) => {
                debug!("Loaded {} from {}", module, path.display());
                modules.push(module);
                stats.loaded += 1;
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                stats.skipped += 1;
            }
        }
    }

    Ok((modules, stats))
}

/// Replace the registry's catalog with the contents of `dir`.
pub fn refresh(registry: &mut Registry, dir: &Path) -> Result<CatalogStats> {
    let (modules, stats) = load_dir(dir)?;
    registry.set_available(modules);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_dir_reads_ckan_files_in_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "B/B-1.0.ckan", r#"{"identifier": "B", "version": "1.0"}"#);
        write(dir.path(), "A/A-1.0.ckan", r#"{"identifier": "A", "version": "1.0"}"#);
        write(dir.path(), "README.md", "not metadata");

        let (modules, stats) = load_dir(dir.path()).unwrap();
        let ids: Vec<&str> = modules.iter().map(|m| m.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(stats, CatalogStats { loaded: 2, skipped: 0 });
    }

    #[test]
    fn test_bad_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.ckan", r#"{"identifier": "Good", "version": "1.0"}"#);
        write(dir.path(), "broken.ckan", "{ nope");
        write(
            dir.path(),
            "self.ckan",
            r#"{"identifier": "Self", "version": "1.0", "depends": [{"name": "Self"}]}"#,
        );

        let (modules, stats) = load_dir(dir.path()).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn test_refresh_replaces_catalog() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ckan", r#"{"identifier": "A", "version": "1.0"}"#);

        let mut registry = Registry::empty();
        registry.add_available(CkanModule::new("Stale", "1.0"));

        let stats = refresh(&mut registry, dir.path()).unwrap();
        assert_eq!(stats.loaded, 1);
        assert!(registry.available_module("Stale").is_none());
        assert!(registry.available_module("A").is_some());
    }
}
