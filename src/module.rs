//! Module metadata as published in the catalog
//!
//! A [`CkanModule`] describes one release of one mod. Releases are immutable
//! once loaded; the registry keeps every version it has seen side by side.
//!
//! # Examples
//!
//! ```
//! use ckan::{CkanModule, GameVersion};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let module = CkanModule::from_json(r#"{
//!     "identifier": "ModuleManager",
//!     "version": "4.2.3",
//!     "ksp_version_min": "1.8",
//!     "provides": ["ModuleManagerAPI"]
//! }"#)?;
//!
//! assert!(module.is_compatible(&GameVersion::parse("1.12.5")?));
//! assert_eq!(module.provides_list(), vec!["ModuleManager", "ModuleManagerAPI"]);
//! # Ok(())
//! # }
//! ```

use crate::error::{Kraken, KrakenResult};
use crate::{GameVersion, ModuleVersion, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// A reference from one module to another, with optional version bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub name: String,
    /// Exact version required. Cannot be mixed with min/max.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ModuleVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<ModuleVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<ModuleVersion>,
}

impl RelationshipDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            min_version: None,
            max_version: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(ModuleVersion::new(version));
        self
    }

    pub fn with_min_version(mut self, version: &str) -> Self {
        self.min_version = Some(ModuleVersion::new(version));
        self
    }

    pub fn with_max_version(mut self, version: &str) -> Self {
        self.max_version = Some(ModuleVersion::new(version));
        self
    }

    pub fn has_bounds(&self) -> bool {
        self.version.is_some() || self.min_version.is_some() || self.max_version.is_some()
    }

    pub fn version_within_bounds(&self, version: &ModuleVersion) -> bool {
        if let Some(exact) = &self.version {
            return exact == version;
        }
        if let Some(min) = &self.min_version {
            if version < min {
                return false;
            }
        }
        if let Some(max) = &self.max_version {
            if version > max {
                return false;
            }
        }
        true
    }

    /// True if `module` is what this descriptor names, either directly
    /// (bounds honoured) or through its provides list.
    pub fn matches(&self, module: &CkanModule) -> bool {
        if module.identifier == self.name {
            return self.version_within_bounds(&module.version);
        }
        module.provides.iter().any(|p| p == &self.name)
    }

    /// Check the descriptor is well formed. `owner` is the module declaring it.
    pub fn validate(&self, owner: &str) -> KrakenResult<()> {
        if self.name.trim().is_empty() {
            return Err(Kraken::bad_metadata(owner, "relationship with an empty name"));
        }

        for bound in [&self.version, &self.min_version, &self.max_version]
            .into_iter()
            .flatten()
        {
            if bound.is_empty() {
                return Err(Kraken::bad_metadata(
                    owner,
                    format!("empty version bound on relationship to {}", self.name),
                ));
            }
        }

        if self.version.is_some() && (self.min_version.is_some() || self.max_version.is_some()) {
            return Err(Kraken::bad_metadata(
                owner,
                format!(
                    "relationship to {} mixes version with min_version/max_version",
                    self.name
                ),
            ));
        }

        if let (Some(min), Some(max)) = (&self.min_version, &self.max_version) {
            if min > max {
                return Err(Kraken::bad_metadata(
                    owner,
                    format!(
                        "relationship to {} has min_version {} above max_version {}",
                        self.name, min, max
                    ),
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Display for RelationshipDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(v) = &self.version {
            write!(f, " {}", v)?;
        }
        if let Some(v) = &self.min_version {
            write!(f, " >= {}", v)?;
        }
        if let Some(v) = &self.max_version {
            write!(f, " <= {}", v)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    #[default]
    Stable,
    Testing,
    Development,
}

/// What a catalog entry represents
///
/// - `Package`: a normal installable module with files
/// - `Metapackage`: only relationships, nothing to download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    Package,
    Metapackage,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// One release of one mod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CkanModule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    pub identifier: String,
    pub version: ModuleVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub author: Vec<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub license: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
    #[serde(default)]
    pub release_status: ReleaseStatus,
    #[serde(default)]
    pub kind: ModuleKind,
    #[serde(default, skip_serializing_if = "GameVersion::is_any")]
    pub ksp_version: GameVersion,
    #[serde(default, skip_serializing_if = "GameVersion::is_any")]
    pub ksp_version_min: GameVersion,
    #[serde(default, skip_serializing_if = "GameVersion::is_any")]
    pub ksp_version_max: GameVersion,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommends: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggests: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    /// Install instructions, passed through to the installer untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<serde_json::Value>,
}

impl CkanModule {
    /// A bare module with no relationships, compatible with every game version.
    pub fn new(identifier: impl Into<String>, version: &str) -> Self {
        Self {
            spec_version: None,
            identifier: identifier.into(),
            version: ModuleVersion::new(version),
            name: None,
            abstract_: None,
            description: None,
            author: Vec::new(),
            license: Vec::new(),
            download: None,
            release_status: ReleaseStatus::Stable,
            kind: ModuleKind::Package,
            ksp_version: GameVersion::Any,
            ksp_version_min: GameVersion::Any,
            ksp_version_max: GameVersion::Any,
            depends: Vec::new(),
            recommends: Vec::new(),
            suggests: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            install: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let module: CkanModule = serde_json::from_str(json)?;
        module.validate()?;
        Ok(module)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Human readable name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }

    /// Standardised archive name, e.g. `RealSolarSystem-7.3.zip`
    pub fn standard_name(&self) -> String {
        format!("{}-{}.zip", self.identifier, self.version)
    }

    /// The identifier followed by everything this module provides.
    pub fn provides_list(&self) -> Vec<&str> {
        std::iter::once(self.identifier.as_str())
            .chain(self.provides.iter().map(String::as_str))
            .collect()
    }

    pub fn is_metapackage(&self) -> bool {
        self.kind == ModuleKind::Metapackage
    }

    /// True if this module runs on the given game version.
    pub fn is_compatible(&self, game_version: &GameVersion) -> bool {
        if game_version.is_any() {
            return true;
        }

        if !self.ksp_version_min.is_any()
            && game_version.compare_release(&self.ksp_version_min) == Some(Ordering::Less)
        {
            return false;
        }

        if let (Some(max), Some(actual)) =
            (self.ksp_version_max.upper_bound(), game_version.lower_bound())
        {
            if actual > max {
                return false;
            }
        }

        self.ksp_version.targets(game_version)
    }

    /// True if either module declares a conflict with the other.
    pub fn conflicts_with(&self, other: &CkanModule) -> bool {
        self.identifier != other.identifier
            && (Self::uni_conflicts(self, other) || Self::uni_conflicts(other, self))
    }

    fn uni_conflicts(module: &CkanModule, other: &CkanModule) -> bool {
        module.conflicts.iter().any(|c| c.matches(other))
    }

    /// Reject metadata the resolver cannot reason about.
    pub fn validate(&self) -> KrakenResult<()> {
        if self.identifier.trim().is_empty() {
            return Err(Kraken::bad_metadata("<unnamed>", "module has no identifier"));
        }
        if self.version.is_empty() {
            return Err(Kraken::bad_metadata(&self.identifier, "module has no version"));
        }

        if !self.ksp_version.is_any()
            && (!self.ksp_version_min.is_any() || !self.ksp_version_max.is_any())
        {
            return Err(Kraken::bad_metadata(
                &self.identifier,
                "ksp_version mixed with ksp_version_min/ksp_version_max",
            ));
        }

        if self.ksp_version_min.compare_release(&self.ksp_version_max) == Some(Ordering::Greater)
        {
            return Err(Kraken::bad_metadata(
                &self.identifier,
                format!(
                    "ksp_version_min {} is above ksp_version_max {}",
                    self.ksp_version_min, self.ksp_version_max
                ),
            ));
        }

        for (stanza, relationships) in [
            ("depends", &self.depends),
            ("recommends", &self.recommends),
            ("suggests", &self.suggests),
        ] {
            for rel in relationships {
                rel.validate(&self.identifier)?;
                if rel.name == self.identifier {
                    return Err(Kraken::bad_metadata(
                        &self.identifier,
                        format!("module {} itself", stanza),
                    ));
                }
            }
        }

        for rel in &self.conflicts {
            rel.validate(&self.identifier)?;
        }

        Ok(())
    }
}

impl PartialEq for CkanModule {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier && self.version == other.version
    }
}

impl Eq for CkanModule {}

impl Hash for CkanModule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for CkanModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.identifier, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gv(s: &str) -> GameVersion {
        GameVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_metadata() {
        let json = r#"{
            "spec_version": "v1.4",
            "identifier": "DogeCoinFlag",
            "version": "1.01",
            "name": "Dogecoin Flag",
            "abstract": "Such flag. Very currency.",
            "author": "pjf",
            "license": ["CC-BY", "MIT"],
            "download": "https://example.com/DogeCoinFlag-1.01.zip",
            "ksp_version": "0.25",
            "depends": [ { "name": "ModuleManager", "min_version": "2.5.1" } ],
            "conflicts": [ { "name": "OtherFlag" } ],
            "install": [ { "file": "DogeCoinFlag-1.01/GameData", "install_to": "GameData" } ]
        }"#;

        let module = CkanModule::from_json(json).unwrap();
        assert_eq!(module.identifier, "DogeCoinFlag");
        assert_eq!(module.author, vec!["pjf"]);
        assert_eq!(module.license, vec!["CC-BY", "MIT"]);
        assert_eq!(module.abstract_.as_deref(), Some("Such flag. Very currency."));
        assert_eq!(module.depends[0].min_version, Some(ModuleVersion::new("2.5.1")));
        assert!(module.install.is_some());
        assert_eq!(module.standard_name(), "DogeCoinFlag-1.01.zip");
    }

    #[test]
    fn test_compatibility_with_short_target() {
        let mut module = CkanModule::new("Flag", "1.0");
        module.ksp_version = gv("0.25");
        assert!(module.is_compatible(&gv("0.25.0")));
        assert!(module.is_compatible(&gv("0.25.3")));
        assert!(!module.is_compatible(&gv("0.24.2")));
    }

    #[test]
    fn test_compatibility_with_min_and_max() {
        let mut module = CkanModule::new("Scatterer", "0.0772");
        module.ksp_version_min = gv("1.8");
        module.ksp_version_max = gv("1.10");
        assert!(module.is_compatible(&gv("1.8.0")));
        assert!(module.is_compatible(&gv("1.10.1")));
        assert!(!module.is_compatible(&gv("1.7.3")));
        assert!(!module.is_compatible(&gv("1.11.0")));
    }

    #[test]
    fn test_any_game_version_accepts_everything() {
        let mut module = CkanModule::new("Old", "1.0");
        module.ksp_version = gv("0.23.5");
        assert!(module.is_compatible(&GameVersion::Any));
    }

    #[test]
    fn test_mixed_game_version_fields_are_bad_metadata() {
        let json = r#"{
            "identifier": "Mixed",
            "version": "1.0",
            "ksp_version": "1.12",
            "ksp_version_max": "1.12"
        }"#;
        let err = CkanModule::from_json(json).unwrap_err();
        assert!(matches!(err.as_kraken(), Some(Kraken::BadMetadata { .. })));
    }

    #[test]
    fn test_self_dependency_is_bad_metadata() {
        let mut module = CkanModule::new("Loop", "1.0");
        module.depends.push(RelationshipDescriptor::new("Loop"));
        assert!(matches!(
            module.validate(),
            Err(Kraken::BadMetadata { identifier, .. }) if identifier == "Loop"
        ));
    }

    #[test]
    fn test_inverted_bounds_are_bad_metadata() {
        let rel = RelationshipDescriptor::new("B")
            .with_min_version("2.0")
            .with_max_version("1.0");
        assert!(rel.validate("A").is_err());

        let rel = RelationshipDescriptor::new("B")
            .with_version("1.0")
            .with_min_version("0.5");
        assert!(rel.validate("A").is_err());
    }

    #[test]
    fn test_conflicts_are_symmetric_and_honour_bounds() {
        let mut a = CkanModule::new("A", "1.0");
        a.conflicts
            .push(RelationshipDescriptor::new("B").with_max_version("1.5"));
        let b_old = CkanModule::new("B", "1.0");
        let b_new = CkanModule::new("B", "2.0");

        assert!(a.conflicts_with(&b_old));
        assert!(b_old.conflicts_with(&a));
        assert!(!a.conflicts_with(&b_new));
    }

    #[test]
    fn test_conflict_through_provides() {
        let mut a = CkanModule::new("A", "1.0");
        a.conflicts.push(RelationshipDescriptor::new("Virtual"));
        let mut b = CkanModule::new("B", "1.0");
        b.provides.push("Virtual".to_string());
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn test_module_does_not_conflict_with_itself() {
        let mut a = CkanModule::new("A", "1.0");
        a.provides.push("Virtual".to_string());
        a.conflicts.push(RelationshipDescriptor::new("Virtual"));
        assert!(!a.conflicts_with(&a.clone()));
    }

    #[test]
    fn test_descriptor_display() {
        let rel = RelationshipDescriptor::new("B")
            .with_min_version("1.0")
            .with_max_version("2.0");
        assert_eq!(rel.to_string(), "B >= 1.0 <= 2.0");
    }
}
