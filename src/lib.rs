//! ckan - Relationship resolver and module registry for game mods
//!
//! ckan keeps track of which mods are available for a game, which are
//! installed and which files each one owns. Its core is the relationship
//! resolver, which turns a request like "install Kopernicus" into a
//! consistent, dependency-ordered change set:
//!
//! - Breadth-first resolution of `depends`, then `recommends`, then `suggests`
//! - Virtual packages through `provides`, with ambiguity reported rather than guessed
//! - Conflict detection against the plan and the installed set
//! - File ownership tracking so no mod overwrites another's files
//! - Game version compatibility filtering
//!
//! # Examples
//!
//! ```no_run
//! use ckan::{catalog, GameInstance, GameVersion, RegistryManager, RelationshipResolverOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let instance = GameInstance::new("main", "/games/ksp", GameVersion::parse("1.12.5")?);
//! let manager = RegistryManager::open(instance.clone())?;
//!
//! // Refresh the catalog
//! manager
//!     .session()
//!     .try_write(|registry| catalog::refresh(registry, "/var/lib/ckan/catalog".as_ref()))?;
//!
//! // Resolve an install
//! let resolution = manager.session().resolve(
//!     &["Kopernicus"],
//!     RelationshipResolverOptions::default(),
//!     instance.version,
//! )?;
//! for module in resolution.modules() {
//!     println!("{} ({:?})", module, resolution.reason(&module.identifier));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`version`] - Module version ordering
//! - [`game_version`] - Game versions and compatibility targets
//! - [`module`] - Module metadata and relationship descriptors
//! - [`registry`] - Available and installed modules, file ownership
//! - [`resolver`] - Relationship resolution
//! - [`sanity`] - Consistency checks over module sets
//! - [`session`] - Snapshot readers and a single writer over a registry
//! - [`registry_manager`] - Registry persistence
//! - [`catalog`] - Loading `.ckan` metadata files
//! - [`installer`] - Installing and removing modules
//! - [`config`] - User configuration management
//! - [`error`] - Error types and result handling

pub mod catalog;
pub mod config;
pub mod error;
pub mod game_instance;
pub mod game_version;
pub mod installer;
pub mod logging;
pub mod module;
pub mod registry;
pub mod registry_manager;
pub mod resolver;
pub mod sanity;
pub mod session;
pub mod version;

pub use config::Config;
pub use error::{Error, Kraken, KrakenResult, Result};
pub use game_instance::GameInstance;
pub use game_version::GameVersion;
pub use installer::{DirectoryInstaller, Installer, ModuleInstaller, ProgressCallback};
pub use module::{CkanModule, ModuleKind, RelationshipDescriptor, ReleaseStatus};
pub use registry::{AvailableModule, InstalledModule, Registry};
pub use registry_manager::RegistryManager;
pub use resolver::{
    resolve, RelationshipResolver, RelationshipResolverOptions, Resolution, SelectionReason,
    SoftRelationship,
};
pub use sanity::{SanityChecker, Violation};
pub use session::RegistrySession;
pub use version::{ModuleVersion, Version};
