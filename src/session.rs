//! Shared access to a registry
//!
//! A [`RegistrySession`] owns one registry. Any number of readers take
//! cheap immutable snapshots; writers get exclusive, copy-on-write access,
//! so a snapshot handed out earlier never changes underneath its holder.
//!
//! # Examples
//!
//! ```
//! use ckan::{CkanModule, Registry, RegistrySession};
//!
//! let session = RegistrySession::new(Registry::empty());
//! let before = session.snapshot();
//!
//! session.write(|registry| registry.add_available(CkanModule::new("A", "1.0")));
//!
//! assert!(before.available_module("A").is_none());
//! assert!(session.snapshot().available_module("A").is_some());
//! assert_eq!(session.generation(), 1);
//! ```

use crate::error::KrakenResult;
use crate::resolver::{self, RelationshipResolverOptions, Resolution};
use crate::{GameVersion, Registry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct RegistrySession {
    registry: RwLock<Arc<Registry>>,
    generation: AtomicU64,
}

impl RegistrySession {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            generation: AtomicU64::new(0),
        }
    }

    /// An immutable view of the registry as it is now.
    pub fn snapshot(&self) -> Arc<Registry> {
        let guard = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Mutate the registry with exclusive access.
    pub fn write<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(Arc::make_mut(&mut guard));
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Like [`write`](Self::write), but the change is only published when
    /// `f` succeeds. On error the registry is left exactly as it was.
    pub fn try_write<T, E>(
        &self,
        f: impl FnOnce(&mut Registry) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let mut working = Registry::clone(&guard);
        let result = f(&mut working)?;
        *guard = Arc::new(working);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    /// Number of writes applied since the session was created.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run the resolver against the current snapshot.
    pub fn resolve<S: AsRef<str>>(
        &self,
        requested: &[S],
        options: RelationshipResolverOptions,
        game_version: GameVersion,
    ) -> KrakenResult<Resolution> {
        let snapshot = self.snapshot();
        resolver::resolve(requested, options, &snapshot, game_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kraken;
    use crate::{CkanModule, GameInstance};
    use std::thread;

    #[test]
    fn test_failed_write_leaves_registry_untouched() {
        let instance = GameInstance::new("t", "/games/ksp", GameVersion::Any);
        let session = RegistrySession::new(Registry::empty());

        let result: Result<(), Kraken> = session.try_write(|registry| {
            registry.register_module(&CkanModule::new("A", "1.0"), &[], &instance, false)?;
            Err(Kraken::CancelledAction("stop".to_string()))
        });

        assert!(result.is_err());
        assert!(!session.snapshot().is_installed("A", false));
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn test_readers_on_other_threads_see_snapshots() {
        let session = Arc::new(RegistrySession::new(Registry::empty()));
        session.write(|registry| registry.add_available(CkanModule::new("A", "1.0")));

        let reader = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.snapshot().available_module("A").is_some())
        };
        assert!(reader.join().unwrap());
    }

    #[test]
    fn test_resolve_uses_current_state() {
        let session = RegistrySession::new(Registry::empty());
        assert!(session
            .resolve(&["A"], Default::default(), GameVersion::Any)
            .is_err());

        session.write(|registry| registry.add_available(CkanModule::new("A", "1.0")));
        let resolution = session
            .resolve(&["A"], Default::default(), GameVersion::Any)
            .unwrap();
        assert_eq!(resolution.identifiers(), vec!["A"]);
    }
}
