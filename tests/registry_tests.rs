//! Registry, session and persistence tests
//!
//! Covers installed-state bookkeeping through the public API:
//! - File ownership and atomic registration
//! - Reverse dependency closure for removals
//! - DLL autodetection
//! - Saving and reloading `registry.json`

mod test_utils;

use ckan::{
    GameInstance, Kraken, Registry, RegistryManager, RegistrySession, Version,
};
use std::fs;
use test_utils::{game_version, MockModule, TestEnv};

fn instance(env: &TestEnv) -> GameInstance {
    GameInstance::new("test", &env.game_root, game_version())
}

fn files(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

mod ownership {
    use super::*;

    #[test]
    fn test_registration_fails_atomically_on_owned_file() {
        let env = TestEnv::new();
        let inst = instance(&env);
        let a = MockModule::new("A", "1.0").build();
        let b = MockModule::new("B", "1.0").build();

        let mut registry = Registry::empty();
        registry
            .register_module(&a, &files(&["GameData/A/a.cfg"]), &inst, false)
            .unwrap();

        let err = registry
            .register_module(
                &b,
                &files(&["GameData/B/b.cfg", "GameData/A/a.cfg"]),
                &inst,
                false,
            )
            .unwrap_err();

        match err {
            Kraken::FileExists {
                path,
                owner,
                installing,
            } => {
                assert_eq!(path, "GameData/A/a.cfg");
                assert_eq!(owner, "A");
                assert_eq!(installing, "B");
            }
            other => panic!("expected FileExists, got {:?}", other),
        }

        assert!(!registry.is_installed("B", false));
        assert_eq!(registry.file_owner("GameData/B/b.cfg"), None);
        assert_eq!(registry.file_owner("GameData/A/a.cfg"), Some("A"));
    }

    #[test]
    fn test_absolute_paths_are_stored_relative() {
        let env = TestEnv::new();
        let inst = instance(&env);
        let a = MockModule::new("A", "1.0").build();
        let absolute = env.game_file("GameData/A/a.cfg").to_string_lossy().into_owned();

        let mut registry = Registry::empty();
        registry.register_module(&a, &[absolute], &inst, false).unwrap();

        assert_eq!(registry.file_owner("GameData/A/a.cfg"), Some("A"));
    }

    #[test]
    fn test_deregister_releases_files() {
        let env = TestEnv::new();
        let inst = instance(&env);
        let a = MockModule::new("A", "1.0").build();

        let mut registry = Registry::empty();
        registry
            .register_module(&a, &files(&["GameData/A/a.cfg"]), &inst, false)
            .unwrap();
        registry.deregister_module("A");

        assert!(!registry.is_installed("A", true));
        assert_eq!(registry.file_owner("GameData/A/a.cfg"), None);
    }
}

mod reverse_dependencies {
    use super::*;

    #[test]
    fn test_removal_closure_is_transitive() {
        let env = TestEnv::new();
        let inst = instance(&env);

        let mut registry = Registry::empty();
        for module in [
            MockModule::new("Lib", "1.0").build(),
            MockModule::new("Mid", "1.0").depends("Lib").build(),
            MockModule::new("Top", "1.0").depends("Mid").build(),
            MockModule::new("Other", "1.0").build(),
        ] {
            registry.register_module(&module, &[], &inst, false).unwrap();
        }

        let closure = registry.find_reverse_dependencies(&["Lib".to_string()]);
        let closure: Vec<&str> = closure.iter().map(String::as_str).collect();

        assert_eq!(closure, vec!["Lib", "Mid", "Top"]);
    }

    #[test]
    fn test_alternate_provider_keeps_dependent() {
        let env = TestEnv::new();
        let inst = instance(&env);

        let mut registry = Registry::empty();
        for module in [
            MockModule::new("P1", "1.0").provides("V").build(),
            MockModule::new("P2", "1.0").provides("V").build(),
            MockModule::new("User", "1.0").depends("V").build(),
        ] {
            registry.register_module(&module, &[], &inst, false).unwrap();
        }

        let closure = registry.find_reverse_dependencies(&["P1".to_string()]);

        assert_eq!(closure.len(), 1);
        assert!(closure.contains("P1"));
    }
}

mod dlls {
    use super::*;

    #[test]
    fn test_dll_is_autodetected_and_satisfies_dependency() {
        let env = TestEnv::new();
        let inst = instance(&env);
        let path = env
            .game_file("GameData/Foo/Plugins/ModuleManager.4.2.3.dll")
            .to_string_lossy()
            .into_owned();

        let mut registry = Registry::empty();
        let name = registry.register_dll(&inst, &path);

        assert_eq!(name.as_deref(), Some("ModuleManager"));
        assert_eq!(
            registry.installed_version("ModuleManager", false),
            Some(Version::Autodetected)
        );

        registry.add_available(MockModule::new("A", "1.0").depends("ModuleManager").build());
        let resolution = RegistrySession::new(registry)
            .resolve(&["A"], Default::default(), game_version())
            .unwrap();
        assert_eq!(resolution.identifiers(), vec!["A"]);
    }

    #[test]
    fn test_dll_outside_game_data_is_ignored() {
        let env = TestEnv::new();
        let inst = instance(&env);

        let mut registry = Registry::empty();
        assert_eq!(registry.register_dll(&inst, "Plugins/Foo.dll"), None);
        assert!(registry.installed_dll_names().is_empty());
    }
}

mod persistence {
    use super::*;

    #[test]
    fn test_save_and_reload() {
        let env = TestEnv::new();
        let inst = instance(&env);
        let a = MockModule::new("A", "1.0").summary("A mod").build();

        let manager = RegistryManager::open(inst.clone()).unwrap();
        manager.session().write(|registry| {
            registry.add_available(a.clone());
            registry
                .register_module(&a, &files(&["GameData/A/a.cfg"]), &inst, true)
                .unwrap();
        });
        manager.save().unwrap();
        assert!(env.registry_path().exists());

        let reopened = RegistryManager::open(inst).unwrap();
        let registry = reopened.session().snapshot();
        let installed = registry.installed_module("A").expect("A should be installed");
        assert!(installed.auto_installed);
        assert_eq!(registry.file_owner("GameData/A/a.cfg"), Some("A"));
        assert!(registry.available_module("A").is_some());
    }

    #[test]
    fn test_unsupported_registry_version_is_rejected() {
        let env = TestEnv::new();
        let path = env.registry_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"registry_version": 99}"#).unwrap();

        let err = RegistryManager::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("99"), "got {}", err);
    }

    #[test]
    fn test_missing_registry_is_empty() {
        let env = TestEnv::new();
        let manager = RegistryManager::open(instance(&env)).unwrap();

        let registry = manager.session().snapshot();
        assert_eq!(registry.installed_modules().count(), 0);
        assert!(registry.available_identifiers().next().is_none());
    }
}
