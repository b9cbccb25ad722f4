use super::Context;
use anyhow::Result;
use ckan::{CkanModule, Kraken, RelationshipDescriptor};

pub fn run(instance: Option<String>, identifier: String) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let registry = ctx.manager.session().snapshot();
    let game_version = ctx.instance.version;

    let installed = registry.installed_module(&identifier);
    let module = match installed {
        Some(installed) => installed.source_module.clone(),
        None => match registry.latest_available(&identifier, &game_version) {
            Ok(Some(module)) => module.clone(),
            Ok(None) => registry
                .available_module(&identifier)
                .and_then(|m| m.newest())
                .cloned()
                .ok_or_else(|| Kraken::not_found(identifier.as_str()))?,
            Err(e) => {
                if registry.is_installed(&identifier, true) {
                    let version = registry
                        .installed_version(&identifier, true)
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    println!("{}: {}", identifier, version);
                    return Ok(());
                }
                return Err(e.into());
            }
        },
    };

    println!("{}: {}", module.display_name(), module.abstract_.as_deref().unwrap_or(""));
    println!();
    println!("  Identifier: {}", module.identifier);
    println!("  Version:    {}", module.version);
    if !module.author.is_empty() {
        println!("  Authors:    {}", module.author.join(", "));
    }
    if !module.license.is_empty() {
        println!("  License:    {}", module.license.join(", "));
    }
    println!("  Status:     {:?}", module.release_status);
    println!("  Game:       {}", compatibility(&module));
    if !module.is_compatible(&game_version) {
        println!("              ⚠ not compatible with {}", game_version);
    }

    print_relationships("Depends", &module.depends);
    print_relationships("Recommends", &module.recommends);
    print_relationships("Suggests", &module.suggests);
    print_relationships("Conflicts", &module.conflicts);

    if !module.provides.is_empty() {
        println!();
        println!("  Provides:");
        for name in &module.provides {
            println!("    - {}", name);
        }
    }

    if let Some(description) = &module.description {
        println!();
        println!("  {}", description);
    }

    if let Some(installed) = installed {
        println!();
        println!(
            "  Installed {} on {}{}",
            installed.version(),
            installed.install_time.format("%Y-%m-%d %H:%M"),
            if installed.auto_installed {
                " (as a dependency)"
            } else {
                ""
            }
        );
        println!("  Files:");
        for file in &installed.files {
            println!("    {}", file);
        }
    }

    Ok(())
}

fn compatibility(module: &CkanModule) -> String {
    if !module.ksp_version.is_any() {
        return module.ksp_version.to_string();
    }
    match (
        module.ksp_version_min.is_any(),
        module.ksp_version_max.is_any(),
    ) {
        (true, true) => "any".to_string(),
        (false, true) => format!("{} and later", module.ksp_version_min),
        (true, false) => format!("up to {}", module.ksp_version_max),
        (false, false) => format!("{} – {}", module.ksp_version_min, module.ksp_version_max),
    }
}

fn print_relationships(title: &str, relationships: &[RelationshipDescriptor]) {
    if relationships.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    for rel in relationships {
        println!("    - {}", rel);
    }
}
