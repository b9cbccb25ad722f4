use super::{create_spinner_callback, plural, resolve_interactive, Context};
use anyhow::Result;
use ckan::{DirectoryInstaller, Kraken, ModuleInstaller, RelationshipResolverOptions};
use std::collections::HashMap;

pub fn run(instance: Option<String>, modules: Vec<String>, all: bool, dry_run: bool) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let snapshot = ctx.manager.session().snapshot();
    let game_version = ctx.instance.version;

    if !all && modules.is_empty() {
        anyhow::bail!(
            "Nothing to upgrade\n\n\
             Hint: Name the modules to upgrade, or upgrade everything:\n\
                ckan upgrade --all"
        );
    }

    let candidates: Vec<String> = if all {
        snapshot
            .installed_modules()
            .map(|m| m.identifier().to_string())
            .collect()
    } else {
        for identifier in &modules {
            if snapshot.installed_module(identifier).is_none() {
                return Err(Kraken::not_found(identifier.as_str()).into());
            }
        }
        modules
    };

    let upgradable: Vec<String> = candidates
        .into_iter()
        .filter(|id| snapshot.has_update(id, &game_version))
        .collect();

    if upgradable.is_empty() {
        println!("✓ All modules are up to date");
        return Ok(());
    }

    // Hard dependencies only; an upgrade never pulls in new recommendations
    let resolution = resolve_interactive(
        &ctx,
        upgradable.clone(),
        RelationshipResolverOptions::dependencies_only(),
    )?;

    println!("Modules to upgrade:");
    for module in resolution.modules() {
        match snapshot.installed_module(&module.identifier) {
            Some(installed) => println!(
                "  {} {} → {}",
                module.identifier,
                installed.version(),
                module.version
            ),
            None => println!("  {} (new dependency)", module),
        }
    }
    println!();

    if dry_run {
        println!(
            "[DRY RUN] Would upgrade {} module{}",
            upgradable.len(),
            plural(upgradable.len())
        );
        return Ok(());
    }

    // Upgrading doesn't change whether the user asked for a module
    let auto_flags: HashMap<String, bool> = snapshot
        .installed_modules()
        .map(|m| (m.identifier().to_string(), m.auto_installed))
        .collect();

    let installer = DirectoryInstaller::new(ctx.config.cache_path()?);
    let mut installer =
        ModuleInstaller::new(installer, &ctx.instance).with_progress(create_spinner_callback());
    let outcome = installer.install(&resolution, ctx.manager.session());

    ctx.manager.session().write(|registry| {
        for (identifier, auto) in &auto_flags {
            registry.set_auto_installed(identifier, *auto);
        }
    });
    ctx.manager.save()?;
    let installed = outcome?;

    println!();
    println!(
        "✓ Upgraded {} module{}",
        installed.len(),
        plural(installed.len())
    );
    Ok(())
}
