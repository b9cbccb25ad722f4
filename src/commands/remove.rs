use super::{create_spinner_callback, plural, Context};
use anyhow::Result;
use ckan::{DirectoryInstaller, Kraken, ModuleInstaller};

pub fn run(instance: Option<String>, modules: Vec<String>, dry_run: bool) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let snapshot = ctx.manager.session().snapshot();

    for identifier in &modules {
        if snapshot.installed_module(identifier).is_none() {
            if snapshot.is_installed(identifier, false) {
                anyhow::bail!(
                    "{} was autodetected and is not managed by ckan\n\n\
                     Hint: Delete its files by hand, then run: ckan scan",
                    identifier
                );
            }
            return Err(Kraken::not_found(identifier.as_str()).into());
        }
    }

    let to_remove = snapshot.find_reverse_dependencies(&modules);
    let dependents: Vec<&String> = to_remove.iter().filter(|id| !modules.contains(*id)).collect();

    println!("Modules to remove:");
    for identifier in &to_remove {
        if let Some(installed) = snapshot.installed_module(identifier) {
            println!("  {}", installed.source_module);
        }
    }
    if !dependents.is_empty() {
        println!();
        println!(
            "  ⚠ {} depend{} on the modules being removed",
            dependents
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            if dependents.len() == 1 { "s" } else { "" }
        );
    }
    println!();

    if dry_run {
        println!(
            "[DRY RUN] Would remove {} module{}",
            to_remove.len(),
            plural(to_remove.len())
        );
        return Ok(());
    }

    let installer = DirectoryInstaller::new(ctx.config.cache_path()?);
    let mut installer =
        ModuleInstaller::new(installer, &ctx.instance).with_progress(create_spinner_callback());

    let outcome = installer.uninstall(&modules, ctx.manager.session());
    ctx.manager.save()?;
    let removed = outcome?;

    println!();
    println!("✓ Removed {} module{}", removed.len(), plural(removed.len()));
    Ok(())
}
