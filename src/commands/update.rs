use super::{plural, Context};
use anyhow::Result;
use ckan::catalog;

pub fn run(instance: Option<String>) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let catalog_dir = ctx.config.catalog_path()?;

    println!("Loading catalog from {}...", catalog_dir.display());

    let stats = ctx
        .manager
        .session()
        .try_write(|registry| catalog::refresh(registry, &catalog_dir))?;
    ctx.manager.save()?;

    println!(
        "✓ Loaded {} module record{}",
        stats.loaded,
        plural(stats.loaded)
    );
    if stats.skipped > 0 {
        println!(
            "  ⚠ Skipped {} invalid file{} (run with --verbose for details)",
            stats.skipped,
            plural(stats.skipped)
        );
    }

    let registry = ctx.manager.session().snapshot();
    let updates: Vec<String> = registry
        .installed_modules()
        .filter(|m| registry.has_update(m.identifier(), &ctx.instance.version))
        .map(|m| m.identifier().to_string())
        .collect();

    if !updates.is_empty() {
        println!();
        println!("Updates available for: {}", updates.join(", "));
        println!("Run 'ckan upgrade --all' to install them.");
    }

    Ok(())
}
