use super::{create_spinner_callback, plural, print_skipped_soft_relationships, resolve_interactive, Context};
use anyhow::Result;
use ckan::{DirectoryInstaller, ModuleInstaller, SelectionReason};

pub struct InstallArgs {
    pub modules: Vec<String>,
    pub no_recommends: bool,
    pub with_suggests: bool,
    pub with_all_suggests: bool,
    pub dry_run: bool,
}

pub fn run(instance: Option<String>, args: InstallArgs) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;

    let mut options = ctx.config.resolver.to_options();
    if args.no_recommends {
        options.with_recommends = false;
    }
    if args.with_suggests {
        options.with_suggests = true;
    }
    if args.with_all_suggests {
        options.with_all_suggests = true;
    }

    if args.dry_run {
        println!("[DRY RUN] Resolving {}...", args.modules.join(", "));
    } else {
        println!("Resolving {}...", args.modules.join(", "));
    }
    println!("  Instance: {} ({})", ctx.instance.name, ctx.instance.version);
    println!();

    let resolution = resolve_interactive(&ctx, args.modules, options)?;

    let snapshot = ctx.manager.session().snapshot();
    println!("Modules to install:");
    for module in resolution.modules() {
        let current = snapshot
            .installed_module(&module.identifier)
            .map(|m| format!(", replacing {}", m.version()))
            .unwrap_or_default();
        let reason = match resolution.reason(&module.identifier) {
            Some(SelectionReason::UserRequested) | None => String::new(),
            Some(reason) => format!(" ({})", reason),
        };
        println!("  {}{}{}", module, reason, current);
    }
    print_skipped_soft_relationships(&resolution);
    println!();

    if args.dry_run {
        println!(
            "[DRY RUN] Would install {} module{}",
            resolution.len(),
            plural(resolution.len())
        );
        return Ok(());
    }

    let installer = DirectoryInstaller::new(ctx.config.cache_path()?);
    let mut installer =
        ModuleInstaller::new(installer, &ctx.instance).with_progress(create_spinner_callback());

    let outcome = installer.install(&resolution, ctx.manager.session());

    // Whatever got installed before a failure is on disk, so record it
    ctx.manager.save()?;
    let installed = outcome?;

    println!();
    println!(
        "✓ Installed {} module{}",
        installed.len(),
        plural(installed.len())
    );
    Ok(())
}
