use super::{plural, Context};
use anyhow::Result;

pub fn run(instance: Option<String>) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let registry = ctx.manager.session().snapshot();
    let game_version = ctx.instance.version;

    let modules: Vec<_> = registry.installed_modules().collect();
    let dlls: Vec<_> = registry.installed_dlls().collect();

    if modules.is_empty() && dlls.is_empty() {
        println!("No modules installed.");
        println!();
        println!("Install modules with: ckan install <module>");
        return Ok(());
    }

    println!(
        "Installed modules ({} {}):",
        ctx.instance.name, ctx.instance.version
    );
    for installed in &modules {
        let mut flags = Vec::new();
        if installed.auto_installed {
            flags.push("auto".to_string());
        }
        if registry.has_update(installed.identifier(), &game_version) {
            if let Ok(Some(latest)) = registry.latest_available(installed.identifier(), &game_version) {
                flags.push(format!("update: {}", latest.version));
            }
        }

        if flags.is_empty() {
            println!("  {} {}", installed.identifier(), installed.version());
        } else {
            println!(
                "  {} {} ({})",
                installed.identifier(),
                installed.version(),
                flags.join(", ")
            );
        }
    }

    if !dlls.is_empty() {
        println!();
        println!("Autodetected:");
        for (name, path) in &dlls {
            println!("  {} ({})", name, path);
        }
    }

    println!();
    let total = modules.len() + dlls.len();
    println!("Total: {} module{}", total, plural(total));

    Ok(())
}
