use super::{plural, Context};
use anyhow::Result;

pub fn run(instance: Option<String>) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let registry = ctx.manager.session().snapshot();
    let modules = registry.available(&ctx.instance.version);

    if modules.is_empty() {
        println!("No modules available for {}.", ctx.instance.version);
        println!();
        println!("Load the catalog with: ckan update");
        return Ok(());
    }

    println!("Modules compatible with {}:", ctx.instance.version);
    for module in &modules {
        match &module.abstract_ {
            Some(summary) => println!("  {} {} - {}", module.identifier, module.version, summary),
            None => println!("  {} {}", module.identifier, module.version),
        }
    }

    println!();
    println!("Total: {} module{}", modules.len(), plural(modules.len()));
    Ok(())
}
