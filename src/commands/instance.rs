use anyhow::Result;
use ckan::{Config, GameVersion};
use std::path::PathBuf;

pub fn run_add(name: String, path: String, game_version: String) -> Result<()> {
    let game_version = GameVersion::parse(&game_version)?;
    let mut config = Config::load()?;

    let expanded = PathBuf::from(shellexpand::tilde(&path).to_string());
    if !expanded.join(ckan::game_instance::GAME_DATA_DIR).is_dir() {
        println!(
            "⚠ {} has no GameData directory; is this a game install?",
            expanded.display()
        );
    }

    config.add_instance(&name, PathBuf::from(path), game_version);
    config.save()?;

    println!("✓ Added instance '{}' ({})", name, game_version);
    if config.default_instance.as_deref() == Some(name.as_str()) {
        println!("  This is now the default instance.");
    }
    Ok(())
}

pub fn run_remove(name: String) -> Result<()> {
    let mut config = Config::load()?;
    if !config.remove_instance(&name) {
        anyhow::bail!("No instance named '{}'", name);
    }
    config.save()?;

    println!("✓ Removed instance '{}'", name);
    Ok(())
}

pub fn run_list() -> Result<()> {
    let config = Config::load()?;

    if config.instances.is_empty() {
        println!("No game instances configured.");
        println!();
        println!("Add one with: ckan instance add <name> <path> <game-version>");
        return Ok(());
    }

    let default = config.default_instance().map(|i| i.name.clone());
    println!("Game instances:");
    for inst in &config.instances {
        let marker = if default.as_deref() == Some(inst.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {} ({}) {}",
            marker,
            inst.name,
            inst.game_version,
            inst.path.display()
        );
    }
    Ok(())
}

pub fn run_default(name: String) -> Result<()> {
    let mut config = Config::load()?;
    if config.find_instance(&name).is_none() {
        anyhow::bail!("No instance named '{}'", name);
    }
    config.default_instance = Some(name.clone());
    config.save()?;

    println!("✓ Default instance is now '{}'", name);
    Ok(())
}
