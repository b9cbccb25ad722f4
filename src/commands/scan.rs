use super::{plural, Context};
use anyhow::Result;
use walkdir::WalkDir;

pub fn run(instance: Option<String>) -> Result<()> {
    let ctx = Context::open(instance.as_deref())?;
    let game_data = ctx.instance.game_data();

    if !game_data.is_dir() {
        anyhow::bail!(
            "GameData directory not found: {}",
            game_data.display()
        );
    }

    println!("Scanning {} for DLLs...", game_data.display());

    let mut dll_paths = Vec::new();
    for entry in WalkDir::new(&game_data).sort_by_file_name() {
        let entry = entry?;
        let is_dll = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"));
        if entry.file_type().is_file() && is_dll {
            dll_paths.push(entry.path().to_string_lossy().into_owned());
        }
    }

    let detected = ctx.manager.session().write(|registry| {
        registry.clear_dlls();
        dll_paths
            .iter()
            .filter_map(|path| registry.register_dll(&ctx.instance, path))
            .collect::<Vec<_>>()
    });
    ctx.manager.save()?;

    if detected.is_empty() {
        println!("✓ No unmanaged DLLs found");
    } else {
        println!(
            "✓ Autodetected {} DLL{}: {}",
            detected.len(),
            plural(detected.len()),
            detected.join(", ")
        );
    }

    if let Err(e) = ctx.manager.session().snapshot().check_sanity() {
        println!();
        println!("⚠ {}", e);
    }

    Ok(())
}
