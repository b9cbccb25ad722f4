pub mod available;
pub mod install;
pub mod instance;
pub mod list;
pub mod remove;
pub mod scan;
pub mod show;
pub mod update;
pub mod upgrade;

use anyhow::Result;
use ckan::{
    CkanModule, Config, GameInstance, Kraken, ProgressCallback, RegistryManager,
    RelationshipResolverOptions, Resolution,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

/// Everything a command needs to work on one game instance
pub struct Context {
    pub config: Config,
    pub instance: GameInstance,
    pub manager: RegistryManager,
}

impl Context {
    pub fn open(instance: Option<&str>) -> Result<Self> {
        let config = Config::load()?;
        let instance = config.select_instance(instance)?;

        if !instance.root.is_dir() {
            anyhow::bail!(
                "Game directory not found: {}\n\n\
                 Hint: Check the path registered for instance '{}':\n\
                    ckan instance list",
                instance.root.display(),
                instance.name
            );
        }

        let manager = RegistryManager::open(instance.clone())?;
        Ok(Self {
            config,
            instance,
            manager,
        })
    }
}

/// Create an indicatif-based progress callback for CLI display
pub fn create_spinner_callback() -> ProgressCallback {
    let spinner = Arc::new(Mutex::new(ProgressBar::new_spinner()));
    if let Ok(s) = spinner.lock() {
        s.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        s.enable_steady_tick(std::time::Duration::from_millis(80));
    }

    Arc::new(move |msg: &str, current: u64, total: u64| {
        if let Ok(s) = spinner.lock() {
            if current >= total {
                s.finish_with_message(format!("✓ {}", msg));
            } else {
                s.set_message(msg.to_string());
            }
        }
    })
}

/// Resolve `requests`, asking the user to pick whenever several modules
/// provide the same name.
pub fn resolve_interactive(
    ctx: &Context,
    mut requests: Vec<String>,
    options: RelationshipResolverOptions,
) -> Result<Resolution> {
    loop {
        match ctx
            .manager
            .session()
            .resolve(&requests, options, ctx.instance.version)
        {
            Ok(resolution) => return Ok(resolution),
            Err(Kraken::TooManyModsProvide {
                requested,
                candidates,
            }) => {
                let chosen = match choose_provider(&requested, &candidates)? {
                    Some(module) => module.identifier.clone(),
                    None => {
                        return Err(Kraken::CancelledAction(format!(
                            "no module chosen to provide {}",
                            requested
                        ))
                        .into())
                    }
                };

                if requests.contains(&chosen) {
                    anyhow::bail!("{} was already requested but {} is still ambiguous", chosen, requested);
                }

                // A virtual request is replaced by the choice, anything else gains it
                match requests.iter().position(|r| r == &requested) {
                    Some(pos) => requests[pos] = chosen,
                    None => requests.push(chosen),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn choose_provider<'m>(
    requested: &str,
    candidates: &'m [CkanModule],
) -> Result<Option<&'m CkanModule>> {
    println!();
    println!("Several modules provide {}:", requested);
    for (i, module) in candidates.iter().enumerate() {
        match &module.abstract_ {
            Some(summary) => println!("  {}) {} - {}", i + 1, module, summary),
            None => println!("  {}) {}", i + 1, module),
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("Choose one [1-{}] or press Enter to cancel: ", candidates.len());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            return Ok(None);
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        match line.parse::<usize>() {
            Ok(n) if (1..=candidates.len()).contains(&n) => return Ok(Some(&candidates[n - 1])),
            _ => println!("  Please enter a number between 1 and {}", candidates.len()),
        }
    }
}

/// Print soft relationships the resolver left out.
pub fn print_skipped_soft_relationships(resolution: &Resolution) {
    if !resolution.recommendations().is_empty() {
        println!();
        println!("Recommended but not selected:");
        for rec in resolution.recommendations() {
            println!("  {} (recommended by {})", rec.identifier, rec.wanted_by);
        }
    }
    if !resolution.suggestions().is_empty() {
        println!();
        println!("Suggested but not selected:");
        for sug in resolution.suggestions() {
            println!("  {} (suggested by {})", sug.identifier, sug.wanted_by);
        }
    }
}

pub fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
