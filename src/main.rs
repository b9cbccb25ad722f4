use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;

/// ckan - Install and manage mods for Kerbal Space Program
#[derive(Parser)]
#[command(name = "ckan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Game instance to operate on (defaults to the configured default)
    #[arg(long, global = true)]
    instance: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install modules and their dependencies
    Install {
        /// Module identifiers (pin a version with identifier=version)
        #[arg(required = true)]
        modules: Vec<String>,

        /// Don't install recommended modules
        #[arg(long)]
        no_recommends: bool,

        /// Also install modules suggested by the requested modules
        #[arg(long)]
        with_suggests: bool,

        /// Also install modules suggested by any module in the plan
        #[arg(long)]
        with_all_suggests: bool,

        /// Show what would be installed without actually installing
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove modules and everything that depends on them
    Remove {
        /// Module identifiers
        #[arg(required = true)]
        modules: Vec<String>,

        /// Show what would be removed without actually removing
        #[arg(long)]
        dry_run: bool,
    },

    /// Upgrade installed modules to their latest compatible release
    Upgrade {
        /// Module identifiers
        modules: Vec<String>,

        /// Upgrade every installed module that has an update
        #[arg(long, conflicts_with = "modules")]
        all: bool,

        /// Show what would be upgraded without actually upgrading
        #[arg(long)]
        dry_run: bool,
    },

    /// List installed modules
    List,

    /// Show details about a module
    Show {
        /// Module identifier
        module: String,
    },

    /// List modules compatible with the instance's game version
    Available,

    /// Reload the module catalog
    Update,

    /// Detect DLLs installed outside ckan
    Scan,

    /// Manage game instances
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum InstanceAction {
    /// Register a game install
    Add {
        /// Name for the instance
        name: String,

        /// Game root directory
        path: String,

        /// Game version, e.g. 1.12.5
        game_version: String,
    },

    /// Forget a game install (its files are left alone)
    Remove {
        /// Instance name
        name: String,
    },

    /// List registered instances
    List,

    /// Set the default instance
    Default {
        /// Instance name
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        Some("debug".to_string())
    } else {
        ckan::Config::load().ok().and_then(|c| c.log.filter)
    };
    ckan::logging::init_logging(filter.as_deref());

    let instance = cli.instance;
    let result = match cli.command {
        Commands::Install {
            modules,
            no_recommends,
            with_suggests,
            with_all_suggests,
            dry_run,
        } => commands::install::run(
            instance,
            commands::install::InstallArgs {
                modules,
                no_recommends,
                with_suggests,
                with_all_suggests,
                dry_run,
            },
        ),
        Commands::Remove { modules, dry_run } => commands::remove::run(instance, modules, dry_run),
        Commands::Upgrade {
            modules,
            all,
            dry_run,
        } => commands::upgrade::run(instance, modules, all, dry_run),
        Commands::List => commands::list::run(instance),
        Commands::Show { module } => commands::show::run(instance, module),
        Commands::Available => commands::available::run(instance),
        Commands::Update => commands::update::run(instance),
        Commands::Scan => commands::scan::run(instance),
        Commands::Instance { action } => match action {
            InstanceAction::Add {
                name,
                path,
                game_version,
            } => commands::instance::run_add(name, path, game_version),
            InstanceAction::Remove { name } => commands::instance::run_remove(name),
            InstanceAction::List => commands::instance::run_list(),
            InstanceAction::Default { name } => commands::instance::run_default(name),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ckan", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
