//! rangekeeper CLI - reserve and allocate units shared across processes.

mod commands;
mod observability;

use anyhow::Result;
use clap::{Parser, Subcommand};
use observability::{TracingConfig, TracingGuard, init_tracing};
use rangekeeper_core::{LoadFileChange, UnitRange};
use std::path::PathBuf;

/// rangekeeper - lock-guarded reservation of integer units.
#[derive(Parser)]
#[command(name = "rangekeeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON settings file (defaults to $RANGEKEEPER_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// State directory, overriding the settings
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate N free units, lowest first
    Allocate {
        /// Number of units
        count: u32,
    },

    /// Reserve ranges (N or LO-HI), all or nothing
    Reserve {
        /// Ranges to reserve
        #[arg(required = true)]
        ranges: Vec<UnitRange>,
    },

    /// Release reserved ranges (N or LO-HI), all or nothing
    Release {
        /// Ranges to release
        #[arg(required = true)]
        ranges: Vec<UnitRange>,
    },

    /// Show reserved ranges and free capacity
    Status,

    /// Publish a directory as a new project
    Publish {
        /// Directory to publish
        #[arg(short = 'd', long)]
        data_dir: PathBuf,

        /// File opened by default
        #[arg(short = 'f', long)]
        load_file: Option<PathBuf>,

        #[command(flatten)]
        user: UserArg,
    },

    /// Change the directory or default file of a project
    Modify {
        /// Project ID
        id: String,

        /// New directory
        #[arg(short = 'd', long)]
        data_dir: Option<PathBuf>,

        /// New default file
        #[arg(short = 'f', long, conflicts_with = "no_load_file")]
        load_file: Option<PathBuf>,

        /// Remove the default file
        #[arg(long)]
        no_load_file: bool,

        #[command(flatten)]
        user: UserArg,
    },

    /// List your projects
    List {
        #[command(flatten)]
        user: UserArg,
    },

    /// Show one project
    Show {
        /// Project ID
        id: String,

        #[command(flatten)]
        user: UserArg,
    },

    /// Release a project's units and delete it
    Unpublish {
        /// Project ID
        id: String,

        #[command(flatten)]
        user: UserArg,
    },
}

#[derive(clap::Args)]
struct UserArg {
    /// Act as this user (defaults to $SUDO_USER, then $USER)
    #[arg(long)]
    user: Option<String>,
}

impl UserArg {
    fn resolve(self) -> Result<String> {
        commands::projects::resolve_owner(self.user)
    }
}

fn setup_logging(verbosity: u8) -> Result<TracingGuard> {
    init_tracing(TracingConfig::from_env(verbosity))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = setup_logging(cli.verbose)?;

    let store = commands::open_store(cli.config.as_deref(), cli.state_dir.as_deref())?;

    match cli.command {
        Commands::Allocate { count } => commands::units::allocate(&store, count),
        Commands::Reserve { ranges } => commands::units::reserve(&store, &ranges),
        Commands::Release { ranges } => commands::units::release(&store, &ranges),
        Commands::Status => commands::units::status(&store),
        Commands::Publish {
            data_dir,
            load_file,
            user,
        } => commands::projects::publish(&store, &user.resolve()?, &data_dir, load_file),
        Commands::Modify {
            id,
            data_dir,
            load_file,
            no_load_file,
            user,
        } => {
            let load_file = match (load_file, no_load_file) {
                (Some(file), _) => LoadFileChange::Set(file),
                (None, true) => LoadFileChange::Clear,
                (None, false) => LoadFileChange::Keep,
            };
            commands::projects::modify(
                &store,
                &user.resolve()?,
                &id,
                data_dir.as_deref(),
                load_file,
            )
        }
        Commands::List { user } => commands::projects::list(&store, &user.resolve()?),
        Commands::Show { id, user } => commands::projects::show(&store, &user.resolve()?, &id),
        Commands::Unpublish { id, user } => {
            commands::projects::unpublish(&store, &user.resolve()?, &id)
        }
    }
}
