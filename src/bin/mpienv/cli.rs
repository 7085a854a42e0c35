//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mpienv::util::ColorChoice;

/// mpienv - switch between Open MPI, MPICH and MVAPICH installations
#[derive(Parser)]
#[command(name = "mpienv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered MPI installations
    List(ListArgs),

    /// Show details of an installation (the active one by default)
    Info(InfoArgs),

    /// Print the installation prefix
    Prefix(PrefixArgs),

    /// Register an existing MPI installation
    Add(AddArgs),

    /// Unregister MPI installations
    Rm(RmArgs),

    /// Rename a registered installation
    Rename(RenameArgs),

    /// Make an installation the active one
    Use(UseArgs),

    /// Run a command under the active MPI's launcher
    Exec(ExecArgs),

    /// Build and register an MPI release from source
    Install(InstallArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Installation name
    pub name: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PrefixArgs {
    /// Installation name
    pub name: Option<String>,
}

#[derive(Args)]
pub struct AddArgs {
    /// Installation prefix (the directory containing bin/mpiexec)
    pub prefix: PathBuf,

    /// Name to register under (defaults to <type>-<version>)
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct RmArgs {
    /// Installation names
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Ask before removing each installation
    #[arg(short = 'i')]
    pub interactive: bool,
}

#[derive(Args)]
pub struct RenameArgs {
    /// Current name
    pub from: String,

    /// New name
    pub to: String,
}

#[derive(Args)]
pub struct UseArgs {
    /// Installation name
    pub name: String,

    /// Also build and expose mpi4py for the current Python
    #[arg(long)]
    pub mpi4py: bool,
}

#[derive(Args)]
pub struct ExecArgs {
    /// Launcher arguments and the program to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Release to install (see --list)
    #[arg(required_unless_present = "list")]
    pub mpi: Option<String>,

    /// List installable releases
    #[arg(long, conflicts_with_all = ["name", "jobs"])]
    pub list: bool,

    /// Name to register under (defaults to the release name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Number of parallel make jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
