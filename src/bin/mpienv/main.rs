//! mpienv CLI - switch between MPI installations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use mpienv::probe::ProbeError;
use mpienv::util::diagnostic::{emit, Diagnostic};
use mpienv::util::{GlobalContext, Shell};
use mpienv::RegistryError;

/// Overrides the log filter, e.g. `MPIENV_LOG=mpienv=trace`.
const LOG_ENV: &str = "MPIENV_LOG";

/// Options shared by every command.
pub struct GlobalOptions {
    pub shell: Shell,
}

impl GlobalOptions {
    /// Build the per-invocation context and make sure its directories exist.
    pub fn context(&self) -> Result<GlobalContext> {
        let ctx = GlobalContext::from_env()?;
        ctx.ensure_dirs()?;
        Ok(ctx)
    }
}

fn main() {
    let cli = Cli::parse();
    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.color);
    let use_color = shell.use_color();

    init_logging(&cli);

    match run(cli, GlobalOptions { shell }) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            report(&e, use_color);
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "mpienv=debug"
    } else if cli.quiet {
        "mpienv=error"
    } else {
        "mpienv=warn"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli, opts: GlobalOptions) -> Result<i32> {
    match cli.command {
        Commands::List(args) => commands::list::execute(args, &opts)?,
        Commands::Info(args) => commands::info::execute(args, &opts)?,
        Commands::Prefix(args) => commands::prefix::execute(args, &opts)?,
        Commands::Add(args) => commands::add::execute(args, &opts)?,
        Commands::Rm(args) => commands::rm::execute(args, &opts)?,
        Commands::Rename(args) => commands::rename::execute(args, &opts)?,
        Commands::Use(args) => commands::use_mpi::execute(args, &opts)?,
        Commands::Exec(args) => return commands::exec::execute(args, &opts),
        Commands::Install(args) => commands::install::execute(args, &opts)?,
        Commands::Completions(args) => commands::completions::execute(args)?,
    }
    Ok(0)
}

/// Print an error, with hints when it is one of ours.
fn report(err: &anyhow::Error, color: bool) {
    if let Some(registry_err) = err.downcast_ref::<RegistryError>() {
        emit(&registry_err.to_diagnostic(), color);
        return;
    }

    if let Some(ProbeError::Unclassified { banner, .. }) = err.downcast_ref::<ProbeError>() {
        let mut diag = Diagnostic::error(format!("{:#}", err));
        for line in banner.lines().filter(|l| !l.trim().is_empty()).take(5) {
            diag = diag.with_context(line.trim());
        }
        emit(
            &diag.with_suggestion("Only Open MPI, MPICH and MVAPICH are supported"),
            color,
        );
        return;
    }

    eprintln!("error: {:#}", err);
}
