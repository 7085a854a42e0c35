//! `mpienv install` command

use anyhow::Result;

use crate::cli::InstallArgs;
use crate::GlobalOptions;
use mpienv::ops::install::CONFIGURE_OPTS_ENV;
use mpienv::ops::{catalog, InstallOptions, InstallOutcome, Installer};
use mpienv::util::{Config, Status};
use mpienv::Registry;

pub fn execute(args: InstallArgs, opts: &GlobalOptions) -> Result<()> {
    if args.list {
        for release in catalog() {
            println!(" {}", release.key);
        }
        return Ok(());
    }

    let Some(mpi) = args.mpi else {
        anyhow::bail!("no MPI given; see `mpienv install --list`");
    };

    let ctx = opts.context()?;
    let config = Config::load_or_default(&ctx.config_path())?;
    let registry = Registry::load(&ctx)?;

    let install_opts = InstallOptions {
        mpi,
        name: args.name,
        jobs: args.jobs,
        configure_opts: std::env::var(CONFIGURE_OPTS_ENV).ok(),
    };
    let installer = Installer::new(&registry, &config, &opts.shell, &install_opts)?;

    let (name, prefix) = match installer.run()? {
        InstallOutcome::Installed { name, prefix } => (name, prefix),
        InstallOutcome::ConfigureHelp => return Ok(()),
    };

    // Probe the fresh prefix so the status line reports what was built.
    let registry = Registry::load(&ctx)?;
    let installation = registry.installation(&name)?;
    opts.shell.status(
        Status::Installed,
        format!(
            "{} ({} {}) -> {}",
            name,
            installation.kind(),
            installation.version(),
            prefix.display()
        ),
    );

    Ok(())
}
