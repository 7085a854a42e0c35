//! `mpienv use` command

use anyhow::Result;

use crate::cli::UseArgs;
use crate::GlobalOptions;
use mpienv::ops::activate;
use mpienv::util::Status;
use mpienv::Registry;

pub fn execute(args: UseArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let registry = Registry::load(&ctx)?;

    let activation = activate(&registry, &args.name, args.mpi4py)?;

    opts.shell.status(
        Status::Activated,
        format!("{} ({} {})", activation.name, activation.kind, activation.version),
    );
    if let Some(dir) = activation.binding {
        opts.shell.note(format!("mpi4py from {}", dir.display()));
    }

    let shim_bin = ctx.shims_dir().join("bin");
    if ctx.launcher_on_path().as_deref() != Some(activation.launcher.as_path()) {
        opts.shell.warn(format!(
            "{} is not first on PATH; add it to activate the shims",
            shim_bin.display()
        ));
    }

    Ok(())
}
