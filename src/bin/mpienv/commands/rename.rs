//! `mpienv rename` command

use anyhow::Result;

use crate::cli::RenameArgs;
use crate::GlobalOptions;
use mpienv::util::Status;
use mpienv::Registry;

pub fn execute(args: RenameArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let mut registry = Registry::load(&ctx)?;

    registry.rename(&args.from, &args.to)?;
    opts.shell.status(Status::Renamed, format!("{} -> {}", args.from, args.to));

    Ok(())
}
