//! `mpienv add` command

use anyhow::Result;

use crate::cli::AddArgs;
use crate::GlobalOptions;
use mpienv::util::Status;
use mpienv::Registry;

pub fn execute(args: AddArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let mut registry = Registry::load(&ctx)?;

    let name = registry.add(&args.prefix, args.name.as_deref())?;
    let installation = registry.installation(&name)?;

    opts.shell.status(
        Status::Added,
        format!(
            "{} ({} {}) -> {}",
            name,
            installation.kind(),
            installation.version(),
            installation.prefix.display()
        ),
    );
    println!("{}", name);

    Ok(())
}
