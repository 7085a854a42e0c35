//! `mpienv prefix` command

use std::io::{IsTerminal, Write};

use anyhow::Result;

use crate::cli::PrefixArgs;
use crate::GlobalOptions;
use mpienv::Registry;

pub fn execute(args: PrefixArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let registry = Registry::load(&ctx)?;

    let name = match args.name.as_deref() {
        Some(name) => name,
        None => registry.current_active()?,
    };
    let installation = registry.installation(name)?;

    // No trailing newline when captured, so `$(mpienv prefix)` is exact.
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", installation.prefix.display())?;
    if stdout.is_terminal() {
        writeln!(stdout)?;
    }
    stdout.flush()?;

    Ok(())
}
