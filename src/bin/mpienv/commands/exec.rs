//! `mpienv exec` command

use anyhow::Result;

use crate::cli::ExecArgs;
use crate::GlobalOptions;
use mpienv::ops::exec;
use mpienv::Registry;

/// Returns the launcher's exit code.
pub fn execute(args: ExecArgs, opts: &GlobalOptions) -> Result<i32> {
    let ctx = opts.context()?;
    let registry = Registry::load(&ctx)?;

    exec::run(&registry, &args.args)
}
