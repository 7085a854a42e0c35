//! `mpienv rm` command

use anyhow::{Context, Result};

use crate::cli::RmArgs;
use crate::GlobalOptions;
use mpienv::registry::Removal;
use mpienv::util::{prompt, Confirm, StdinConfirm, Status};
use mpienv::Registry;

pub fn execute(args: RmArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let mut registry = Registry::load(&ctx)?;

    let mut stdin_prompt = None;
    if args.interactive {
        // Ctrl-C at a prompt answers "no" for that name; anywhere else it
        // stops the command.
        ctrlc::set_handler(|| {
            if !prompt::interrupt_prompt() {
                std::process::exit(130);
            }
        })
        .context("failed to install Ctrl-C handler")?;
        stdin_prompt = Some(StdinConfirm::new());
    }

    for name in &args.names {
        let confirm = stdin_prompt.as_mut().map(|p| p as &mut dyn Confirm);

        match registry.remove(name, confirm)? {
            Removal::Removed => opts.shell.status(Status::Removed, name),
            Removal::Kept => opts.shell.status(Status::Skipped, name),
        }
    }

    Ok(())
}
