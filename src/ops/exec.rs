//! `mpienv exec`: run a program under the active MPI.
//!
//! Each launcher family needs the environment forwarded differently:
//! Open MPI exports variables one by one with `-x`, Hydra takes a list
//! with `-genvlist`.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::{Installation, MpiKind};
use crate::ops::binding::PyBinding;
use crate::registry::Registry;
use crate::util::fs::read_link_once;
use crate::util::process::{exit_code, ProcessBuilder};

/// Variables always forwarded to the ranks.
const FORWARDED: &[&str] = &["PATH", "LD_LIBRARY_PATH"];

/// Prefix of Open MPI's own MCA environment variables.
const OMPI_ENV_PREFIX: &str = "OMPI_";

/// A fully resolved launcher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Overrides on top of the inherited environment.
    pub env: BTreeMap<String, OsString>,
}

impl LaunchPlan {
    pub fn to_process(&self) -> ProcessBuilder {
        let mut process = ProcessBuilder::new(&self.program).args(&self.args);
        for (key, value) in &self.env {
            process = process.env(key, value);
        }
        process
    }
}

/// Build the launcher command line for `installation`.
///
/// `entry` is the registry path of the installation; `env` is the caller's
/// environment, which may hold values that are not UTF-8; `binding_dir` is
/// the mpi4py directory for the entry, if one is installed.
pub fn plan_launch(
    entry: &Path,
    installation: &Installation,
    user_args: &[String],
    env: &BTreeMap<OsString, OsString>,
    binding_dir: Option<&Path>,
) -> Result<LaunchPlan> {
    let mut overrides = BTreeMap::new();
    if let Some(dir) = binding_dir {
        let mut python_path = dir.as_os_str().to_os_string();
        if let Some(existing) = env.get(OsStr::new("PYTHONPATH")).filter(|p| !p.is_empty()) {
            python_path.push(":");
            python_path.push(existing);
        }
        overrides.insert("PYTHONPATH".to_string(), python_path);
    }

    let mut args = Vec::new();
    match installation.kind() {
        MpiKind::OpenMpi => {
            let prefix = read_link_once(entry)?;
            args.push("--prefix".to_string());
            args.push(prefix.display().to_string());
            args.push("-x".to_string());
            args.push("PYTHONPATH".to_string());

            // `-x` takes a name on the command line, so only UTF-8 names
            // can be forwarded.
            let mut forwarded: Vec<&str> = FORWARDED.to_vec();
            forwarded.extend(
                env.keys()
                    .filter_map(|k| k.to_str())
                    .filter(|k| k.starts_with(OMPI_ENV_PREFIX)),
            );
            for var in forwarded {
                if env.contains_key(OsStr::new(var)) {
                    args.push("-x".to_string());
                    args.push(var.to_string());
                }
            }
        }
        MpiKind::Mpich | MpiKind::Mvapich => {
            args.push("-genvlist".to_string());
            args.push("PATH,LD_LIBRARY_PATH,PYTHONPATH".to_string());
        }
    }
    args.extend(user_args.iter().cloned());

    Ok(LaunchPlan {
        program: installation.launcher.clone(),
        args,
        env: overrides,
    })
}

/// Run `user_args` under the active MPI and return the launcher's exit code.
pub fn run(registry: &Registry<'_>, user_args: &[String]) -> Result<i32> {
    let name = registry.current_active()?;
    let installation = registry.installation(name)?;

    let binding_dir = match PyBinding::new(registry.context()) {
        Ok(binding) if binding.is_installed(name) => Some(binding.entry_dir(name)),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("skipping mpi4py lookup: {:#}", e);
            None
        }
    };

    let env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    let plan = plan_launch(
        &registry.entry_path(name),
        installation,
        user_args,
        &env,
        binding_dir.as_deref(),
    )?;

    let status = plan.to_process().status()?;
    Ok(exit_code(&status))
}
