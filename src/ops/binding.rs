//! mpi4py builds, one per interpreter and registry entry.
//!
//! mpi4py has to be compiled against the MPI it runs with, so every entry
//! gets its own copy under `<versions>/pylib/<interpreter>/<name>`, built
//! by pip with `MPICC` pointing at the entry's compiler wrapper.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::core::Installation;
use crate::util::context::encode_interpreter_path;
use crate::util::fs::{ensure_dir, entry_exists, remove_entry, symlink};
use crate::util::process::ProcessBuilder;
use crate::util::GlobalContext;

/// Name of the link in the shim directory.
pub const SHIM_LINK: &str = "pylib";

/// mpi4py installs for one Python interpreter.
#[derive(Debug, Clone)]
pub struct PyBinding {
    python: PathBuf,
    dir: PathBuf,
    shims_dir: PathBuf,
}

impl PyBinding {
    /// Bindings for the interpreter configured on `ctx`.
    pub fn new(ctx: &GlobalContext) -> Result<Self> {
        let python = ctx.python()?;
        Ok(Self::for_interpreter(ctx, python))
    }

    /// Bindings for an explicit, already resolved interpreter.
    pub fn for_interpreter(ctx: &GlobalContext, python: PathBuf) -> Self {
        let dir = ctx.pylib_root().join(encode_interpreter_path(&python));
        PyBinding {
            python,
            dir,
            shims_dir: ctx.shims_dir(),
        }
    }

    /// Install target for the entry called `name`.
    pub fn entry_dir(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.entry_dir(name).join("mpi4py").is_dir()
    }

    /// Build mpi4py against `installation` into [`PyBinding::entry_dir`].
    pub fn install(&self, name: &str, installation: &Installation) -> Result<()> {
        let mpicc = installation.cc.as_deref().ok_or_else(|| {
            anyhow!(
                "`{}` has no `mpicc`; mpi4py cannot be built against a runtime-only install",
                name
            )
        })?;

        let target = self.entry_dir(name);
        ensure_dir(&self.dir)?;

        tracing::info!("building mpi4py for `{}` with {}", name, self.python.display());

        ProcessBuilder::new(&self.python)
            .args(["-m", "pip", "install", "--no-cache-dir", "--no-binary", "mpi4py"])
            .arg("--target")
            .arg(&target)
            .arg("mpi4py")
            .env("MPICC", mpicc)
            .status_and_check()
            .with_context(|| format!("failed to install mpi4py for `{}`", name))?;

        Ok(())
    }

    /// Point `<shims>/pylib` at the entry's mpi4py.
    pub fn link_into_shims(&self, name: &str) -> Result<PathBuf> {
        let link = self.shims_dir.join(SHIM_LINK);
        if entry_exists(&link) {
            remove_entry(&link)?;
        }
        let target = self.entry_dir(name);
        symlink(&target, &link)
            .with_context(|| format!("failed to link {} -> {}", link.display(), target.display()))?;

        tracing::debug!("linked {} -> {}", link.display(), target.display());
        Ok(link)
    }
}
