//! Identify the MPI installed under a prefix.
//!
//! Probing runs the prefix's `bin/mpiexec --version` and looks for a
//! marker in the banner:
//!
//! - `OpenRTE` (or `Open MPI` in newer releases) means Open MPI;
//! - `HYDRA` means the MPICH family, split into MPICH and MVAPICH by
//!   looking at `include/mpi.h`.
//!
//! The flavour-specific parsers live in [`ompi`] and [`mpich`]. A banner
//! with no known marker is a hard [`ProbeError::Unclassified`] error.

pub mod mpich;
pub mod ompi;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::core::Installation;
use crate::util::fs::{canonical_if_exists, is_broken_symlink, is_symlink};
use crate::util::process::ProcessBuilder;

/// Classification failures.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unknown MPI type: `{}`", launcher.display())]
    Unclassified { launcher: PathBuf, banner: String },

    #[error("cannot find `{field}` in the output of `{}`", tool.display())]
    MissingField { tool: PathBuf, field: &'static str },
}

/// Result of probing one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A recognised installation.
    Found(Installation),
    /// The path is a symlink whose target no longer exists.
    Broken,
    /// There is no `bin/mpiexec` under the path.
    NotFound,
}

/// Which parser family a banner belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerFamily {
    OpenMpi,
    Hydra,
}

/// Launcher location under a prefix.
pub fn launcher_path(prefix: &Path) -> PathBuf {
    prefix.join("bin").join("mpiexec")
}

/// Classify a captured `mpiexec --version` banner.
pub fn classify_banner(banner: &str) -> Option<BannerFamily> {
    if banner.contains("OpenRTE") || banner.contains("Open MPI") {
        Some(BannerFamily::OpenMpi)
    } else if banner.contains("HYDRA") {
        Some(BannerFamily::Hydra)
    } else {
        None
    }
}

/// Probe `path` (a registry entry or a user-supplied prefix).
pub fn identify(path: &Path) -> Result<ProbeOutcome> {
    if is_broken_symlink(path) {
        return Ok(ProbeOutcome::Broken);
    }

    let launcher = launcher_path(path);
    if !launcher.exists() {
        return Ok(ProbeOutcome::NotFound);
    }

    let prefix = path
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))?;

    let banner = ProcessBuilder::new(&launcher)
        .arg("--version")
        .combined_output()
        .with_context(|| format!("failed to probe {}", path.display()))?;

    let flavor = match classify_banner(&banner) {
        Some(BannerFamily::OpenMpi) => ompi::probe(&prefix)?,
        Some(BannerFamily::Hydra) => mpich::flavor(&prefix, &launcher, &banner)?,
        None => {
            return Err(ProbeError::Unclassified { launcher, banner }.into());
        }
    };

    tracing::debug!(
        "{} is {} {}",
        path.display(),
        flavor.kind(),
        flavor.version()
    );

    let bin = prefix.join("bin");
    let launcher = launcher
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", launcher.display()))?;

    Ok(ProbeOutcome::Found(Installation {
        launcher,
        cc: canonical_if_exists(&bin.join("mpicc")),
        cxx: canonical_if_exists(&bin.join("mpicxx")),
        symlink: is_symlink(path),
        prefix,
        flavor,
    }))
}

/// Probe `path` and require an installation.
pub fn require(path: &Path) -> Result<Installation> {
    match identify(path)? {
        ProbeOutcome::Found(installation) => Ok(installation),
        ProbeOutcome::Broken => anyhow::bail!("{} is a broken symlink", path.display()),
        ProbeOutcome::NotFound => anyhow::bail!("cannot find MPI in {}", path.display()),
    }
}
