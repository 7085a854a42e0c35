//! `mpienv use`: rebuild the shim directory for one entry.
//!
//! The shim tree is thrown away and recreated on every activation; it
//! never mixes files from two installations. Every shim is a symlink to
//! the canonical path of a file or directory inside the entry's prefix.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::MpiKind;
use crate::ops::binding::PyBinding;
use crate::registry::Registry;
use crate::util::fs::{ensure_dir, glob_entries, remove_dir_all_if_exists, symlink};

/// Which files of a prefix are exposed through the shim directory.
///
/// Each rule is `(subdirectory, patterns)`; the matches under
/// `<prefix>/<subdirectory>` are linked into `<shims>/<subdirectory>`.
#[derive(Debug, Clone, Copy)]
pub struct ShimPolicy {
    pub rules: &'static [(&'static str, &'static [&'static str])],
}

const MPICH_BIN: &[&str] = &["hydra_*", "mpi*", "parkill"];
const MPICH_LIB: &[&str] = &["lib*mpi*.*", "lib*mpl*.*", "libopa.*"];
const MPICH_INCLUDE: &[&str] = &["mpi*.h", "mpi*.mod", "opa*.h", "primitives"];

const MPICH: ShimPolicy = ShimPolicy {
    rules: &[
        ("bin", MPICH_BIN),
        ("lib", MPICH_LIB),
        ("include", MPICH_INCLUDE),
    ],
};

const MVAPICH: ShimPolicy = ShimPolicy {
    rules: &[
        ("bin", MPICH_BIN),
        ("lib", MPICH_LIB),
        ("include", MPICH_INCLUDE),
        ("libexec", &["osu-micro-benchmarks"]),
    ],
};

// `opal_` is matched literally.
const OPEN_MPI: ShimPolicy = ShimPolicy {
    rules: &[
        ("bin", &["mpi*", "ompi-*", "ompi_*", "orte*", "opal_"]),
        (
            "lib",
            &[
                "libmpi*",
                "libmca*",
                "libompi*",
                "libopen-pal*",
                "libopen-rte*",
                "openmpi",
                "pkgconfig",
            ],
        ),
        ("include", &["mpi*.h", "openmpi"]),
    ],
};

impl ShimPolicy {
    pub fn for_kind(kind: MpiKind) -> ShimPolicy {
        match kind {
            MpiKind::OpenMpi => OPEN_MPI,
            MpiKind::Mpich => MPICH,
            MpiKind::Mvapich => MVAPICH,
        }
    }

    /// Subdirectories created in the shim tree.
    pub fn dirs(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|(dir, _)| *dir)
    }
}

/// Result of an activation.
#[derive(Debug, Clone)]
pub struct Activation {
    pub name: String,
    pub kind: MpiKind,
    pub version: String,
    /// Resolved launcher of the activated installation.
    pub launcher: PathBuf,
    /// Number of symlinks created.
    pub links: usize,
    /// mpi4py directory linked as `<shims>/pylib`, when requested.
    pub binding: Option<PathBuf>,
}

/// Make `name` the active MPI.
///
/// Unknown, broken and unusable entries are refused before the shim
/// directory is touched. There is no rollback once rebuilding has begun.
pub fn activate(registry: &Registry<'_>, name: &str, with_binding: bool) -> Result<Activation> {
    let installation = registry.installation(name)?;
    let ctx = registry.context();
    let shims = ctx.shims_dir();
    let policy = ShimPolicy::for_kind(installation.kind());

    remove_dir_all_if_exists(&shims)?;
    let mut links = 0;
    for (dir, patterns) in policy.rules {
        let dst_dir = shims.join(dir);
        ensure_dir(&dst_dir)?;
        links += mirror(&installation.prefix.join(dir), patterns, &dst_dir)?;
    }

    tracing::info!(
        "activated `{}` ({} {}), {} shims",
        name,
        installation.kind(),
        installation.version(),
        links
    );

    let binding = if with_binding {
        let binding = PyBinding::new(ctx)?;
        if !binding.is_installed(name) {
            binding.install(name, installation)?;
        }
        binding.link_into_shims(name)?;
        Some(binding.entry_dir(name))
    } else {
        None
    };

    Ok(Activation {
        name: name.to_string(),
        kind: installation.kind(),
        version: installation.version().to_string(),
        launcher: installation.launcher.clone(),
        links,
        binding,
    })
}

/// Link every match of `patterns` under `src_dir` into `dst_dir`.
fn mirror(src_dir: &Path, patterns: &[&str], dst_dir: &Path) -> Result<usize> {
    let mut count = 0;
    for src in glob_entries(src_dir, patterns)? {
        let Some(file_name) = src.file_name() else {
            continue;
        };
        let target = match src.canonicalize() {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("skipping {}: {}", src.display(), e);
                continue;
            }
        };
        let dst = dst_dir.join(file_name);

        symlink(&target, &dst)
            .with_context(|| format!("failed to link {} -> {}", dst.display(), target.display()))?;
        tracing::debug!("shim {} -> {}", dst.display(), target.display());
        count += 1;
    }
    Ok(count)
}
