//! Installation records.
//!
//! An [`Installation`] is what the probe learns about one MPI prefix. The
//! fields every flavour has live on the struct itself; the flavour-specific
//! metadata lives in [`Flavor`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The three MPI distributions mpienv knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MpiKind {
    #[serde(rename = "Open MPI")]
    OpenMpi,
    #[serde(rename = "MPICH")]
    Mpich,
    #[serde(rename = "MVAPICH")]
    Mvapich,
}

impl MpiKind {
    /// Prefix used to build the default registry name (`<prefix>-<version>`).
    pub fn name_prefix(&self) -> &'static str {
        match self {
            MpiKind::OpenMpi => "openmpi",
            MpiKind::Mpich => "mpich",
            MpiKind::Mvapich => "mvapich2",
        }
    }

    /// MPICH and MVAPICH share the Hydra launcher.
    pub fn is_mpich_family(&self) -> bool {
        matches!(self, MpiKind::Mpich | MpiKind::Mvapich)
    }
}

impl fmt::Display for MpiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpiKind::OpenMpi => write!(f, "Open MPI"),
            MpiKind::Mpich => write!(f, "MPICH"),
            MpiKind::Mvapich => write!(f, "MVAPICH"),
        }
    }
}

/// Language bindings an installation provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Binding {
    #[serde(rename = "c")]
    C,
    #[serde(rename = "c++")]
    Cxx,
    #[serde(rename = "fortran")]
    Fortran,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::C => write!(f, "C"),
            Binding::Cxx => write!(f, "C++"),
            Binding::Fortran => write!(f, "Fortran"),
        }
    }
}

/// Flavour-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Flavor {
    #[serde(rename = "Open MPI")]
    OpenMpi {
        version: String,
        /// Version of the MPI standard implemented (`mpi-api:version:full`).
        mpi_version: Option<String>,
        bindings: BTreeSet<Binding>,
        cuda: Option<bool>,
    },
    #[serde(rename = "MPICH")]
    Mpich {
        version: String,
        configure_flags: Vec<String>,
        bindings: BTreeSet<Binding>,
        cuda: Option<bool>,
    },
    #[serde(rename = "MVAPICH")]
    Mvapich {
        version: String,
        /// The MPICH release this MVAPICH is based on.
        mpich_version: String,
        configure_flags: Vec<String>,
        bindings: BTreeSet<Binding>,
        cuda: Option<bool>,
    },
}

impl Flavor {
    pub fn kind(&self) -> MpiKind {
        match self {
            Flavor::OpenMpi { .. } => MpiKind::OpenMpi,
            Flavor::Mpich { .. } => MpiKind::Mpich,
            Flavor::Mvapich { .. } => MpiKind::Mvapich,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            Flavor::OpenMpi { version, .. }
            | Flavor::Mpich { version, .. }
            | Flavor::Mvapich { version, .. } => version,
        }
    }

    /// Configure flags recorded by the vendor tool.
    ///
    /// Always empty for Open MPI: `ompi_info` does not report them.
    pub fn configure_flags(&self) -> &[String] {
        match self {
            Flavor::OpenMpi { .. } => &[],
            Flavor::Mpich {
                configure_flags, ..
            }
            | Flavor::Mvapich {
                configure_flags, ..
            } => configure_flags,
        }
    }

    pub fn bindings(&self) -> &BTreeSet<Binding> {
        match self {
            Flavor::OpenMpi { bindings, .. }
            | Flavor::Mpich { bindings, .. }
            | Flavor::Mvapich { bindings, .. } => bindings,
        }
    }

    pub fn cuda(&self) -> Option<bool> {
        match self {
            Flavor::OpenMpi { cuda, .. }
            | Flavor::Mpich { cuda, .. }
            | Flavor::Mvapich { cuda, .. } => *cuda,
        }
    }

    /// MPI standard version, only reported by Open MPI.
    pub fn mpi_version(&self) -> Option<&str> {
        match self {
            Flavor::OpenMpi { mpi_version, .. } => mpi_version.as_deref(),
            _ => None,
        }
    }

    /// Base MPICH release of an MVAPICH installation.
    pub fn mpich_version(&self) -> Option<&str> {
        match self {
            Flavor::Mvapich { mpich_version, .. } => Some(mpich_version),
            _ => None,
        }
    }
}

/// A probed MPI installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    /// Installation root, symlinks resolved.
    pub prefix: PathBuf,

    /// Resolved path of `bin/mpiexec`.
    pub launcher: PathBuf,

    /// Resolved path of `bin/mpicc`, absent for runtime-only installs.
    pub cc: Option<PathBuf>,

    /// Resolved path of `bin/mpicxx`, absent for runtime-only installs.
    pub cxx: Option<PathBuf>,

    /// Whether the registry entry is a symlink (as opposed to an in-place build).
    pub symlink: bool,

    #[serde(flatten)]
    pub flavor: Flavor,
}

impl Installation {
    pub fn kind(&self) -> MpiKind {
        self.flavor.kind()
    }

    pub fn version(&self) -> &str {
        self.flavor.version()
    }

    /// Vendor-derived registry name, e.g. `openmpi-2.1.1`.
    pub fn default_name(&self) -> String {
        format!("{}-{}", self.kind().name_prefix(), self.version())
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}
