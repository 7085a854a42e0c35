//! Configuration file support for mpienv.
//!
//! The configuration lives in `<root>/config.json` and only affects source
//! builds. A missing file is not an error:
//!
//! ```json
//! {
//!   "jobs": 8,
//!   "openmpi": { "configure_options": ["--enable-mpi-cxx"] },
//!   "mpich":   { "configure_options": ["--disable-fortran"] },
//!   "mvapich": { "configure_options": [] }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::MpiKind;

/// mpienv configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default number of parallel make jobs
    pub jobs: Option<usize>,

    /// Open MPI build settings
    pub openmpi: FlavorConfig,

    /// MPICH build settings
    pub mpich: FlavorConfig,

    /// MVAPICH build settings
    pub mvapich: FlavorConfig,
}

/// Per-distribution build settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlavorConfig {
    /// Extra arguments passed to `./configure`
    pub configure_options: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!("cannot find config file {}; using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Settings for one distribution.
    pub fn flavor(&self, kind: MpiKind) -> &FlavorConfig {
        match kind {
            MpiKind::OpenMpi => &self.openmpi,
            MpiKind::Mpich => &self.mpich,
            MpiKind::Mvapich => &self.mvapich,
        }
    }
}
