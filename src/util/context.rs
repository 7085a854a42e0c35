//! Global context for mpienv operations.
//!
//! One `GlobalContext` is built per command invocation and passed by
//! reference to everything that touches the mpienv directory tree:
//!
//! ```text
//! <root>/
//!   config.json
//!   cache/                      downloaded tarballs
//!   builds/<name>/              unpacked sources
//!   versions/
//!     mpi/<name>                registry entries (symlink or real dir)
//!     shims/{bin,lib,include,libexec}
//!     pylib/<interpreter>/<name>
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use directories::BaseDirs;
use regex::Regex;

use crate::util::fs::ensure_dir;
use crate::util::process::{find_executable_in, search_path};

/// Overrides the mpienv root directory.
pub const ROOT_ENV: &str = "MPIENV_ROOT";
/// Overrides `<root>/versions`.
pub const VERSIONS_DIR_ENV: &str = "MPIENV_VERSIONS_DIR";
/// Overrides `<root>/cache`.
pub const CACHE_DIR_ENV: &str = "MPIENV_CACHE_DIR";
/// Overrides `<root>/builds`.
pub const BUILD_DIR_ENV: &str = "MPIENV_BUILD_DIR";
/// Python interpreter used for the mpi4py binding.
pub const PYTHON_ENV: &str = "MPIENV_PYTHON";

static NON_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9.]").expect("valid regex"));

/// Global context containing paths and environment.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// mpienv home (~/.mpienv by default)
    root: PathBuf,

    /// Directory holding registry entries, shims and binding installs
    versions_dir: PathBuf,

    /// Download cache
    cache_dir: PathBuf,

    /// Source build area
    build_dir: PathBuf,

    /// Search path used to find the on-path launcher
    search_path: Option<OsString>,

    /// Explicit Python interpreter, if configured
    python: Option<PathBuf>,
}

impl GlobalContext {
    /// Build a context from the process environment.
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var_os(ROOT_ENV) {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => BaseDirs::new()
                .map(|b| b.home_dir().join(".mpienv"))
                .ok_or_else(|| anyhow!("cannot determine home directory; set {}", ROOT_ENV))?,
        };

        let mut ctx = Self::with_root(root);

        if let Some(dir) = non_empty_env(VERSIONS_DIR_ENV) {
            ctx.versions_dir = dir;
        }
        if let Some(dir) = non_empty_env(CACHE_DIR_ENV) {
            ctx.cache_dir = dir;
        }
        if let Some(dir) = non_empty_env(BUILD_DIR_ENV) {
            ctx.build_dir = dir;
        }
        ctx.python = non_empty_env(PYTHON_ENV);

        Ok(ctx)
    }

    /// Create a context rooted at `root` with default sub-directories.
    ///
    /// Environment overrides are not consulted; the search path is taken
    /// from the current `PATH`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        GlobalContext {
            versions_dir: root.join("versions"),
            cache_dir: root.join("cache"),
            build_dir: root.join("builds"),
            root,
            search_path: search_path(),
            python: None,
        }
    }

    /// Use a specific search path for launcher lookup.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Use a specific Python interpreter for the binding helper.
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    /// Create the directories every command expects.
    pub fn ensure_dirs(&self) -> Result<()> {
        ensure_dir(&self.versions_dir)?;
        ensure_dir(&self.mpi_dir())?;
        ensure_dir(&self.pylib_root())?;
        ensure_dir(&self.cache_dir)?;
        ensure_dir(&self.build_dir)?;
        Ok(())
    }

    /// Get the mpienv root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the versions directory.
    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    /// Directory holding one entry per registered MPI.
    pub fn mpi_dir(&self) -> PathBuf {
        self.versions_dir.join("mpi")
    }

    /// Path of the registry entry called `name`.
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.mpi_dir().join(name)
    }

    /// The shim directory exposing the active MPI.
    pub fn shims_dir(&self) -> PathBuf {
        self.versions_dir.join("shims")
    }

    /// Root of all per-interpreter binding installs.
    pub fn pylib_root(&self) -> PathBuf {
        self.versions_dir.join("pylib")
    }

    /// Get the download cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the build directory.
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Search path used for launcher lookup.
    pub fn search_path(&self) -> Option<&OsStr> {
        self.search_path.as_deref()
    }

    /// The launcher first on the search path, symlinks resolved.
    pub fn launcher_on_path(&self) -> Option<PathBuf> {
        find_executable_in("mpiexec", self.search_path())
    }

    /// Resolve the Python interpreter (canonical path).
    pub fn python(&self) -> Result<PathBuf> {
        if let Some(ref python) = self.python {
            let resolved = if python.components().count() > 1 {
                python.canonicalize().ok()
            } else {
                find_executable_in(&python.to_string_lossy(), self.search_path())
            };
            return resolved.ok_or_else(|| {
                anyhow!("python interpreter not found: {}", python.display())
            });
        }

        find_executable_in("python3", self.search_path())
            .or_else(|| find_executable_in("python", self.search_path()))
            .ok_or_else(|| anyhow!("no python interpreter found; set {}", PYTHON_ENV))
    }
}

fn non_empty_env(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Turn an interpreter path into a single directory name.
///
/// `/usr/bin/python3.11` becomes `usr_bin_python3.11`.
pub fn encode_interpreter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let trimmed = raw.strip_prefix('/').unwrap_or(&raw);
    NON_PATH_CHARS.replace_all(trimmed, "_").into_owned()
}
