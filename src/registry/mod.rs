//! The name -> installation registry.
//!
//! Every registered MPI is one filesystem entry in `<versions>/mpi`: a
//! symlink to the real prefix, or a real directory when the installer
//! built it in place. The in-memory [`Registry`] is rebuilt from that
//! directory on every invocation by probing each entry.
//!
//! An entry is *active* when its resolved launcher is the `mpiexec` found
//! first on the search path. Active entries cannot be removed or renamed.

mod errors;

pub use errors::RegistryError;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::Installation;
use crate::probe::{self, ProbeOutcome};
use crate::util::fs::{entry_exists, remove_entry, symlink};
use crate::util::{Confirm, GlobalContext};

/// State of one registry entry after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEntry {
    Installed(Installation),
    /// The entry is a symlink to a prefix that no longer exists.
    Broken,
    /// Probing failed; the entry is kept so it can be listed and removed.
    Unusable { reason: String },
}

impl RegistryEntry {
    pub fn installation(&self) -> Option<&Installation> {
        match self {
            RegistryEntry::Installed(installation) => Some(installation),
            _ => None,
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, RegistryEntry::Broken)
    }
}

/// Serializable view of one entry, as shown by `list` and `info`.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRecord<'a> {
    pub name: &'a str,
    pub active: bool,
    pub broken: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    #[serde(flatten)]
    pub installation: Option<&'a Installation>,
}

/// What `remove` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// The user declined at the prompt.
    Kept,
}

/// Registered MPI installations.
#[derive(Debug)]
pub struct Registry<'ctx> {
    ctx: &'ctx GlobalContext,
    entries: BTreeMap<String, RegistryEntry>,
}

impl<'ctx> Registry<'ctx> {
    /// Probe every entry under `<versions>/mpi`.
    ///
    /// A failing probe does not abort the load: the entry is recorded as
    /// unusable and a warning is logged.
    pub fn load(ctx: &'ctx GlobalContext) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mpi_dir = ctx.mpi_dir();

        if mpi_dir.is_dir() {
            let dir = fs::read_dir(&mpi_dir)
                .with_context(|| format!("failed to read {}", mpi_dir.display()))?;

            for dirent in dir {
                let dirent =
                    dirent.with_context(|| format!("failed to read {}", mpi_dir.display()))?;
                let Some(name) = dirent.file_name().to_str().map(str::to_string) else {
                    tracing::warn!("skipping non UTF-8 entry {:?}", dirent.file_name());
                    continue;
                };

                let entry = load_entry(&name, &dirent.path());
                entries.insert(name, entry);
            }
        }

        tracing::debug!("loaded {} registry entries", entries.len());

        Ok(Registry { ctx, entries })
    }

    pub fn context(&self) -> &GlobalContext {
        self.ctx
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Look up an entry.
    pub fn get(&self, name: &str) -> Result<&RegistryEntry, RegistryError> {
        self.entries.get(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })
    }

    /// Look up a usable installation.
    pub fn installation(&self, name: &str) -> Result<&Installation, RegistryError> {
        match self.get(name)? {
            RegistryEntry::Installed(installation) => Ok(installation),
            RegistryEntry::Broken => Err(RegistryError::Broken {
                name: name.to_string(),
            }),
            RegistryEntry::Unusable { reason } => Err(RegistryError::Unusable {
                name: name.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    /// Filesystem path of the entry called `name`.
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.ctx.entry_path(name)
    }

    /// Name of the entry whose launcher is `launcher`, if any.
    pub fn find_by_launcher(&self, launcher: &Path) -> Option<&str> {
        self.entries.iter().find_map(|(name, entry)| match entry {
            RegistryEntry::Installed(installation) if installation.launcher == launcher => {
                Some(name.as_str())
            }
            _ => None,
        })
    }

    /// The active entry, if the launcher on the search path is registered.
    pub fn active(&self) -> Option<&str> {
        let launcher = self.ctx.launcher_on_path()?;
        self.find_by_launcher(&launcher)
    }

    /// Like [`Registry::active`], but an unmanaged launcher is an error.
    pub fn current_active(&self) -> Result<&str, RegistryError> {
        let launcher = self.ctx.launcher_on_path();
        if let Some(name) = launcher.as_deref().and_then(|l| self.find_by_launcher(l)) {
            return Ok(name);
        }
        Err(RegistryError::UnknownActive { launcher })
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active() == Some(name)
    }

    /// Records for every entry, with the active flag computed once.
    pub fn records(&self) -> Vec<EntryRecord<'_>> {
        let active = self.active();
        self.entries
            .iter()
            .map(|(name, entry)| record(name, entry, active == Some(name.as_str())))
            .collect()
    }

    /// Record for a single entry.
    pub fn record(&self, name: &str) -> Result<EntryRecord<'_>, RegistryError> {
        let (name, entry) = self
            .entries
            .get_key_value(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })?;
        Ok(record(name, entry, self.is_active(name)))
    }

    /// Register the MPI installed at `prefix`.
    ///
    /// The entry is named `name` when given, otherwise after the vendor and
    /// version (`mpich-3.2`). Returns the name used.
    pub fn add(&mut self, prefix: &Path, name: Option<&str>) -> Result<String> {
        let installation = match probe::identify(prefix)? {
            ProbeOutcome::Found(installation) => installation,
            ProbeOutcome::Broken | ProbeOutcome::NotFound => {
                return Err(RegistryError::NoMpiAt {
                    prefix: prefix.to_path_buf(),
                }
                .into());
            }
        };

        if let Some(existing) = self.find_by_launcher(&installation.launcher) {
            return Err(RegistryError::AlreadyManaged {
                prefix: prefix.to_path_buf(),
                name: existing.to_string(),
            }
            .into());
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => installation.default_name(),
        };
        validate_name(&name)?;

        let link = self.entry_path(&name);
        if self.contains(&name) || entry_exists(&link) {
            return Err(RegistryError::NameTaken { name }.into());
        }

        symlink(&installation.prefix, &link).with_context(|| {
            format!(
                "failed to link {} -> {}",
                link.display(),
                installation.prefix.display()
            )
        })?;

        tracing::info!(
            "registered {} {} at {} as `{}`",
            installation.kind(),
            installation.version(),
            installation.prefix.display(),
            name
        );

        let installation = Installation {
            symlink: true,
            ..installation
        };
        self.entries
            .insert(name.clone(), RegistryEntry::Installed(installation));

        Ok(name)
    }

    /// Remove an entry.
    ///
    /// With `confirm`, the user is asked first and a "no" keeps the entry.
    /// Symlink entries are unlinked; in-place builds are deleted.
    pub fn remove(&mut self, name: &str, confirm: Option<&mut dyn Confirm>) -> Result<Removal> {
        self.get(name)?;

        if self.is_active(name) {
            return Err(RegistryError::ActiveEntry {
                name: name.to_string(),
                action: "remove",
            }
            .into());
        }

        if let Some(confirm) = confirm {
            if !confirm.confirm(&format!("Remove '{}' ?", name)) {
                tracing::debug!("kept `{}`", name);
                return Ok(Removal::Kept);
            }
        }

        remove_entry(&self.entry_path(name))?;
        self.entries.remove(name);

        for dir in self.binding_dirs(name)? {
            remove_entry(&dir)?;
        }

        tracing::info!("removed `{}`", name);
        Ok(Removal::Removed)
    }

    /// Rename an entry.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.get(from)?;
        validate_name(to)?;

        if self.contains(to) || entry_exists(&self.entry_path(to)) {
            return Err(RegistryError::NameTaken {
                name: to.to_string(),
            }
            .into());
        }

        if self.is_active(from) {
            return Err(RegistryError::ActiveEntry {
                name: from.to_string(),
                action: "rename",
            }
            .into());
        }

        let src = self.entry_path(from);
        let dst = self.entry_path(to);
        fs::rename(&src, &dst)
            .with_context(|| format!("failed to move {} to {}", src.display(), dst.display()))?;

        if let Some(entry) = self.entries.remove(from) {
            self.entries.insert(to.to_string(), entry);
        }

        for dir in self.binding_dirs(from)? {
            let renamed = dir.with_file_name(to);
            if entry_exists(&renamed) {
                tracing::warn!("not moving {}: {} exists", dir.display(), renamed.display());
                continue;
            }
            fs::rename(&dir, &renamed)
                .with_context(|| format!("failed to move {}", dir.display()))?;
        }

        tracing::info!("renamed `{}` to `{}`", from, to);
        Ok(())
    }
}

impl Registry<'_> {
    /// mpi4py builds for `name`, one per interpreter.
    fn binding_dirs(&self, name: &str) -> Result<Vec<PathBuf>> {
        let root = self.ctx.pylib_root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for interpreter in
            fs::read_dir(&root).with_context(|| format!("failed to read {}", root.display()))?
        {
            let dir = interpreter?.path().join(name);
            if entry_exists(&dir) {
                dirs.push(dir);
            }
        }
        Ok(dirs)
    }
}

fn record<'a>(name: &'a str, entry: &'a RegistryEntry, active: bool) -> EntryRecord<'a> {
    let (error, installation) = match entry {
        RegistryEntry::Installed(installation) => (None, Some(installation)),
        RegistryEntry::Broken => (None, None),
        RegistryEntry::Unusable { reason } => (Some(reason.as_str()), None),
    };
    EntryRecord {
        name,
        active,
        broken: entry.is_broken(),
        error,
        installation,
    }
}

fn load_entry(name: &str, path: &Path) -> RegistryEntry {
    match probe::identify(path) {
        Ok(ProbeOutcome::Found(installation)) => RegistryEntry::Installed(installation),
        Ok(ProbeOutcome::Broken) => {
            tracing::debug!("`{}` is a broken link", name);
            RegistryEntry::Broken
        }
        Ok(ProbeOutcome::NotFound) => {
            let reason = "no launcher at bin/mpiexec".to_string();
            tracing::warn!("`{}` cannot be used: {}", name, reason);
            RegistryEntry::Unusable { reason }
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            tracing::warn!("`{}` cannot be used: {}", name, reason);
            RegistryEntry::Unusable { reason }
        }
    }
}

/// Names become a single path component under `<versions>/mpi`.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative path component"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name contains a path separator"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }
    Ok(())
}
