//! Registry error types and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error while looking up or mutating registry entries.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown MPI installation: `{name}`")]
    NotFound { name: String },

    #[error("`{name}` is broken: its installation has been removed")]
    Broken { name: String },

    #[error("`{name}` cannot be used: {reason}")]
    Unusable { name: String, reason: String },

    #[error("cannot find MPI in {}", prefix.display())]
    NoMpiAt { prefix: PathBuf },

    #[error("{} is already managed as `{name}`", prefix.display())]
    AlreadyManaged { prefix: PathBuf, name: String },

    #[error("name `{name}` is already taken")]
    NameTaken { name: String },

    #[error("cannot {action} the active MPI `{name}`")]
    ActiveEntry { name: String, action: &'static str },

    #[error("the current MPI is not under mpienv control")]
    UnknownActive { launcher: Option<PathBuf> },

    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl RegistryError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());

        match self {
            RegistryError::NotFound { .. } => diag.with_suggestion(suggestions::LIST_ENTRIES),

            RegistryError::Broken { name } => diag
                .with_context(format!("the target of `{}` no longer exists", name))
                .with_suggestion(suggestions::REMOVE_BROKEN),

            RegistryError::Unusable { .. } => diag
                .with_suggestion("Run with `--verbose` for details")
                .with_suggestion(suggestions::REMOVE_BROKEN),

            RegistryError::NoMpiAt { prefix } => diag
                .with_location(prefix.join("bin").join("mpiexec"))
                .with_suggestion("Pass the installation prefix, the directory containing `bin/mpiexec`"),

            RegistryError::AlreadyManaged { name, .. } => diag
                .with_suggestion(format!("Use the existing entry: `mpienv use {}`", name)),

            RegistryError::NameTaken { .. } => diag.with_suggestion(suggestions::PICK_NAME),

            RegistryError::ActiveEntry { .. } => diag.with_suggestion(suggestions::SWITCH_FIRST),

            RegistryError::UnknownActive { launcher } => {
                let diag = match launcher {
                    Some(path) => diag.with_context(format!("`mpiexec` on PATH is {}", path.display())),
                    None => diag.with_context("no `mpiexec` found on PATH"),
                };
                diag.with_suggestion(suggestions::ACTIVATE)
            }

            RegistryError::InvalidName { .. } => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_entry_diagnostic() {
        let err = RegistryError::ActiveEntry {
            name: "mpich-3.2".to_string(),
            action: "remove",
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("error: cannot remove the active MPI `mpich-3.2`"));
        assert!(output.contains("help: Switch to another installation"));
    }

    #[test]
    fn test_unknown_active_diagnostic() {
        let err = RegistryError::UnknownActive {
            launcher: Some(PathBuf::from("/usr/bin/mpiexec")),
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("not under mpienv control"));
        assert!(output.contains("/usr/bin/mpiexec"));
    }

    #[test]
    fn test_already_managed_names_entry() {
        let err = RegistryError::AlreadyManaged {
            prefix: PathBuf::from("/opt/mpich"),
            name: "mpich-3.2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "/opt/mpich is already managed as `mpich-3.2`"
        );
    }
}
