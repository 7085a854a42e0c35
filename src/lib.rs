//! mpienv - manage Open MPI, MPICH and MVAPICH installations
//!
//! This crate provides the library behind the `mpienv` binary: probing
//! MPI prefixes, the registry of named installations, shim activation,
//! launching under the active MPI and building releases from source.

pub mod core;
pub mod ops;
pub mod probe;
pub mod registry;
pub mod util;

/// Fake MPI installations for unit tests.
#[cfg(test)]
pub(crate) mod test_support;

pub use crate::core::{Binding, Flavor, Installation, MpiKind};
pub use registry::{Registry, RegistryEntry, RegistryError};
pub use util::context::GlobalContext;
