//! High-level operations.
//!
//! This module contains the implementation of the mpienv commands that do
//! more than a registry lookup.

pub mod activate;
pub mod binding;
pub mod exec;
pub mod install;

pub use activate::{activate, Activation, ShimPolicy};
pub use binding::PyBinding;
pub use exec::{plan_launch, LaunchPlan};
pub use install::{catalog, InstallOptions, InstallOutcome, Installer, Release};
