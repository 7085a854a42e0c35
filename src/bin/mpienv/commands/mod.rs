//! Command implementations

pub mod add;
pub mod completions;
pub mod exec;
pub mod info;
pub mod install;
pub mod list;
pub mod prefix;
pub mod rename;
pub mod rm;
pub mod use_mpi;
