//! Core data types.

pub mod installation;

pub use installation::{Binding, Flavor, Installation, MpiKind};
