//! Subcommand implementations

pub mod annotations;
pub mod check;
pub mod members;
pub mod resolve;
