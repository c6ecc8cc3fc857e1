//! Command-line front end running a single managed child process.

pub mod args;
pub mod config;
pub mod entry;
mod error;
pub mod events;
mod productinfo;

pub use error::CliError;
