use std::path::PathBuf;

use crate::config::ConfigLoadError;

/// Errors that stop `tether` before the child's exit code can be reported.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    /// Managing the child process failed.
    #[error(transparent)]
    Process(#[from] tether_core::Error),

    /// An explicitly requested configuration file could not be used.
    #[error("{}: {source}", path.display())]
    Config {
        /// The file that was requested.
        path: PathBuf,
        /// What went wrong.
        #[source]
        source: ConfigLoadError,
    },

    /// Relaying data between the terminal and the child failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Diagnostic tracing could not be reconfigured.
    #[error("{0}")]
    Tracing(&'static str),
}
