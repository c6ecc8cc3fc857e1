//! Command-line arguments for `tether`.

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::{events, productinfo};

const SHORT_DESCRIPTION: &str = "Run a program as a managed child process";

const LONG_DESCRIPTION: &str = r"
tether starts PROGRAM with its stdin and stdout connected through pipes, relays the
terminal's input to it and its output back, and exits with the child's exit code.

Settings are layered: built-in defaults, then the configuration file, then the
command line.
";

/// Parsed command-line arguments for `tether`.
#[derive(Debug, Parser)]
#[clap(name = productinfo::PRODUCT_NAME,
       version = productinfo::PRODUCT_VERSION,
       about = SHORT_DESCRIPTION,
       long_about = LONG_DESCRIPTION)]
pub struct CommandLineArgs {
    /// Working directory for the child.
    #[clap(long = "cwd", value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Set an environment variable for the child (repeatable).
    #[clap(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_assignment)]
    pub env: Vec<(OsString, OsString)>,

    /// Start the child from an empty environment.
    #[clap(long = "clear-env")]
    pub clear_env: bool,

    /// Let the child write to this process's stderr instead of discarding it.
    #[clap(long = "inherit-stderr")]
    pub inherit_stderr: bool,

    /// Largest number of arguments accepted, program included; 0 disables the limit.
    #[clap(long = "max-args", value_name = "N")]
    pub max_args: Option<usize>,

    /// Do not forward this process's stdin; the child sees end-of-file immediately.
    #[clap(long = "no-stdin")]
    pub no_stdin: bool,

    /// Signal the child if it is still running after this many milliseconds.
    #[clap(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Signal sent when the timeout expires, by name or number.
    #[clap(long = "signal", value_name = "SIGNAL")]
    pub signal: Option<String>,

    /// Enable debug logging for classes of tracing events (repeatable).
    #[clap(long = "debug", value_name = "EVENT")]
    pub enabled_debug_events: Vec<events::TraceEvent>,

    /// Path to a configuration file to use instead of the default.
    #[clap(long = "config", value_name = "FILE", conflicts_with = "no_config")]
    pub config_file: Option<PathBuf>,

    /// Skip loading any configuration file.
    #[clap(long = "no-config")]
    pub no_config: bool,

    /// Program to run followed by its arguments.
    #[clap(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

fn parse_env_assignment(s: &str) -> Result<(OsString, OsString), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.into(), value.into())),
        _ => Err(format!("expected KEY=VALUE, found '{s}'")),
    }
}
