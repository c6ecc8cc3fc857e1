//! Spawn configuration for managed processes.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::pipes::Pipe;
use crate::{error, sys};

/// Number of entries in the stdio redirection table.
pub const STDIO_COUNT: usize = 2;

/// Default cap on the number of arguments accepted by a spawn.
pub const DEFAULT_MAX_ARGS: usize = 10;

/// How one of the child's standard streams is provided.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StdioRedirect {
    /// The stream is connected to the null device.
    #[default]
    Ignore,
    /// The stream is a pipe the child reads from.
    ReadablePipe,
    /// The stream is a pipe the child writes to.
    WritablePipe,
}

/// Fully resolved description of how to start a child process.
///
/// A [`crate::ManagedProcess`] rebuilds its options on each spawn from its
/// caller-facing fields; the last resolved value stays available for inspection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOptions {
    file: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    clear_env: bool,
    inherit_stderr: bool,
    stdio: [StdioRedirect; STDIO_COUNT],
}

/// Caller-supplied settings consulted when options are rebuilt.
pub(crate) struct LaunchRequest<'a> {
    pub file: Option<&'a Path>,
    pub args: &'a [OsString],
    pub cwd: Option<&'a Path>,
    pub env: &'a [(OsString, OsString)],
    pub clear_env: bool,
    pub inherit_stderr: bool,
    pub max_args: Option<usize>,
}

impl ProcessOptions {
    /// Creates unresolved options with the given stdio redirection table.
    pub fn with_stdio(stdio: [StdioRedirect; STDIO_COUNT]) -> Self {
        Self {
            file: PathBuf::new(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            clear_env: false,
            inherit_stderr: false,
            stdio,
        }
    }

    /// Returns the executable that will be started.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Returns the full argument vector; the first entry is `argv[0]`.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the working directory, if one was requested.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Returns the environment variables added on top of the inherited environment.
    pub fn env(&self) -> &[(OsString, OsString)] {
        &self.env
    }

    /// Returns whether the inherited environment is cleared first.
    pub const fn clear_env(&self) -> bool {
        self.clear_env
    }

    /// Returns whether the child shares the parent's stderr.
    pub const fn inherit_stderr(&self) -> bool {
        self.inherit_stderr
    }

    /// Returns the stdio redirection table: entry 0 is stdin, entry 1 is stdout.
    pub const fn stdio(&self) -> &[StdioRedirect; STDIO_COUNT] {
        &self.stdio
    }

    /// Validates the request and resolves it into a new set of options, keeping
    /// this value's stdio table. Nothing is touched on failure.
    pub(crate) fn rebuild(&self, request: &LaunchRequest<'_>) -> Result<Self, error::Error> {
        if let Some(max) = request.max_args {
            if request.args.len() > max {
                return Err(error::Error::TooManyArguments {
                    count: request.args.len(),
                    max,
                });
            }
        }

        let file = request.file.filter(|f| !f.as_os_str().is_empty());
        let (file, args) = match (file, request.args.first()) {
            (Some(file), _) if request.args.is_empty() => {
                (file.to_path_buf(), vec![file.as_os_str().to_owned()])
            }
            (Some(file), _) => (file.to_path_buf(), request.args.to_vec()),
            (None, Some(first)) => (PathBuf::from(first), request.args.to_vec()),
            (None, None) => return Err(error::Error::MissingExecutable),
        };

        let cwd = request
            .cwd
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);

        Ok(Self {
            file,
            args,
            cwd,
            env: request.env.to_vec(),
            clear_env: request.clear_env,
            inherit_stderr: request.inherit_stderr,
            stdio: self.stdio,
        })
    }

    /// Composes the OS command, wiring the stdio table to the given pipes.
    pub(crate) fn to_command(
        &self,
        stdin: &Pipe,
        stdout: &Pipe,
    ) -> Result<std::process::Command, error::Error> {
        let mut cmd = std::process::Command::new(&self.file);

        // Pass through args, honoring argv[0].
        if let Some((argv0, rest)) = self.args.split_first() {
            sys::process::set_argv0(&mut cmd, argv0.as_os_str());
            cmd.args(rest);
        }

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        if self.clear_env {
            cmd.env_clear();
        }
        for (name, value) in &self.env {
            cmd.env(name, value);
        }

        let [stdin_redirect, stdout_redirect] = self.stdio;
        cmd.stdin(stdin.child_stdio(stdin_redirect)?);
        cmd.stdout(stdout.child_stdio(stdout_redirect)?);

        cmd.stderr(if self.inherit_stderr {
            Stdio::inherit()
        } else {
            Stdio::null()
        });

        Ok(cmd)
    }

    /// Returns the arguments as lossily decoded strings, for reporting.
    pub(crate) fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| OsStr::to_string_lossy(arg).into_owned())
            .collect()
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::with_stdio([StdioRedirect::ReadablePipe, StdioRedirect::WritablePipe])
    }
}
