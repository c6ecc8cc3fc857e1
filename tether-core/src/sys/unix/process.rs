//! Process management utilities

use std::os::unix::process::ExitStatusExt;

/// Operating system process identifier.
pub type ProcessId = i32;

/// Converts the id reported by the OS into a [`ProcessId`], rejecting values that
/// could never name a single process.
pub(crate) fn pid_from_raw(id: u32) -> Option<ProcessId> {
    ProcessId::try_from(id).ok().filter(|pid| *pid > 0)
}

/// Splits a wait status into its exit code and terminating signal.
pub(crate) fn exit_parts(status: std::process::ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), status.signal())
}

/// Overrides the `argv[0]` the child observes.
pub(crate) fn set_argv0(cmd: &mut std::process::Command, argv0: &std::ffi::OsStr) {
    use std::os::unix::process::CommandExt;

    cmd.arg0(argv0);
}
