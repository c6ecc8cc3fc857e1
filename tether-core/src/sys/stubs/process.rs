//! Process management utilities

/// Operating system process identifier.
pub type ProcessId = i32;

pub(crate) fn pid_from_raw(id: u32) -> Option<ProcessId> {
    ProcessId::try_from(id).ok().filter(|pid| *pid > 0)
}

pub(crate) fn exit_parts(status: std::process::ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

pub(crate) fn set_argv0(_cmd: &mut std::process::Command, _argv0: &std::ffi::OsStr) {}
