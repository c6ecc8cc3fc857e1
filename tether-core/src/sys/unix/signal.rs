//! Signal delivery utilities

use std::str::FromStr;

use crate::{error, sys, trace_categories};

pub use nix::sys::signal::Signal;

/// Signal sent when termination is requested without naming a signal.
pub const TERMINATE: Signal = Signal::SIGTERM;

/// Returns the conventional name of the signal (e.g. `SIGTERM`).
pub fn signal_name(signal: Signal) -> &'static str {
    signal.as_str()
}

/// Returns the number of the signal.
pub const fn signal_number(signal: Signal) -> i32 {
    signal as i32
}

/// Parses a signal given by name (`TERM`, `SIGTERM`, `sigterm`) or by number (`15`).
pub fn parse_signal(s: &str) -> Result<Signal, error::Error> {
    let s = s.trim();

    if let Ok(number) = s.parse::<i32>() {
        return Signal::try_from(number).map_err(|_errno| error::Error::InvalidSignal(s.into()));
    }

    let upper = s.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        std::format!("SIG{upper}")
    };

    Signal::from_str(name.as_str()).map_err(|_errno| error::Error::InvalidSignal(s.into()))
}

pub(crate) fn kill_process(
    pid: sys::process::ProcessId,
    signal: Signal,
) -> Result<(), error::Error> {
    // Zero and negative ids address process groups, which we never target.
    if pid <= 0 {
        return Err(error::Error::InvalidKillTarget);
    }

    tracing::debug!(target: trace_categories::SIGNALS, "sending {} to pid {pid}", signal.as_str());

    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), signal).map_err(|errno| {
        error::Error::FailedToSendSignal {
            pid,
            signal: signal.as_str().to_owned(),
            source: std::io::Error::from(errno),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_signal_names_and_numbers() -> anyhow::Result<()> {
        assert_eq!(parse_signal("TERM")?, Signal::SIGTERM);
        assert_eq!(parse_signal("SIGKILL")?, Signal::SIGKILL);
        assert_eq!(parse_signal("int")?, Signal::SIGINT);
        assert_eq!(parse_signal(" 9 ")?, Signal::SIGKILL);
        Ok(())
    }

    #[test]
    fn parse_signal_rejects_garbage() {
        assert!(matches!(
            parse_signal("NOTASIGNAL"),
            Err(error::Error::InvalidSignal(_))
        ));
        assert!(matches!(
            parse_signal("4096"),
            Err(error::Error::InvalidSignal(_))
        ));
    }

    #[test]
    fn kill_rejects_group_targets() {
        assert!(matches!(
            kill_process(0, TERMINATE),
            Err(error::Error::InvalidKillTarget)
        ));
        assert!(matches!(
            kill_process(-1, TERMINATE),
            Err(error::Error::InvalidKillTarget)
        ));
    }

    #[test]
    fn signal_metadata() {
        assert_eq!(signal_name(TERMINATE), "SIGTERM");
        assert_eq!(signal_number(Signal::SIGKILL), 9);
    }
}
