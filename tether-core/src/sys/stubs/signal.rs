//! Signal delivery utilities

use crate::{error, sys};

/// A stub enum representing system signals on unsupported platforms.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Signal {
    /// Interrupt.
    SIGINT,
    /// Forced kill.
    SIGKILL,
    /// Termination request.
    SIGTERM,
}

impl Signal {
    /// Converts the signal into its corresponding name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SIGINT => "SIGINT",
            Self::SIGKILL => "SIGKILL",
            Self::SIGTERM => "SIGTERM",
        }
    }
}

/// Signal sent when termination is requested without naming a signal.
pub const TERMINATE: Signal = Signal::SIGTERM;

/// Returns the conventional name of the signal.
pub const fn signal_name(signal: Signal) -> &'static str {
    signal.as_str()
}

/// Returns the number of the signal.
pub const fn signal_number(signal: Signal) -> i32 {
    match signal {
        Signal::SIGINT => 2,
        Signal::SIGKILL => 9,
        Signal::SIGTERM => 15,
    }
}

/// Parses a signal given by name or number.
pub fn parse_signal(s: &str) -> Result<Signal, error::Error> {
    let upper = s.trim().to_ascii_uppercase();
    match upper.trim_start_matches("SIG") {
        "INT" | "2" => Ok(Signal::SIGINT),
        "KILL" | "9" => Ok(Signal::SIGKILL),
        "TERM" | "15" => Ok(Signal::SIGTERM),
        _ => Err(error::Error::InvalidSignal(s.into())),
    }
}

pub(crate) fn kill_process(
    _pid: sys::process::ProcessId,
    _signal: Signal,
) -> Result<(), error::Error> {
    Err(error::Error::NotSupportedOnThisPlatform("killing process"))
}
