//! Platform abstraction facilities

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(not(unix))]
pub(crate) mod stubs;
#[cfg(not(unix))]
pub(crate) use stubs as platform;

pub use platform::pipes;
pub use platform::process;
pub use platform::signal;
