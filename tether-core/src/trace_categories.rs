//! Trace utilities

/// Trace category for process creation, exit and signaling.
pub const PROCESS: &str = "process";
/// Trace category for pipe I/O.
pub const PIPES: &str = "pipes";
/// Trace category for signal delivery.
pub const SIGNALS: &str = "signals";
