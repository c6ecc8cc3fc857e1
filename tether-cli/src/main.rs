//! Implements the command-line interface for `tether`.

/// Main entry point for `tether`.
fn main() {
    tether_cli::entry::run();
}
