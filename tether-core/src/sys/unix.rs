pub mod pipes;
pub mod process;
pub mod signal;
