//! CLI surface and diagnostic-dump formatting for the `sensord` binary.
//!
//! Kept as a library target, like `evo_hal`, so the shell-command parsing
//! and dump formatting can be exercised by tests without spawning the
//! binary itself.

pub mod cli;
pub mod dump_format;
pub mod shell;
