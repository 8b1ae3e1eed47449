//! Process and shell-command argument parsing (§6 "Command endpoint").
//!
//! Mirrors `evo_hal`'s `Args`: a top-level `clap::Parser` with process flags,
//! plus a `Subcommand` for the dumpsys-style shell surface. Binder IPC
//! marshalling is an opaque out-of-scope collaborator (§1), so these
//! subcommands run in-process against the same `SensorService` the daemon
//! builds, rather than talking to a separately running instance.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sensord")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Sensor multiplexing service: HAL bridge, dispatch loop, and shell CLI")]
#[command(long_about = None)]
pub struct Args {
    /// Path to the service configuration file (sensord.toml).
    #[arg(short, long, default_value = "/etc/sensord/sensord.toml")]
    pub config: PathBuf,

    /// Run the dispatch loop in the foreground instead of as a shell command.
    #[arg(short, long)]
    pub foreground: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Shell command surface (§6). Exit codes: 0 on success, non-zero on parse
/// or permission failure.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Force a package's UID active/idle for rate-capping purposes.
    SetUidState {
        package: String,
        state: UidStateArg,
        #[arg(long)]
        user: Option<u32>,
    },
    /// Clear a forced UID-state override, restoring the real signal.
    ResetUidState {
        package: String,
        #[arg(long)]
        user: Option<u32>,
    },
    /// Print the effective UID-active state for a package.
    GetUidState {
        package: String,
        #[arg(long)]
        user: Option<u32>,
    },
    /// Lift the head-tracker UID restriction for this run (§4.7 step 1).
    RestrictHt,
    /// Restore the head-tracker UID restriction.
    UnrestrictHt,
    /// Print the diagnostic dump (§6 "Diagnostic dump").
    Dump {
        /// Emit the machine-readable bincode encoding instead of text.
        #[arg(long)]
        proto: bool,
        /// Caller is privileged: recorded event payloads are unmasked.
        #[arg(long)]
        privileged: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UidStateArg {
    Active,
    Idle,
}
