//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "spotter", version, about = "Barbell spotting rig CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/spotter.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the spotting rig until interrupted (or for a bounded window count)
    Run {
        /// Stop after this many estimation windows (runs until Ctrl-C if unset)
        #[arg(long, value_name = "N")]
        windows: Option<u64>,
        /// Write the final velocity report CSV to this path
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux: attempts SCHED_FIFO priority, pins to one CPU, and locks the process address space into RAM. Reduces sampling jitter but may require elevated privileges or ulimits (e.g., memlock)."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO (1..=max)
        #[arg(
            long,
            value_name = "PRIO",
            long_help = "SCHED_FIFO priority when --rt is enabled (Linux only). Higher values run before lower ones; range is platform-defined (usually 1..=99)."
        )]
        rt_prio: Option<i32>,
        /// Select memory locking mode for --rt: none, current, or all
        #[arg(long, value_enum, value_name = "MODE")]
        rt_lock: Option<RtLock>,
        /// CPU index to pin the process to (Linux only, default 0)
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
