//! Process execution layer for afscell.
//!
//! Everything that touches a child process lives here: the typed
//! [`CommandSpec`], the batch [`CommandRunner`], the prompt/response
//! [`SessionDriver`], the output extractor, and the [`Supervisor`] that
//! keeps the cell's background server alive between stages. A shared
//! [`CrashSignal`] lets the supervisor's watcher abort whatever command the
//! main pipeline is currently waiting on.

pub mod command;
pub mod crash;
pub mod extract;
mod pump;
pub mod runner;
pub mod session;
pub mod state;
pub mod supervisor;

pub use command::CommandSpec;
pub use crash::{CrashReport, CrashSignal};
pub use extract::{extract, KVNO_PATTERN};
pub use runner::{CommandOutput, CommandRunner, Mode};
pub use session::{Reply, SessionDriver, SessionOutcome, SessionScript, Step};
pub use state::{validate_transition, ServiceState};
pub use supervisor::{StopPolicy, Supervisor, TeardownGuard};

use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Tracing target for mirrored child output and session transcripts.
pub const TRANSCRIPT_TARGET: &str = "afscell::transcript";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' did not print '{pattern}' within {}s", timeout.as_secs_f64())]
    SessionTimeout {
        command: String,
        pattern: String,
        timeout: Duration,
    },
    #[error("'{command}' closed its output before printing '{pattern}'")]
    SessionClosed { command: String, pattern: String },
    #[error("'{command}' exited with status {status}")]
    CommandFailed { command: String, status: i32 },
    #[error("pattern '{pattern}' did not match output: {text}")]
    Extraction { text: String, pattern: String },
    #[error("supervised service '{command}' exited unexpectedly with status {status}")]
    SupervisorCrash { command: String, status: i32 },
    #[error("invalid service state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Whether tolerant mode may downgrade this error to a warning.
    pub fn is_tolerable(&self) -> bool {
        matches!(self, ExecError::CommandFailed { .. })
    }
}

/// Numeric exit status; death by signal maps to `128 + signal` like a shell.
pub fn status_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}
